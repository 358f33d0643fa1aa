//! Mount-time volume configuration.
//!
//! `VolumeParams` is fixed once a [`crate::file_system::FileSystemHandle`] is
//! created. Zero in a timeout or capacity field selects the default, and the
//! per-category info timeouts override `file_info_timeout_ms` when set.

use crate::error::{FsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TRANSACT_TIMEOUT_MS: u32 = 1_000;
pub const MIN_TRANSACT_TIMEOUT_MS: u32 = 1_000;
pub const MAX_TRANSACT_TIMEOUT_MS: u32 = 10_000;

pub const DEFAULT_IRP_TIMEOUT_MS: u32 = 300_000;
pub const MIN_IRP_TIMEOUT_MS: u32 = 60_000;
pub const MAX_IRP_TIMEOUT_MS: u32 = 600_000;

pub const DEFAULT_IRP_CAPACITY: u32 = 1_000;
pub const MIN_IRP_CAPACITY: u32 = 100;
pub const MAX_IRP_CAPACITY: u32 = 1_000;

pub const DEFAULT_MAX_REPARSE_DEPTH: u32 = 32;
pub const DEFAULT_DIR_BUFFER_CAPACITY: usize = 1024 * 1024;

/// What a second `DirectoryBuffer::acquire` does while the first is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirBufferAcquire {
    #[default]
    Block,
    FailFast,
}

/// Cache windows the kernel may apply to each information category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoCategory {
    File,
    Volume,
    Directory,
    Security,
    Stream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeParams {
    pub sector_size: u16,
    pub sectors_per_allocation_unit: u16,
    pub max_component_length: u16,
    pub volume_creation_time: u64,
    pub volume_serial_number: u32,
    pub transact_timeout_ms: u32,
    pub irp_timeout_ms: u32,
    pub irp_capacity: u32,
    pub file_info_timeout_ms: u32,
    pub volume_info_timeout_ms: Option<u32>,
    pub dir_info_timeout_ms: Option<u32>,
    pub security_timeout_ms: Option<u32>,
    pub stream_info_timeout_ms: Option<u32>,
    pub case_sensitive_search: bool,
    pub case_preserved_names: bool,
    pub unicode_on_disk: bool,
    pub persistent_acls: bool,
    pub reparse_points: bool,
    pub reparse_points_access_check: bool,
    pub named_streams: bool,
    pub read_only_volume: bool,
    pub post_cleanup_when_modified_only: bool,
    pub pass_query_directory_pattern: bool,
    pub pass_query_directory_file_name: bool,
    pub flush_and_purge_on_cleanup: bool,
    pub device_control: bool,
    pub prefix: String,
    pub file_system_name: String,
    pub max_reparse_depth: u32,
    pub dir_buffer_capacity: usize,
    pub dir_buffer_acquire: DirBufferAcquire,
}

impl Default for VolumeParams {
    fn default() -> Self {
        Self {
            sector_size: 512,
            sectors_per_allocation_unit: 1,
            max_component_length: 255,
            volume_creation_time: 0,
            volume_serial_number: 0,
            transact_timeout_ms: 0,
            irp_timeout_ms: 0,
            irp_capacity: 0,
            file_info_timeout_ms: 1_000,
            volume_info_timeout_ms: None,
            dir_info_timeout_ms: None,
            security_timeout_ms: None,
            stream_info_timeout_ms: None,
            case_sensitive_search: true,
            case_preserved_names: true,
            unicode_on_disk: true,
            persistent_acls: true,
            reparse_points: false,
            reparse_points_access_check: false,
            named_streams: false,
            read_only_volume: false,
            post_cleanup_when_modified_only: true,
            pass_query_directory_pattern: false,
            pass_query_directory_file_name: false,
            flush_and_purge_on_cleanup: false,
            device_control: false,
            prefix: String::new(),
            file_system_name: "uvfs".to_string(),
            max_reparse_depth: DEFAULT_MAX_REPARSE_DEPTH,
            dir_buffer_capacity: DEFAULT_DIR_BUFFER_CAPACITY,
            dir_buffer_acquire: DirBufferAcquire::Block,
        }
    }
}

impl VolumeParams {
    /// Load from a `.toml` or `.json` file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();
        let params: VolumeParams = match ext.as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| FsError::invalid(e.to_string()))?,
            "json" => {
                serde_json::from_str(&contents).map_err(|e| FsError::invalid(e.to_string()))?
            }
            other => {
                return Err(FsError::invalid(format!(
                    "unsupported volume params extension: {:?}",
                    other
                )))
            }
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.sector_size.is_power_of_two() || !(512..=4096).contains(&self.sector_size) {
            return Err(FsError::invalid(format!(
                "sector_size must be a power of two in 512..=4096, got {}",
                self.sector_size
            )));
        }
        if self.sectors_per_allocation_unit == 0 {
            return Err(FsError::invalid("sectors_per_allocation_unit must be > 0"));
        }
        if self.max_component_length == 0 {
            return Err(FsError::invalid("max_component_length must be > 0"));
        }
        check_range(
            "transact_timeout_ms",
            self.transact_timeout_ms,
            MIN_TRANSACT_TIMEOUT_MS,
            MAX_TRANSACT_TIMEOUT_MS,
        )?;
        check_range(
            "irp_timeout_ms",
            self.irp_timeout_ms,
            MIN_IRP_TIMEOUT_MS,
            MAX_IRP_TIMEOUT_MS,
        )?;
        check_range(
            "irp_capacity",
            self.irp_capacity,
            MIN_IRP_CAPACITY,
            MAX_IRP_CAPACITY,
        )?;
        if self.max_reparse_depth == 0 {
            return Err(FsError::invalid("max_reparse_depth must be > 0"));
        }
        if self.dir_buffer_capacity == 0 {
            return Err(FsError::invalid("dir_buffer_capacity must be > 0"));
        }
        if self.prefix.encode_utf16().count() > 192 {
            return Err(FsError::invalid("prefix exceeds 192 UTF-16 units"));
        }
        if self.file_system_name.encode_utf16().count() > 16 {
            return Err(FsError::invalid("file_system_name exceeds 16 UTF-16 units"));
        }
        Ok(())
    }

    pub fn allocation_unit(&self) -> u64 {
        u64::from(self.sector_size) * u64::from(self.sectors_per_allocation_unit)
    }

    pub fn transact_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(or_default(
            self.transact_timeout_ms,
            DEFAULT_TRANSACT_TIMEOUT_MS,
        )))
    }

    pub fn irp_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(or_default(
            self.irp_timeout_ms,
            DEFAULT_IRP_TIMEOUT_MS,
        )))
    }

    pub fn irp_capacity(&self) -> usize {
        or_default(self.irp_capacity, DEFAULT_IRP_CAPACITY) as usize
    }

    /// Cache window for a category; category overrides win over the file
    /// info timeout.
    pub fn info_timeout(&self, category: InfoCategory) -> Duration {
        let override_ms = match category {
            InfoCategory::File => None,
            InfoCategory::Volume => self.volume_info_timeout_ms,
            InfoCategory::Directory => self.dir_info_timeout_ms,
            InfoCategory::Security => self.security_timeout_ms,
            InfoCategory::Stream => self.stream_info_timeout_ms,
        };
        Duration::from_millis(u64::from(override_ms.unwrap_or(self.file_info_timeout_ms)))
    }
}

fn or_default(value: u32, default: u32) -> u32 {
    if value == 0 {
        default
    } else {
        value
    }
}

fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if value != 0 && !(min..=max).contains(&value) {
        return Err(FsError::invalid(format!(
            "{} must be 0 or within {}..={}, got {}",
            field, min, max, value
        )));
    }
    Ok(())
}
