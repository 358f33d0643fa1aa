//! Plain data carried between the transport, the dispatcher and the backing
//! store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Opaque per-open-file token issued by the backing store's slot table.
///
/// The dispatcher never interprets the value; it only threads it from
/// Create/Open through to Close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileContext(pub u64);

impl fmt::Display for FileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileAttributes(pub u32);

impl FileAttributes {
    pub const READONLY: FileAttributes = FileAttributes(0x1);
    pub const HIDDEN: FileAttributes = FileAttributes(0x2);
    pub const SYSTEM: FileAttributes = FileAttributes(0x4);
    pub const DIRECTORY: FileAttributes = FileAttributes(0x10);
    pub const ARCHIVE: FileAttributes = FileAttributes(0x20);
    pub const DEVICE: FileAttributes = FileAttributes(0x40);
    pub const NORMAL: FileAttributes = FileAttributes(0x80);
    pub const TEMPORARY: FileAttributes = FileAttributes(0x100);
    pub const SPARSE_FILE: FileAttributes = FileAttributes(0x200);
    pub const REPARSE_POINT: FileAttributes = FileAttributes(0x400);
    pub const COMPRESSED: FileAttributes = FileAttributes(0x800);
    pub const OFFLINE: FileAttributes = FileAttributes(0x1000);
    pub const NOT_CONTENT_INDEXED: FileAttributes = FileAttributes(0x2000);
    pub const ENCRYPTED: FileAttributes = FileAttributes(0x4000);
    /// Passed to SetBasicInfo to leave attributes unchanged.
    pub const INVALID: FileAttributes = FileAttributes(u32::MAX);

    pub fn contains(self, other: FileAttributes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_directory(self) -> bool {
        self != Self::INVALID && self.contains(Self::DIRECTORY)
    }

    pub fn remove(&mut self, other: FileAttributes) {
        self.0 &= !other.0;
    }
}

impl BitOr for FileAttributes {
    type Output = FileAttributes;
    fn bitor(self, rhs: Self) -> Self {
        FileAttributes(self.0 | rhs.0)
    }
}

impl BitOrAssign for FileAttributes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FileAttributes {
    type Output = FileAttributes;
    fn bitand(self, rhs: Self) -> Self {
        FileAttributes(self.0 & rhs.0)
    }
}

/// Create disposition options passed through from the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateOptions(pub u32);

impl CreateOptions {
    pub const DIRECTORY_FILE: u32 = 0x0000_0001;
    pub const WRITE_THROUGH: u32 = 0x0000_0002;
    pub const NON_DIRECTORY_FILE: u32 = 0x0000_0040;
    pub const DELETE_ON_CLOSE: u32 = 0x0000_1000;
    pub const OPEN_REPARSE_POINT: u32 = 0x0020_0000;

    pub fn directory() -> Self {
        CreateOptions(Self::DIRECTORY_FILE)
    }

    pub fn is_directory(self) -> bool {
        self.0 & Self::DIRECTORY_FILE != 0
    }

    pub fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }
}

/// Flags accompanying a Cleanup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CleanupFlags(pub u32);

impl CleanupFlags {
    pub const DELETE: u32 = 0x01;
    pub const SET_ALLOCATION_SIZE: u32 = 0x02;
    pub const SET_ARCHIVE_BIT: u32 = 0x10;
    pub const SET_LAST_ACCESS_TIME: u32 = 0x20;
    pub const SET_LAST_WRITE_TIME: u32 = 0x40;
    pub const SET_CHANGE_TIME: u32 = 0x80;

    pub fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    pub fn is_delete(self) -> bool {
        self.has(Self::DELETE)
    }
}

/// Metadata returned after every operation that observes or mutates a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_attributes: FileAttributes,
    pub reparse_tag: u32,
    pub allocation_size: u64,
    pub file_size: u64,
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub change_time: u64,
    pub index_number: u64,
    pub hard_links: u32,
}

impl FileInfo {
    pub fn is_directory(&self) -> bool {
        self.file_attributes.is_directory()
    }
}

/// New values for SetBasicInfo. Zero times and [`FileAttributes::INVALID`]
/// leave the corresponding field untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub file_attributes: FileAttributes,
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub change_time: u64,
}

impl Default for BasicInfo {
    fn default() -> Self {
        Self {
            file_attributes: FileAttributes::INVALID,
            creation_time: 0,
            last_access_time: 0,
            last_write_time: 0,
            change_time: 0,
        }
    }
}

/// Fixed part of one directory record on the wire.
pub const DIR_INFO_HEADER_LEN: usize = 104;

/// Records are padded to this alignment.
pub const DIR_INFO_ALIGNMENT: usize = 8;

/// One directory listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub info: FileInfo,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, info: FileInfo) -> Self {
        Self {
            name: name.into(),
            info,
        }
    }

    /// Bytes this entry occupies in a QueryDirectory response buffer.
    pub fn record_len(&self) -> usize {
        let raw = DIR_INFO_HEADER_LEN + self.name.encode_utf16().count() * 2;
        raw.div_ceil(DIR_INFO_ALIGNMENT) * DIR_INFO_ALIGNMENT
    }
}

/// Maximum volume label length in UTF-16 units.
pub const MAX_VOLUME_LABEL_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub total_size: u64,
    pub free_size: u64,
    pub volume_label: String,
}

/// Symbolic link reparse tag.
pub const IO_REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;
/// Junction / mount point reparse tag.
pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;

/// Reparse point payload stored by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReparseData {
    pub tag: u32,
    /// Substitute name for name-surrogate tags; opaque for others.
    pub target: String,
}

impl ReparseData {
    pub fn symlink(target: impl Into<String>) -> Self {
        Self {
            tag: IO_REPARSE_TAG_SYMLINK,
            target: target.into(),
        }
    }

    pub fn mount_point(target: impl Into<String>) -> Self {
        Self {
            tag: IO_REPARSE_TAG_MOUNT_POINT,
            target: target.into(),
        }
    }

    /// Tags the resolver substitutes in-path.
    pub fn is_name_surrogate(&self) -> bool {
        matches!(self.tag, IO_REPARSE_TAG_SYMLINK | IO_REPARSE_TAG_MOUNT_POINT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub size: u64,
    pub allocation_size: u64,
}

/// Result of a successful Create or Open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenedFile {
    pub context: FileContext,
    pub info: FileInfo,
    /// Name with the case stored on disk, when it differs from the request.
    pub normalized_name: Option<String>,
    /// Backing-store cache hint, forwarded to the transport untouched.
    pub cache_hint: Option<u64>,
}

impl OpenedFile {
    pub fn new(context: FileContext, info: FileInfo) -> Self {
        Self {
            context,
            info,
            normalized_name: None,
            cache_hint: None,
        }
    }
}

/// Path separators accepted in request names.
pub fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_flags() {
        let mut attrs = FileAttributes::DIRECTORY | FileAttributes::HIDDEN;
        assert!(attrs.is_directory());
        assert!(attrs.contains(FileAttributes::HIDDEN));
        attrs.remove(FileAttributes::HIDDEN);
        assert!(!attrs.contains(FileAttributes::HIDDEN));
    }

    #[test]
    fn test_invalid_attributes_not_directory() {
        assert!(!FileAttributes::INVALID.is_directory());
    }

    #[test]
    fn test_record_len_is_aligned() {
        let entry = DirEntry::new("a", FileInfo::default());
        assert_eq!(entry.record_len(), 112);
        let entry = DirEntry::new("abcd", FileInfo::default());
        assert_eq!(entry.record_len(), 112);
        let entry = DirEntry::new("abcde", FileInfo::default());
        assert_eq!(entry.record_len(), 120);
        assert_eq!(entry.record_len() % DIR_INFO_ALIGNMENT, 0);
    }

    #[test]
    fn test_record_len_counts_utf16_units() {
        let entry = DirEntry::new("\u{1F600}", FileInfo::default());
        assert_eq!(entry.record_len(), 112);
    }

    #[test]
    fn test_cleanup_flags() {
        let flags = CleanupFlags(CleanupFlags::DELETE | CleanupFlags::SET_CHANGE_TIME);
        assert!(flags.is_delete());
        assert!(flags.has(CleanupFlags::SET_CHANGE_TIME));
        assert!(!flags.has(CleanupFlags::SET_ARCHIVE_BIT));
    }

    #[test]
    fn test_reparse_surrogates() {
        assert!(ReparseData::symlink("\\b").is_name_surrogate());
        assert!(ReparseData::mount_point("\\b").is_name_surrogate());
        let other = ReparseData {
            tag: 0x8000_0017,
            target: String::new(),
        };
        assert!(!other.is_name_surrogate());
    }

    #[test]
    fn test_basic_info_default_leaves_attributes() {
        assert_eq!(BasicInfo::default().file_attributes, FileAttributes::INVALID);
    }
}
