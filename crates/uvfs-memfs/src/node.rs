//! Files and folders held in memory.

use uvfs::error::{FsError, Result};
use uvfs::filetime::filetime_now;
use uvfs::types::{FileAttributes, FileInfo, ReparseData};

/// Files grow in multiples of this many bytes.
pub const ALLOCATION_UNIT: u64 = 4096;

/// Largest file or allocation a node holds; a multiple of [`ALLOCATION_UNIT`].
pub const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Fails with `DiskFull` when `size` is beyond [`MAX_FILE_SIZE`].
pub fn check_size(size: u64) -> Result<()> {
    if size > MAX_FILE_SIZE {
        return Err(FsError::DiskFull);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// `data.len()` is the allocation size.
    File { data: Vec<u8> },
    Folder,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub attributes: FileAttributes,
    /// Self-relative security descriptor.
    pub security: Vec<u8>,
    pub file_size: u64,
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub change_time: u64,
    pub index_number: u64,
    pub reparse: Option<ReparseData>,
    pub delete_pending: bool,
}

impl Node {
    fn with_kind(kind: NodeKind, attributes: FileAttributes, security: Vec<u8>, index: u64) -> Self {
        let now = filetime_now();
        Self {
            kind,
            attributes,
            security,
            file_size: 0,
            creation_time: now,
            last_access_time: now,
            last_write_time: now,
            change_time: now,
            index_number: index,
            reparse: None,
            delete_pending: false,
        }
    }

    pub fn file(
        attributes: FileAttributes,
        security: Vec<u8>,
        allocation_size: u64,
        index: u64,
    ) -> Result<Self> {
        check_size(allocation_size)?;
        let mut attributes = attributes | FileAttributes::ARCHIVE;
        attributes.remove(FileAttributes::DIRECTORY);
        Ok(Self::with_kind(
            NodeKind::File {
                data: vec![0; allocation_size as usize],
            },
            attributes,
            security,
            index,
        ))
    }

    pub fn folder(attributes: FileAttributes, security: Vec<u8>, index: u64) -> Self {
        Self::with_kind(
            NodeKind::Folder,
            attributes | FileAttributes::DIRECTORY,
            security,
            index,
        )
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder)
    }

    pub fn allocation_size(&self) -> u64 {
        match &self.kind {
            NodeKind::File { data } => data.len() as u64,
            NodeKind::Folder => 0,
        }
    }

    pub fn info(&self) -> FileInfo {
        FileInfo {
            file_attributes: self.attributes,
            reparse_tag: self.reparse.as_ref().map(|r| r.tag).unwrap_or(0),
            allocation_size: self.allocation_size(),
            file_size: self.file_size,
            creation_time: self.creation_time,
            last_access_time: self.last_access_time,
            last_write_time: self.last_write_time,
            change_time: self.change_time,
            index_number: self.index_number,
            hard_links: 0,
        }
    }

    fn data_mut(&mut self, name: &str) -> Result<&mut Vec<u8>> {
        match &mut self.kind {
            NodeKind::File { data } => Ok(data),
            NodeKind::Folder => Err(FsError::IsADirectory {
                name: name.to_string(),
            }),
        }
    }

    /// Resize the backing allocation; the file size never exceeds it.
    pub fn set_allocation_size(&mut self, name: &str, allocation_size: u64) -> Result<()> {
        check_size(allocation_size)?;
        let data = self.data_mut(name)?;
        data.resize(allocation_size as usize, 0);
        self.file_size = self.file_size.min(allocation_size);
        Ok(())
    }

    /// Round the allocation up to whole units covering `file_size`.
    pub fn adapt_allocation_size(&mut self, name: &str, file_size: u64) -> Result<()> {
        check_size(file_size)?;
        let units = file_size.div_ceil(ALLOCATION_UNIT);
        self.set_allocation_size(name, units * ALLOCATION_UNIT)
    }

    pub fn set_file_size(&mut self, name: &str, file_size: u64) -> Result<()> {
        check_size(file_size)?;
        let current = self.file_size;
        let data = self.data_mut(name)?;
        if file_size < current {
            data[file_size as usize..current as usize].fill(0);
        }
        if file_size > self.allocation_size() {
            self.adapt_allocation_size(name, file_size)?;
        }
        self.file_size = file_size;
        Ok(())
    }

    pub fn read(&self, name: &str, offset: u64, length: u32) -> Result<Vec<u8>> {
        let data = match &self.kind {
            NodeKind::File { data } => data,
            NodeKind::Folder => {
                return Err(FsError::IsADirectory {
                    name: name.to_string(),
                })
            }
        };
        if offset >= self.file_size {
            return Err(FsError::EndOfFile { offset });
        }
        let end = self.file_size.min(offset.saturating_add(u64::from(length)));
        Ok(data[offset as usize..end as usize].to_vec())
    }

    pub fn write(&mut self, name: &str, buf: &[u8], offset: u64, to_end: bool) -> Result<u32> {
        let offset = if to_end { self.file_size } else { offset };
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or(FsError::DiskFull)?;
        check_size(end)?;
        if end > self.file_size {
            self.set_file_size(name, end)?;
        }
        let data = self.data_mut(name)?;
        data[offset as usize..end as usize].copy_from_slice(buf);
        Ok(buf.len() as u32)
    }

    /// Write without extending the file.
    pub fn constrained_write(&mut self, name: &str, buf: &[u8], offset: u64) -> Result<u32> {
        let size = self.file_size;
        let data = self.data_mut(name)?;
        if offset >= size {
            return Ok(0);
        }
        let end = size.min(offset.saturating_add(buf.len() as u64));
        let len = (end - offset) as usize;
        data[offset as usize..end as usize].copy_from_slice(&buf[..len]);
        Ok(len as u32)
    }

    pub fn touch(&mut self) {
        let now = filetime_now();
        self.last_access_time = now;
        self.last_write_time = now;
        self.change_time = now;
    }
}
