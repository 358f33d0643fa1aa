//! The backing-store capability interface and the operation table that
//! binds one to a dispatcher.
//!
//! A backing store implements [`FileSystemOperations`] for whatever subset
//! of operations it supports. Every method defaults to
//! [`FsError::NotImplemented`], and [`CapabilitySet`] lets a store (or the
//! mounter) hide operations outright so the dispatcher answers
//! `NotImplemented` without calling into the store at all.

use crate::error::{FsError, Result};
use crate::request::OpKind;
use crate::types::{
    BasicInfo, CleanupFlags, CreateOptions, DirEntry, FileAttributes, FileContext, FileInfo,
    OpenedFile, ReparseData, StreamInfo, VolumeInfo,
};
use std::fmt;
use std::sync::Arc;

/// The set of operation kinds an operation table will dispatch.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    pub fn all() -> Self {
        OpKind::ALL.iter().copied().collect()
    }

    pub fn empty() -> Self {
        CapabilitySet(0)
    }

    pub fn with(self, kind: OpKind) -> Self {
        CapabilitySet(self.0 | kind.bit())
    }

    pub fn without(self, kind: OpKind) -> Self {
        CapabilitySet(self.0 & !kind.bit())
    }

    pub fn contains(self, kind: OpKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn intersect(self, other: CapabilitySet) -> Self {
        CapabilitySet(self.0 & other.0)
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<OpKind> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = OpKind>>(iter: I) -> Self {
        iter.into_iter()
            .fold(CapabilitySet::empty(), |set, kind| set.with(kind))
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(OpKind::ALL.iter().filter(|k| self.contains(**k)))
            .finish()
    }
}

/// Operations a backing store may provide.
///
/// Methods take `&self`; stores are shared across dispatcher workers and
/// handle their own interior locking. File names use `\` as separator and
/// are rooted at the volume root.
#[allow(unused_variables)]
pub trait FileSystemOperations: Send + Sync {
    /// Operation kinds this store wants dispatched. Defaults to all of them.
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    fn get_volume_info(&self) -> Result<VolumeInfo> {
        Err(FsError::not_implemented("get_volume_info"))
    }

    fn set_volume_label(&self, label: &str) -> Result<VolumeInfo> {
        Err(FsError::not_implemented("set_volume_label"))
    }

    /// Attributes and serialized security descriptor for a path that has
    /// not been opened.
    fn get_security_by_name(&self, file_name: &str) -> Result<(FileAttributes, Vec<u8>)> {
        Err(FsError::not_implemented("get_security_by_name"))
    }

    fn create(
        &self,
        file_name: &str,
        create_options: CreateOptions,
        granted_access: u32,
        file_attributes: FileAttributes,
        security_descriptor: Option<&[u8]>,
        allocation_size: u64,
    ) -> Result<OpenedFile> {
        Err(FsError::not_implemented("create"))
    }

    fn open(
        &self,
        file_name: &str,
        create_options: CreateOptions,
        granted_access: u32,
    ) -> Result<OpenedFile> {
        Err(FsError::not_implemented("open"))
    }

    fn overwrite(
        &self,
        context: FileContext,
        file_attributes: FileAttributes,
        replace_file_attributes: bool,
        allocation_size: u64,
    ) -> Result<FileInfo> {
        Err(FsError::not_implemented("overwrite"))
    }

    fn cleanup(
        &self,
        context: FileContext,
        file_name: Option<&str>,
        flags: CleanupFlags,
    ) -> Result<()> {
        Err(FsError::not_implemented("cleanup"))
    }

    /// Retire the context. The dispatcher forgets it whatever this returns.
    fn close(&self, context: FileContext) -> Result<()> {
        Err(FsError::not_implemented("close"))
    }

    fn read(&self, context: FileContext, offset: u64, length: u32) -> Result<Vec<u8>> {
        Err(FsError::not_implemented("read"))
    }

    /// Returns the number of bytes written and the updated file info.
    fn write(
        &self,
        context: FileContext,
        offset: u64,
        data: &[u8],
        write_to_end_of_file: bool,
        constrained_io: bool,
    ) -> Result<(u32, FileInfo)> {
        Err(FsError::not_implemented("write"))
    }

    /// `None` flushes the volume and yields no file info.
    fn flush(&self, context: Option<FileContext>) -> Result<Option<FileInfo>> {
        Err(FsError::not_implemented("flush"))
    }

    fn get_file_info(&self, context: FileContext) -> Result<FileInfo> {
        Err(FsError::not_implemented("get_file_info"))
    }

    fn set_basic_info(&self, context: FileContext, info: &BasicInfo) -> Result<FileInfo> {
        Err(FsError::not_implemented("set_basic_info"))
    }

    fn set_file_size(
        &self,
        context: FileContext,
        new_size: u64,
        set_allocation_size: bool,
    ) -> Result<FileInfo> {
        Err(FsError::not_implemented("set_file_size"))
    }

    fn can_delete(&self, context: FileContext, file_name: &str) -> Result<()> {
        Err(FsError::not_implemented("can_delete"))
    }

    fn rename(
        &self,
        context: FileContext,
        file_name: &str,
        new_file_name: &str,
        replace_if_exists: bool,
    ) -> Result<()> {
        Err(FsError::not_implemented("rename"))
    }

    fn get_security(&self, context: FileContext) -> Result<Vec<u8>> {
        Err(FsError::not_implemented("get_security"))
    }

    fn set_security(
        &self,
        context: FileContext,
        security_information: u32,
        modification: &[u8],
    ) -> Result<()> {
        Err(FsError::not_implemented("set_security"))
    }

    /// Entries of an open directory, optionally filtered by pattern and
    /// starting after `marker`. Order does not matter; the directory buffer
    /// sorts them.
    fn read_directory(
        &self,
        context: FileContext,
        pattern: Option<&str>,
        marker: Option<&str>,
    ) -> Result<Vec<DirEntry>> {
        Err(FsError::not_implemented("read_directory"))
    }

    fn get_dir_info_by_name(&self, context: FileContext, file_name: &str) -> Result<DirEntry> {
        Err(FsError::not_implemented("get_dir_info_by_name"))
    }

    /// Reparse lookup used by path resolution. `Ok(None)` means the path
    /// exists but is not a reparse point.
    fn get_reparse_point_by_name(
        &self,
        file_name: &str,
        is_directory: bool,
    ) -> Result<Option<ReparseData>> {
        Err(FsError::not_implemented("get_reparse_point_by_name"))
    }

    fn get_reparse_point(&self, context: FileContext, file_name: &str) -> Result<ReparseData> {
        Err(FsError::not_implemented("get_reparse_point"))
    }

    fn set_reparse_point(
        &self,
        context: FileContext,
        file_name: &str,
        data: &ReparseData,
    ) -> Result<()> {
        Err(FsError::not_implemented("set_reparse_point"))
    }

    fn delete_reparse_point(
        &self,
        context: FileContext,
        file_name: &str,
        data: &ReparseData,
    ) -> Result<()> {
        Err(FsError::not_implemented("delete_reparse_point"))
    }

    fn get_stream_info(&self, context: FileContext) -> Result<Vec<StreamInfo>> {
        Err(FsError::not_implemented("get_stream_info"))
    }

    fn control(&self, context: FileContext, code: u32, input: &[u8]) -> Result<Vec<u8>> {
        Err(FsError::not_implemented("control"))
    }

    fn set_delete(&self, context: FileContext, file_name: &str, delete_file: bool) -> Result<()> {
        Err(FsError::not_implemented("set_delete"))
    }
}

/// A backing store bound to the set of operations that will be dispatched
/// to it. Read-only once the file system is created.
#[derive(Clone)]
pub struct OperationTable {
    store: Arc<dyn FileSystemOperations>,
    capabilities: CapabilitySet,
}

impl OperationTable {
    pub fn new(store: Arc<dyn FileSystemOperations>) -> Self {
        let capabilities = store.capabilities();
        Self {
            store,
            capabilities,
        }
    }

    pub fn from_store<S: FileSystemOperations + 'static>(store: S) -> Self {
        Self::new(Arc::new(store))
    }

    /// Narrow the table further; kinds outside `allowed` are answered with
    /// `NotImplemented`.
    pub fn restrict(mut self, allowed: CapabilitySet) -> Self {
        self.capabilities = self.capabilities.intersect(allowed);
        self
    }

    pub fn supports(&self, kind: OpKind) -> bool {
        self.capabilities.contains(kind)
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn store(&self) -> &dyn FileSystemOperations {
        self.store.as_ref()
    }
}

impl fmt::Debug for OperationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationTable")
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
