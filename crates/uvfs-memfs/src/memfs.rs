//! In-memory backing store.
//!
//! Nodes are kept in a map keyed by normalized path (`\` separated, rooted
//! at `\`). A single `RwLock` guards the tree and the handle table, so
//! queries run in parallel while anything that changes the tree is
//! exclusive.

use crate::error::MemFsError;
use crate::handles::{subtree_suffix, OpenFileTable};
use crate::node::{check_size, Node, NodeKind, MAX_FILE_SIZE};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use uvfs::dispatcher::wildcard_match;
use uvfs::error::{FsError, Result};
use uvfs::filetime::filetime_now;
use uvfs::security::{SecurityDescriptor, SecurityInformation};
use uvfs::status::NtStatus;
use uvfs::types::{
    is_separator, BasicInfo, CleanupFlags, CreateOptions, DirEntry, FileAttributes, FileContext,
    FileInfo, OpenedFile, ReparseData, StreamInfo, VolumeInfo,
};
use uvfs::FileSystemOperations;

/// Longest label the store accepts.
pub const MAX_LABEL_LEN: usize = 31;

const MAX_FILE_NODES: u64 = 1024;

/// Descriptor given to the root and inherited by nodes created without one.
pub const ROOT_SDDL: &str = "O:BAG:BAD:P(A;;FA;;;SY)(A;;FA;;;BA)(A;;FA;;;WD)";

/// Control code answered by echoing the input back.
pub const CONTROL_ECHO: u32 = 0x0001;

const ROOT: &str = "\\";

struct Tree {
    nodes: BTreeMap<String, Node>,
    handles: OpenFileTable,
    label: String,
    next_index: u64,
}

impl Tree {
    fn node(&self, path: &str) -> Result<&Node> {
        self.nodes.get(path).ok_or_else(|| FsError::NotFound {
            name: path.to_string(),
        })
    }

    fn node_mut(&mut self, path: &str) -> Result<&mut Node> {
        self.nodes.get_mut(path).ok_or_else(|| FsError::NotFound {
            name: path.to_string(),
        })
    }

    fn path_of(&self, context: FileContext) -> Result<String> {
        self.handles
            .get(context)
            .map(|e| e.path.clone())
            .ok_or(FsError::InvalidHandle { context: context.0 })
    }

    fn open_node(&self, context: FileContext) -> Result<(String, &Node)> {
        let path = self.path_of(context)?;
        let node = self.node(&path)?;
        Ok((path, node))
    }

    fn open_node_mut(&mut self, context: FileContext) -> Result<(String, &mut Node)> {
        let path = self.path_of(context)?;
        let node = self.node_mut(&path)?;
        Ok((path, node))
    }

    fn has_children(&self, path: &str) -> bool {
        self.children(path).next().is_some()
    }

    /// Direct children of a folder, in name order.
    fn children<'a>(&'a self, path: &'a str) -> impl Iterator<Item = (&'a str, &'a Node)> + 'a {
        let prefix = if path == ROOT {
            ROOT.to_string()
        } else {
            format!("{}\\", path)
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(move |(key, _)| key.starts_with(&prefix))
            .filter_map(move |(key, node)| {
                let rest = key.get(if path == ROOT { 1 } else { path.len() + 1 }..)?;
                if rest.is_empty() || rest.contains('\\') {
                    None
                } else {
                    Some((rest, node))
                }
            })
    }

    fn next_index(&mut self) -> u64 {
        self.next_index += 1;
        self.next_index
    }
}

/// Normalize a request path: `/` becomes `\`, empty components go away.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for part in path.split(is_separator).filter(|p| !p.is_empty()) {
        out.push('\\');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('\\');
    }
    out
}

fn parent_of(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rsplit_once('\\') {
        Some(("", _)) => Some(ROOT),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        normalize(name)
    } else {
        normalize(&format!("{}\\{}", dir, name))
    }
}

/// An in-memory volume implementing every operation.
pub struct MemFs {
    tree: RwLock<Tree>,
    read_only: AtomicBool,
}

impl MemFs {
    pub fn new(label: &str, read_only: bool) -> std::result::Result<Self, MemFsError> {
        check_label(label)?;
        let security = SecurityDescriptor::from_sddl(ROOT_SDDL)?.to_bytes();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ROOT.to_string(),
            Node::folder(FileAttributes::DIRECTORY, security, 1),
        );
        info!(label, read_only, "Created in-memory volume");
        Ok(Self {
            tree: RwLock::new(Tree {
                nodes,
                handles: OpenFileTable::new(),
                label: label.to_string(),
                next_index: 1,
            }),
            read_only: AtomicBool::new(read_only),
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }

    pub fn node_count(&self) -> usize {
        self.tree.read().nodes.len()
    }

    pub fn open_handles(&self) -> usize {
        self.tree.read().handles.count()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.tree.read().nodes.contains_key(&normalize(path))
    }

    fn writable(&self) -> Result<()> {
        if self.is_read_only() {
            Err(FsError::WriteProtected)
        } else {
            Ok(())
        }
    }

    /// Add a folder under the root without going through a handle.
    pub fn create_directory(&self, path: &str) -> std::result::Result<(), MemFsError> {
        let path = normalize(path);
        let mut tree = self.tree.write();
        let security = tree.node(ROOT)?.security.clone();
        let index = tree.next_index();
        tree.nodes
            .insert(path, Node::folder(FileAttributes::DIRECTORY, security, index));
        Ok(())
    }

    /// Copy a host file into the volume root.
    pub fn import_file(&self, source: &Path) -> std::result::Result<(), MemFsError> {
        let data = std::fs::read(source).map_err(|e| MemFsError::Import {
            path: source.to_path_buf(),
            source: e,
        })?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| MemFsError::Import {
                path: source.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
            })?;
        let path = join(ROOT, &name);
        let mut tree = self.tree.write();
        let security = tree.node(ROOT)?.security.clone();
        let index = tree.next_index();
        let mut node = Node::file(FileAttributes::ARCHIVE, security, 0, index)?;
        node.write(&path, &data, 0, false)?;
        tree.nodes.insert(path, node);
        Ok(())
    }
}

fn check_label(label: &str) -> std::result::Result<(), MemFsError> {
    let len = label.chars().count();
    if len > MAX_LABEL_LEN {
        return Err(MemFsError::LabelTooLong {
            len,
            max: MAX_LABEL_LEN,
        });
    }
    Ok(())
}

impl FileSystemOperations for MemFs {
    fn get_volume_info(&self) -> Result<VolumeInfo> {
        let tree = self.tree.read();
        let used = tree.nodes.len() as u64;
        Ok(VolumeInfo {
            total_size: MAX_FILE_NODES * MAX_FILE_SIZE,
            free_size: MAX_FILE_NODES.saturating_sub(used) * MAX_FILE_SIZE,
            volume_label: tree.label.clone(),
        })
    }

    fn set_volume_label(&self, label: &str) -> Result<VolumeInfo> {
        self.writable()?;
        check_label(label).map_err(|e| FsError::invalid(e.to_string()))?;
        self.tree.write().label = label.to_string();
        self.get_volume_info()
    }

    fn get_security_by_name(&self, file_name: &str) -> Result<(FileAttributes, Vec<u8>)> {
        let tree = self.tree.read();
        let node = tree.node(&normalize(file_name))?;
        Ok((node.attributes, node.security.clone()))
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
        self.writable()?;
        let path = normalize(file_name);
        let mut tree = self.tree.write();
        let parent = parent_of(&path).ok_or_else(|| FsError::AlreadyExists { name: path.clone() })?;
        let parent_node = tree.node(parent)?;
        if !parent_node.is_folder() {
            return Err(FsError::NotADirectory {
                name: parent.to_string(),
            });
        }
        if tree.nodes.contains_key(&path) {
            return Err(FsError::AlreadyExists { name: path });
        }
        let security = match security_descriptor {
            Some(sd) => sd.to_vec(),
            None => parent_node.security.clone(),
        };

        let index = tree.next_index();
        let node = if create_options.is_directory() {
            Node::folder(file_attributes, security, index)
        } else {
            Node::file(file_attributes, security, allocation_size, index)?
        };
        let info = node.info();
        tree.nodes.insert(path.clone(), node);
        let context = tree.handles.open(&path, granted_access);
        debug!(path = %path, %context, "Created");
        Ok(OpenedFile::new(context, info))
    }

    fn open(
        &self,
        file_name: &str,
        _create_options: CreateOptions,
        granted_access: u32,
    ) -> Result<OpenedFile> {
        let path = normalize(file_name);
        let mut tree = self.tree.write();
        let info = tree.node(&path)?.info();
        let context = tree.handles.open(&path, granted_access);
        Ok(OpenedFile::new(context, info))
    }

    fn overwrite(
        &self,
        context: FileContext,
        file_attributes: FileAttributes,
        replace_file_attributes: bool,
        allocation_size: u64,
    ) -> Result<FileInfo> {
        self.writable()?;
        check_size(allocation_size)?;
        let mut tree = self.tree.write();
        let (path, node) = tree.open_node_mut(context)?;
        let attributes = file_attributes | FileAttributes::ARCHIVE;
        if replace_file_attributes {
            node.attributes = attributes;
        } else {
            node.attributes |= attributes;
        }
        node.file_size = 0;
        node.set_allocation_size(&path, allocation_size)?;
        node.touch();
        Ok(node.info())
    }

    fn cleanup(
        &self,
        context: FileContext,
        _file_name: Option<&str>,
        flags: CleanupFlags,
    ) -> Result<()> {
        if flags.0 != 0 {
            self.writable()?;
        }
        let mut tree = self.tree.write();
        let path = tree.path_of(context)?;
        let delete = flags.is_delete() || tree.node(&path)?.delete_pending;

        if delete {
            // A folder that gained children keeps existing.
            if tree.has_children(&path) {
                return Ok(());
            }
            tree.nodes.remove(&path);
            debug!(path = %path, "Deleted on cleanup");
            return Ok(());
        }

        let node = tree.node_mut(&path)?;
        if flags.has(CleanupFlags::SET_ALLOCATION_SIZE) && !node.is_folder() {
            let size = node.file_size;
            node.adapt_allocation_size(&path, size)?;
        }
        if flags.has(CleanupFlags::SET_ARCHIVE_BIT) && !node.is_folder() {
            node.attributes |= FileAttributes::ARCHIVE;
        }
        let now = filetime_now();
        if flags.has(CleanupFlags::SET_LAST_ACCESS_TIME) {
            node.last_access_time = now;
        }
        if flags.has(CleanupFlags::SET_LAST_WRITE_TIME) {
            node.last_write_time = now;
        }
        if flags.has(CleanupFlags::SET_CHANGE_TIME) {
            node.change_time = now;
        }
        Ok(())
    }

    fn close(&self, context: FileContext) -> Result<()> {
        self.tree
            .write()
            .handles
            .close(context)
            .map(|_| ())
            .ok_or(FsError::InvalidHandle { context: context.0 })
    }

    fn read(&self, context: FileContext, offset: u64, length: u32) -> Result<Vec<u8>> {
        let tree = self.tree.read();
        let (path, node) = tree.open_node(context)?;
        node.read(&path, offset, length)
    }

    fn write(
        &self,
        context: FileContext,
        offset: u64,
        data: &[u8],
        write_to_end_of_file: bool,
        constrained_io: bool,
    ) -> Result<(u32, FileInfo)> {
        self.writable()?;
        let mut tree = self.tree.write();
        let (path, node) = tree.open_node_mut(context)?;
        let written = if constrained_io {
            node.constrained_write(&path, data, offset)?
        } else {
            node.write(&path, data, offset, write_to_end_of_file)?
        };
        node.last_write_time = filetime_now();
        Ok((written, node.info()))
    }

    fn flush(&self, context: Option<FileContext>) -> Result<Option<FileInfo>> {
        match context {
            None => Ok(None),
            Some(context) => {
                let tree = self.tree.read();
                Ok(Some(tree.open_node(context)?.1.info()))
            }
        }
    }

    fn get_file_info(&self, context: FileContext) -> Result<FileInfo> {
        let tree = self.tree.read();
        Ok(tree.open_node(context)?.1.info())
    }

    fn set_basic_info(&self, context: FileContext, info: &BasicInfo) -> Result<FileInfo> {
        self.writable()?;
        let mut tree = self.tree.write();
        let (_, node) = tree.open_node_mut(context)?;
        if info.file_attributes != FileAttributes::INVALID {
            let mut attributes = info.file_attributes;
            if node.is_folder() {
                attributes |= FileAttributes::DIRECTORY;
            } else {
                attributes.remove(FileAttributes::DIRECTORY);
            }
            node.attributes = attributes;
        }
        if info.creation_time != 0 {
            node.creation_time = info.creation_time;
        }
        if info.last_access_time != 0 {
            node.last_access_time = info.last_access_time;
        }
        if info.last_write_time != 0 {
            node.last_write_time = info.last_write_time;
        }
        if info.change_time != 0 {
            node.change_time = info.change_time;
        }
        Ok(node.info())
    }

    fn set_file_size(
        &self,
        context: FileContext,
        new_size: u64,
        set_allocation_size: bool,
    ) -> Result<FileInfo> {
        self.writable()?;
        let mut tree = self.tree.write();
        let (path, node) = tree.open_node_mut(context)?;
        if set_allocation_size {
            node.set_allocation_size(&path, new_size)?;
        } else {
            node.set_file_size(&path, new_size)?;
        }
        Ok(node.info())
    }

    fn can_delete(&self, _context: FileContext, file_name: &str) -> Result<()> {
        let path = normalize(file_name);
        let tree = self.tree.read();
        let node = tree.node(&path)?;
        if path == ROOT {
            return Err(FsError::AccessDenied { name: path });
        }
        if node.is_folder() && tree.has_children(&path) {
            return Err(FsError::DirectoryNotEmpty { name: path });
        }
        Ok(())
    }

    fn rename(
        &self,
        _context: FileContext,
        file_name: &str,
        new_file_name: &str,
        replace_if_exists: bool,
    ) -> Result<()> {
        self.writable()?;
        let from = normalize(file_name);
        let to = normalize(new_file_name);
        if from == ROOT || to == ROOT {
            return Err(FsError::AccessDenied { name: from });
        }
        if from == to {
            return Ok(());
        }
        if subtree_suffix(&to, &from).is_some() {
            return Err(FsError::invalid(format!("cannot move {} into itself", from)));
        }

        let mut tree = self.tree.write();
        let source_is_folder = tree.node(&from)?.is_folder();
        let new_parent = parent_of(&to).unwrap_or(ROOT);
        if !tree.node(new_parent).map(Node::is_folder).unwrap_or(false) {
            return Err(FsError::PathNotFound {
                name: new_parent.to_string(),
            });
        }
        if let Some(existing) = tree.nodes.get(&to) {
            if !replace_if_exists {
                return Err(FsError::AlreadyExists { name: to });
            }
            if source_is_folder || existing.is_folder() {
                return Err(FsError::AccessDenied { name: to });
            }
            tree.nodes.remove(&to);
        }

        let moved: Vec<String> = tree
            .nodes
            .range(from.clone()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(&from))
            .filter(|key| subtree_suffix(key, &from).is_some())
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = tree.nodes.remove(&key) {
                let suffix = &key[from.len()..];
                tree.nodes.insert(format!("{}{}", to, suffix), node);
            }
        }
        tree.handles.rename_subtree(&from, &to);
        if let Some(node) = tree.nodes.get_mut(&to) {
            node.change_time = filetime_now();
        }
        debug!(from = %from, to = %to, "Renamed");
        Ok(())
    }

    fn get_security(&self, context: FileContext) -> Result<Vec<u8>> {
        let tree = self.tree.read();
        Ok(tree.open_node(context)?.1.security.clone())
    }

    fn set_security(
        &self,
        context: FileContext,
        security_information: u32,
        modification: &[u8],
    ) -> Result<()> {
        self.writable()?;
        let modification = SecurityDescriptor::from_bytes(modification)?;
        let mut tree = self.tree.write();
        let (_, node) = tree.open_node_mut(context)?;
        let current = SecurityDescriptor::from_bytes(&node.security)?;
        let evolved = current.evolve(SecurityInformation(security_information), &modification)?;
        node.security = evolved.to_bytes();
        node.change_time = filetime_now();
        Ok(())
    }

    fn read_directory(
        &self,
        context: FileContext,
        pattern: Option<&str>,
        marker: Option<&str>,
    ) -> Result<Vec<DirEntry>> {
        let tree = self.tree.read();
        let (path, dir) = tree.open_node(context)?;
        if !dir.is_folder() {
            return Err(FsError::NotADirectory { name: path });
        }

        let mut entries = Vec::new();
        if let Some(parent) = parent_of(&path) {
            entries.push(DirEntry::new(".", dir.info()));
            entries.push(DirEntry::new("..", tree.node(parent)?.info()));
        }
        entries.extend(
            tree.children(&path)
                .map(|(name, node)| DirEntry::new(name, node.info())),
        );
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(pattern) = pattern {
            entries.retain(|e| wildcard_match(pattern, &e.name, true));
        }
        if let Some(marker) = marker {
            entries.retain(|e| e.name.as_str() > marker);
        }
        Ok(entries)
    }

    fn get_dir_info_by_name(&self, context: FileContext, file_name: &str) -> Result<DirEntry> {
        let tree = self.tree.read();
        let (dir, _) = tree.open_node(context)?;
        let node = tree.node(&join(&dir, file_name))?;
        Ok(DirEntry::new(file_name, node.info()))
    }

    fn get_reparse_point_by_name(
        &self,
        file_name: &str,
        _is_directory: bool,
    ) -> Result<Option<ReparseData>> {
        let tree = self.tree.read();
        Ok(tree.node(&normalize(file_name))?.reparse.clone())
    }

    fn get_reparse_point(&self, context: FileContext, _file_name: &str) -> Result<ReparseData> {
        let tree = self.tree.read();
        let (path, node) = tree.open_node(context)?;
        node.reparse
            .clone()
            .ok_or(FsError::NotAReparsePoint { name: path })
    }

    fn set_reparse_point(
        &self,
        context: FileContext,
        _file_name: &str,
        data: &ReparseData,
    ) -> Result<()> {
        self.writable()?;
        let mut tree = self.tree.write();
        let path = tree.path_of(context)?;
        if tree.has_children(&path) {
            return Err(FsError::DirectoryNotEmpty { name: path });
        }
        let node = tree.node_mut(&path)?;
        node.reparse = Some(data.clone());
        node.attributes |= FileAttributes::REPARSE_POINT;
        node.change_time = filetime_now();
        Ok(())
    }

    fn delete_reparse_point(
        &self,
        context: FileContext,
        _file_name: &str,
        data: &ReparseData,
    ) -> Result<()> {
        self.writable()?;
        let mut tree = self.tree.write();
        let (path, node) = tree.open_node_mut(context)?;
        match &node.reparse {
            None => return Err(FsError::NotAReparsePoint { name: path }),
            Some(current) if current.tag != data.tag => {
                return Err(FsError::Status(NtStatus::ReparseTagNotHandled))
            }
            Some(_) => {}
        }
        node.reparse = None;
        node.attributes.remove(FileAttributes::REPARSE_POINT);
        node.change_time = filetime_now();
        Ok(())
    }

    fn get_stream_info(&self, context: FileContext) -> Result<Vec<StreamInfo>> {
        let tree = self.tree.read();
        let (_, node) = tree.open_node(context)?;
        Ok(match node.kind {
            NodeKind::Folder => Vec::new(),
            NodeKind::File { .. } => vec![StreamInfo {
                name: String::new(),
                size: node.file_size,
                allocation_size: node.allocation_size(),
            }],
        })
    }

    fn control(&self, context: FileContext, code: u32, input: &[u8]) -> Result<Vec<u8>> {
        self.tree.read().path_of(context)?;
        match code {
            CONTROL_ECHO => Ok(input.to_vec()),
            _ => Err(FsError::Status(NtStatus::InvalidDeviceRequest)),
        }
    }

    fn set_delete(&self, context: FileContext, file_name: &str, delete_file: bool) -> Result<()> {
        self.writable()?;
        if delete_file {
            self.can_delete(context, file_name)?;
        }
        let mut tree = self.tree.write();
        let (_, node) = tree.open_node_mut(context)?;
        node.delete_pending = delete_file;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uvfs::security::SecurityInformation;

    fn fs() -> MemFs {
        MemFs::new("memfs", false).unwrap()
    }

    fn create_file(fs: &MemFs, name: &str) -> FileContext {
        fs.create(
            name,
            CreateOptions::default(),
            0,
            FileAttributes::NORMAL,
            None,
            0,
        )
        .unwrap()
        .context
    }

    fn create_dir(fs: &MemFs, name: &str) -> FileContext {
        fs.create(
            name,
            CreateOptions::directory(),
            0,
            FileAttributes::default(),
            None,
            0,
        )
        .unwrap()
        .context
    }

    fn names(entries: &[DirEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "\\");
        assert_eq!(normalize("/a//b/"), "\\a\\b");
        assert_eq!(normalize("\\a"), "\\a");
        assert_eq!(parent_of("\\a"), Some("\\"));
        assert_eq!(parent_of("\\a\\b"), Some("\\a"));
        assert_eq!(parent_of("\\"), None);
    }

    #[test]
    fn test_label_limit() {
        assert!(matches!(
            MemFs::new(&"x".repeat(32), false),
            Err(MemFsError::LabelTooLong { len: 32, .. })
        ));
        let fs = fs();
        assert!(fs.set_volume_label(&"y".repeat(32)).is_err());
        assert_eq!(fs.set_volume_label("data").unwrap().volume_label, "data");
    }

    #[test]
    fn test_oversized_requests_leave_file_intact() {
        let fs = fs();
        let ctx = create_file(&fs, "\\big");
        fs.write(ctx, 0, b"keep", false, false).unwrap();
        assert!(matches!(
            fs.write(ctx, u64::MAX - 1, b"hello", false, false),
            Err(FsError::DiskFull)
        ));
        assert!(matches!(
            fs.set_file_size(ctx, 1 << 40, false),
            Err(FsError::DiskFull)
        ));
        assert!(matches!(
            fs.set_file_size(ctx, 1 << 40, true),
            Err(FsError::DiskFull)
        ));
        assert!(matches!(
            fs.overwrite(ctx, FileAttributes::NORMAL, false, 1 << 40),
            Err(FsError::DiskFull)
        ));
        assert_eq!(fs.read(ctx, 0, 16).unwrap(), b"keep");
        let created = fs.create(
            "\\huge",
            CreateOptions::default(),
            0,
            FileAttributes::NORMAL,
            None,
            1 << 40,
        );
        assert!(matches!(created, Err(FsError::DiskFull)));
        assert!(!fs.exists("\\huge"));
    }

    #[test]
    fn test_volume_info_counts_nodes() {
        let fs = fs();
        let before = fs.get_volume_info().unwrap();
        create_file(&fs, "\\a");
        let after = fs.get_volume_info().unwrap();
        assert_eq!(before.free_size - after.free_size, MAX_FILE_SIZE);
    }

    #[test]
    fn test_create_write_read() {
        let fs = fs();
        let ctx = create_file(&fs, "\\hello.txt");
        let (n, info) = fs.write(ctx, 0, b"hello", false, false).unwrap();
        assert_eq!(n, 5);
        assert_eq!(info.file_size, 5);
        assert_eq!(fs.read(ctx, 0, 100).unwrap(), b"hello");
        fs.close(ctx).unwrap();
        assert!(fs.close(ctx).is_err());
    }

    #[test]
    fn test_create_collisions_and_parents() {
        let fs = fs();
        create_file(&fs, "\\a");
        assert!(matches!(
            fs.create("\\a", CreateOptions::default(), 0, FileAttributes::NORMAL, None, 0),
            Err(FsError::AlreadyExists { .. })
        ));
        assert!(matches!(
            fs.create("\\a\\b", CreateOptions::default(), 0, FileAttributes::NORMAL, None, 0),
            Err(FsError::NotADirectory { .. })
        ));
        assert!(matches!(
            fs.create("\\missing\\b", CreateOptions::default(), 0, FileAttributes::NORMAL, None, 0),
            Err(FsError::NotFound { .. })
        ));
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let fs = MemFs::new("ro", true).unwrap();
        assert!(matches!(
            fs.create("\\a", CreateOptions::default(), 0, FileAttributes::NORMAL, None, 0),
            Err(FsError::WriteProtected)
        ));
        assert!(fs.get_volume_info().is_ok());
        fs.set_read_only(false);
        create_file(&fs, "\\a");
    }

    #[test]
    fn test_listing_has_dots_outside_root() {
        let fs = fs();
        let dir = create_dir(&fs, "\\dir");
        create_file(&fs, "\\dir\\b");
        create_file(&fs, "\\dir\\a");
        create_file(&fs, "\\other");
        let root = fs.open("\\", CreateOptions::default(), 0).unwrap().context;

        let entries = fs.read_directory(dir, None, None).unwrap();
        assert_eq!(names(&entries), vec![".", "..", "a", "b"]);
        let entries = fs.read_directory(root, None, None).unwrap();
        assert_eq!(names(&entries), vec!["dir", "other"]);
        let entries = fs.read_directory(dir, None, Some("a")).unwrap();
        assert_eq!(names(&entries), vec!["b"]);
        let entries = fs.read_directory(dir, Some("?"), None).unwrap();
        assert_eq!(names(&entries), vec![".", "a", "b"]);
    }

    #[test]
    fn test_read_directory_on_file() {
        let fs = fs();
        let ctx = create_file(&fs, "\\f");
        assert!(matches!(
            fs.read_directory(ctx, None, None),
            Err(FsError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_rename_moves_subtree_and_handles() {
        let fs = fs();
        let dir = create_dir(&fs, "\\dir");
        let child = create_file(&fs, "\\dir\\f");
        fs.write(child, 0, b"x", false, false).unwrap();
        fs.rename(dir, "\\dir", "\\moved", false).unwrap();
        assert!(!fs.exists("\\dir\\f"));
        assert!(fs.exists("\\moved\\f"));
        assert_eq!(fs.read(child, 0, 1).unwrap(), b"x");
    }

    #[test]
    fn test_rename_replace_rules() {
        let fs = fs();
        let a = create_file(&fs, "\\a");
        create_file(&fs, "\\b");
        let d = create_dir(&fs, "\\d");
        assert!(matches!(
            fs.rename(a, "\\a", "\\b", false),
            Err(FsError::AlreadyExists { .. })
        ));
        fs.rename(a, "\\a", "\\b", true).unwrap();
        assert!(!fs.exists("\\a"));
        create_file(&fs, "\\c");
        assert!(matches!(
            fs.rename(d, "\\d", "\\c", true),
            Err(FsError::AccessDenied { .. })
        ));
        assert!(fs.rename(d, "\\d", "\\d\\inner", false).is_err());
        assert!(matches!(
            fs.rename(d, "\\d", "\\nowhere\\d", false),
            Err(FsError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_can_delete_non_empty_directory() {
        let fs = fs();
        let dir = create_dir(&fs, "\\dir");
        let f = create_file(&fs, "\\dir\\f");
        assert!(matches!(
            fs.can_delete(dir, "\\dir"),
            Err(FsError::DirectoryNotEmpty { .. })
        ));
        fs.can_delete(f, "\\dir\\f").unwrap();
    }

    #[test]
    fn test_cleanup_delete() {
        let fs = fs();
        let dir = create_dir(&fs, "\\dir");
        let f = create_file(&fs, "\\dir\\f");
        fs.cleanup(dir, Some("\\dir"), CleanupFlags(CleanupFlags::DELETE))
            .unwrap();
        assert!(fs.exists("\\dir"));
        fs.cleanup(f, Some("\\dir\\f"), CleanupFlags(CleanupFlags::DELETE))
            .unwrap();
        assert!(!fs.exists("\\dir\\f"));
        fs.cleanup(dir, Some("\\dir"), CleanupFlags(CleanupFlags::DELETE))
            .unwrap();
        assert!(!fs.exists("\\dir"));
    }

    #[test]
    fn test_set_delete_then_cleanup() {
        let fs = fs();
        let f = create_file(&fs, "\\f");
        fs.set_delete(f, "\\f", true).unwrap();
        fs.cleanup(f, Some("\\f"), CleanupFlags::default()).unwrap();
        assert!(!fs.exists("\\f"));
    }

    #[test]
    fn test_overwrite_truncates() {
        let fs = fs();
        let f = create_file(&fs, "\\f");
        fs.write(f, 0, b"data", false, false).unwrap();
        let info = fs
            .overwrite(f, FileAttributes::HIDDEN, false, 0)
            .unwrap();
        assert_eq!(info.file_size, 0);
        assert!(info.file_attributes.contains(FileAttributes::HIDDEN));
        assert!(info.file_attributes.contains(FileAttributes::ARCHIVE));
    }

    #[test]
    fn test_set_basic_info_keeps_unset_fields() {
        let fs = fs();
        let f = create_file(&fs, "\\f");
        let before = fs.get_file_info(f).unwrap();
        let info = fs
            .set_basic_info(
                f,
                &BasicInfo {
                    last_write_time: 42,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(info.last_write_time, 42);
        assert_eq!(info.file_attributes, before.file_attributes);
        assert_eq!(info.creation_time, before.creation_time);
    }

    #[test]
    fn test_security_inherit_and_evolve() {
        let fs = fs();
        let f = create_file(&fs, "\\f");
        let sd = SecurityDescriptor::from_bytes(&fs.get_security(f).unwrap()).unwrap();
        assert_eq!(sd.to_sddl(), SecurityDescriptor::from_sddl(ROOT_SDDL).unwrap().to_sddl());

        let modification = SecurityDescriptor::from_sddl("O:SYG:SYD:(A;;FR;;;WD)").unwrap();
        fs.set_security(f, SecurityInformation::OWNER, &modification.to_bytes())
            .unwrap();
        let sd = SecurityDescriptor::from_bytes(&fs.get_security(f).unwrap()).unwrap();
        assert_eq!(sd.owner().map(|s| s.to_string()), Some("S-1-5-18".to_string()));
        assert_eq!(sd.dacl().map(<[_]>::len), Some(3));
    }

    #[test]
    fn test_reparse_points() {
        let fs = fs();
        let link = create_file(&fs, "\\link");
        assert_eq!(fs.get_reparse_point_by_name("\\link", false).unwrap(), None);
        let data = ReparseData::symlink("\\target");
        fs.set_reparse_point(link, "\\link", &data).unwrap();
        assert_eq!(fs.get_reparse_point(link, "\\link").unwrap(), data);
        let info = fs.get_file_info(link).unwrap();
        assert!(info.file_attributes.contains(FileAttributes::REPARSE_POINT));
        assert_eq!(info.reparse_tag, data.tag);

        let other = ReparseData::mount_point("\\x");
        assert!(fs.delete_reparse_point(link, "\\link", &other).is_err());
        fs.delete_reparse_point(link, "\\link", &data).unwrap();
        assert!(matches!(
            fs.get_reparse_point(link, "\\link"),
            Err(FsError::NotAReparsePoint { .. })
        ));
    }

    #[test]
    fn test_streams_and_control() {
        let fs = fs();
        let f = create_file(&fs, "\\f");
        fs.write(f, 0, b"abc", false, false).unwrap();
        let streams = fs.get_stream_info(f).unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].size, 3);
        assert_eq!(fs.control(f, CONTROL_ECHO, b"ping").unwrap(), b"ping");
        assert!(fs.control(f, 99, b"").is_err());
    }

    #[test]
    fn test_dir_info_by_name() {
        let fs = fs();
        let dir = create_dir(&fs, "\\dir");
        create_file(&fs, "\\dir\\f");
        let entry = fs.get_dir_info_by_name(dir, "f").unwrap();
        assert_eq!(entry.name, "f");
        assert!(fs.get_dir_info_by_name(dir, "g").is_err());
    }

    #[test]
    fn test_import_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, b"imported").unwrap();
        let fs = fs();
        fs.import_file(&source).unwrap();
        let ctx = fs.open("\\notes.txt", CreateOptions::default(), 0).unwrap().context;
        assert_eq!(fs.read(ctx, 0, 100).unwrap(), b"imported");
        assert!(matches!(
            fs.import_file(&dir.path().join("gone")),
            Err(MemFsError::Import { .. })
        ));
    }
}
