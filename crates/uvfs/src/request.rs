//! Request and response records exchanged with the transport.
//!
//! Each [`Request`] carries one [`Operation`]; the matching [`Response`]
//! echoes the request id and kind so the transport can correlate them
//! regardless of completion order.

use crate::status::NtStatus;
use crate::types::{
    BasicInfo, CleanupFlags, CreateOptions, DirEntry, FileAttributes, FileContext, FileInfo,
    OpenedFile, ReparseData, StreamInfo, VolumeInfo,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation id assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Every operation kind the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    GetVolumeInfo,
    SetVolumeLabel,
    GetSecurityByName,
    Create,
    Open,
    Overwrite,
    Cleanup,
    Close,
    Read,
    Write,
    Flush,
    GetFileInfo,
    SetBasicInfo,
    SetFileSize,
    CanDelete,
    Rename,
    GetSecurity,
    SetSecurity,
    QueryDirectory,
    ResolveReparsePoints,
    GetReparsePoint,
    SetReparsePoint,
    DeleteReparsePoint,
    GetStreamInfo,
    GetDirInfoByName,
    Control,
    SetDelete,
}

impl OpKind {
    pub const ALL: [OpKind; 27] = [
        OpKind::GetVolumeInfo,
        OpKind::SetVolumeLabel,
        OpKind::GetSecurityByName,
        OpKind::Create,
        OpKind::Open,
        OpKind::Overwrite,
        OpKind::Cleanup,
        OpKind::Close,
        OpKind::Read,
        OpKind::Write,
        OpKind::Flush,
        OpKind::GetFileInfo,
        OpKind::SetBasicInfo,
        OpKind::SetFileSize,
        OpKind::CanDelete,
        OpKind::Rename,
        OpKind::GetSecurity,
        OpKind::SetSecurity,
        OpKind::QueryDirectory,
        OpKind::ResolveReparsePoints,
        OpKind::GetReparsePoint,
        OpKind::SetReparsePoint,
        OpKind::DeleteReparsePoint,
        OpKind::GetStreamInfo,
        OpKind::GetDirInfoByName,
        OpKind::Control,
        OpKind::SetDelete,
    ];

    /// Position in [`OpKind::ALL`], also the bit used by debug masks.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn bit(self) -> u32 {
        1u32 << self.index()
    }

    /// Kinds that can change the store even when the backing store was
    /// mounted read-only.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            OpKind::SetVolumeLabel
                | OpKind::Create
                | OpKind::Overwrite
                | OpKind::Write
                | OpKind::SetBasicInfo
                | OpKind::SetFileSize
                | OpKind::Rename
                | OpKind::SetSecurity
                | OpKind::SetReparsePoint
                | OpKind::DeleteReparsePoint
                | OpKind::SetDelete
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::GetVolumeInfo => "get_volume_info",
            OpKind::SetVolumeLabel => "set_volume_label",
            OpKind::GetSecurityByName => "get_security_by_name",
            OpKind::Create => "create",
            OpKind::Open => "open",
            OpKind::Overwrite => "overwrite",
            OpKind::Cleanup => "cleanup",
            OpKind::Close => "close",
            OpKind::Read => "read",
            OpKind::Write => "write",
            OpKind::Flush => "flush",
            OpKind::GetFileInfo => "get_file_info",
            OpKind::SetBasicInfo => "set_basic_info",
            OpKind::SetFileSize => "set_file_size",
            OpKind::CanDelete => "can_delete",
            OpKind::Rename => "rename",
            OpKind::GetSecurity => "get_security",
            OpKind::SetSecurity => "set_security",
            OpKind::QueryDirectory => "query_directory",
            OpKind::ResolveReparsePoints => "resolve_reparse_points",
            OpKind::GetReparsePoint => "get_reparse_point",
            OpKind::SetReparsePoint => "set_reparse_point",
            OpKind::DeleteReparsePoint => "delete_reparse_point",
            OpKind::GetStreamInfo => "get_stream_info",
            OpKind::GetDirInfoByName => "get_dir_info_by_name",
            OpKind::Control => "control",
            OpKind::SetDelete => "set_delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation-specific request fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    GetVolumeInfo,
    SetVolumeLabel {
        label: String,
    },
    GetSecurityByName {
        file_name: String,
    },
    Create {
        file_name: String,
        create_options: CreateOptions,
        granted_access: u32,
        file_attributes: FileAttributes,
        security_descriptor: Option<Vec<u8>>,
        allocation_size: u64,
    },
    Open {
        file_name: String,
        create_options: CreateOptions,
        granted_access: u32,
    },
    Overwrite {
        context: FileContext,
        file_attributes: FileAttributes,
        replace_file_attributes: bool,
        allocation_size: u64,
    },
    Cleanup {
        context: FileContext,
        file_name: Option<String>,
        flags: CleanupFlags,
    },
    Close {
        context: FileContext,
    },
    Read {
        context: FileContext,
        offset: u64,
        length: u32,
    },
    Write {
        context: FileContext,
        offset: u64,
        data: Vec<u8>,
        write_to_end_of_file: bool,
        constrained_io: bool,
    },
    /// `context: None` flushes the whole volume.
    Flush {
        context: Option<FileContext>,
    },
    GetFileInfo {
        context: FileContext,
    },
    SetBasicInfo {
        context: FileContext,
        info: BasicInfo,
    },
    SetFileSize {
        context: FileContext,
        new_size: u64,
        set_allocation_size: bool,
    },
    CanDelete {
        context: FileContext,
        file_name: String,
    },
    Rename {
        context: FileContext,
        file_name: String,
        new_file_name: String,
        replace_if_exists: bool,
    },
    GetSecurity {
        context: FileContext,
    },
    SetSecurity {
        context: FileContext,
        security_information: u32,
        modification: Vec<u8>,
    },
    QueryDirectory {
        context: FileContext,
        pattern: Option<String>,
        marker: Option<String>,
        buffer_len: usize,
    },
    ResolveReparsePoints {
        file_name: String,
        reparse_point_index: usize,
        resolve_last_component: bool,
    },
    GetReparsePoint {
        context: FileContext,
        file_name: String,
    },
    SetReparsePoint {
        context: FileContext,
        file_name: String,
        data: ReparseData,
    },
    DeleteReparsePoint {
        context: FileContext,
        file_name: String,
        data: ReparseData,
    },
    GetStreamInfo {
        context: FileContext,
    },
    GetDirInfoByName {
        context: FileContext,
        file_name: String,
    },
    Control {
        context: FileContext,
        code: u32,
        input: Vec<u8>,
    },
    SetDelete {
        context: FileContext,
        file_name: String,
        delete_file: bool,
    },
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::GetVolumeInfo => OpKind::GetVolumeInfo,
            Operation::SetVolumeLabel { .. } => OpKind::SetVolumeLabel,
            Operation::GetSecurityByName { .. } => OpKind::GetSecurityByName,
            Operation::Create { .. } => OpKind::Create,
            Operation::Open { .. } => OpKind::Open,
            Operation::Overwrite { .. } => OpKind::Overwrite,
            Operation::Cleanup { .. } => OpKind::Cleanup,
            Operation::Close { .. } => OpKind::Close,
            Operation::Read { .. } => OpKind::Read,
            Operation::Write { .. } => OpKind::Write,
            Operation::Flush { .. } => OpKind::Flush,
            Operation::GetFileInfo { .. } => OpKind::GetFileInfo,
            Operation::SetBasicInfo { .. } => OpKind::SetBasicInfo,
            Operation::SetFileSize { .. } => OpKind::SetFileSize,
            Operation::CanDelete { .. } => OpKind::CanDelete,
            Operation::Rename { .. } => OpKind::Rename,
            Operation::GetSecurity { .. } => OpKind::GetSecurity,
            Operation::SetSecurity { .. } => OpKind::SetSecurity,
            Operation::QueryDirectory { .. } => OpKind::QueryDirectory,
            Operation::ResolveReparsePoints { .. } => OpKind::ResolveReparsePoints,
            Operation::GetReparsePoint { .. } => OpKind::GetReparsePoint,
            Operation::SetReparsePoint { .. } => OpKind::SetReparsePoint,
            Operation::DeleteReparsePoint { .. } => OpKind::DeleteReparsePoint,
            Operation::GetStreamInfo { .. } => OpKind::GetStreamInfo,
            Operation::GetDirInfoByName { .. } => OpKind::GetDirInfoByName,
            Operation::Control { .. } => OpKind::Control,
            Operation::SetDelete { .. } => OpKind::SetDelete,
        }
    }

    /// The open file this operation targets, if any.
    pub fn context(&self) -> Option<FileContext> {
        match self {
            Operation::GetVolumeInfo
            | Operation::SetVolumeLabel { .. }
            | Operation::GetSecurityByName { .. }
            | Operation::Create { .. }
            | Operation::Open { .. }
            | Operation::ResolveReparsePoints { .. } => None,
            Operation::Flush { context } => *context,
            Operation::Overwrite { context, .. }
            | Operation::Cleanup { context, .. }
            | Operation::Close { context }
            | Operation::Read { context, .. }
            | Operation::Write { context, .. }
            | Operation::GetFileInfo { context }
            | Operation::SetBasicInfo { context, .. }
            | Operation::SetFileSize { context, .. }
            | Operation::CanDelete { context, .. }
            | Operation::Rename { context, .. }
            | Operation::GetSecurity { context }
            | Operation::SetSecurity { context, .. }
            | Operation::QueryDirectory { context, .. }
            | Operation::GetReparsePoint { context, .. }
            | Operation::SetReparsePoint { context, .. }
            | Operation::DeleteReparsePoint { context, .. }
            | Operation::GetStreamInfo { context }
            | Operation::GetDirInfoByName { context, .. }
            | Operation::Control { context, .. }
            | Operation::SetDelete { context, .. } => Some(*context),
        }
    }

    /// Primary path named by the request, for tracing.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Operation::GetSecurityByName { file_name }
            | Operation::Create { file_name, .. }
            | Operation::Open { file_name, .. }
            | Operation::CanDelete { file_name, .. }
            | Operation::Rename { file_name, .. }
            | Operation::ResolveReparsePoints { file_name, .. }
            | Operation::GetReparsePoint { file_name, .. }
            | Operation::SetReparsePoint { file_name, .. }
            | Operation::DeleteReparsePoint { file_name, .. }
            | Operation::GetDirInfoByName { file_name, .. }
            | Operation::SetDelete { file_name, .. } => Some(file_name),
            Operation::Cleanup { file_name, .. } => file_name.as_deref(),
            _ => None,
        }
    }

    /// Operations that change the namespace or volume and must not overlap
    /// with any other dispatch under the read/write guard.
    pub fn is_structural(&self) -> bool {
        match self {
            Operation::Create { .. }
            | Operation::Overwrite { .. }
            | Operation::Rename { .. }
            | Operation::SetVolumeLabel { .. }
            | Operation::SetDelete { .. } => true,
            Operation::Cleanup { flags, .. } => flags.is_delete(),
            Operation::Flush { context } => context.is_none(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub op: Operation,
}

impl Request {
    pub fn new(id: u64, op: Operation) -> Self {
        Self {
            id: RequestId(id),
            op,
        }
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }
}

/// Operation-specific response payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Reply {
    #[default]
    None,
    VolumeInfo(VolumeInfo),
    SecurityByName {
        file_attributes: FileAttributes,
        security_descriptor: Vec<u8>,
        /// Set when the status is `Reparse`: the index of the first
        /// reparse point component.
        reparse_index: Option<usize>,
    },
    Opened(OpenedFile),
    FileInfo(FileInfo),
    Data(Vec<u8>),
    Written {
        bytes_transferred: u32,
        info: FileInfo,
    },
    Security(Vec<u8>),
    Directory {
        entries: Vec<DirEntry>,
        bytes_transferred: usize,
        /// Resume point for the next page; `None` once the listing is done.
        next_marker: Option<String>,
    },
    Resolved {
        path: String,
        reparse_tag: u32,
        substitutions: u32,
    },
    Reparse(ReparseData),
    Streams(Vec<StreamInfo>),
    DirEntry(DirEntry),
    Control(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    pub kind: OpKind,
    pub status: NtStatus,
    pub reply: Reply,
}

impl Response {
    pub fn ok(request: &Request, reply: Reply) -> Self {
        Self::with_status(request, NtStatus::Success, reply)
    }

    pub fn error(request: &Request, status: NtStatus) -> Self {
        Self::with_status(request, status, Reply::None)
    }

    pub fn with_status(request: &Request, status: NtStatus, reply: Reply) -> Self {
        Self {
            id: request.id,
            kind: request.kind(),
            status,
            reply,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
