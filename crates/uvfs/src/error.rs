use crate::status::NtStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("Operation not implemented by the backing store: {op}")]
    NotImplemented { op: String },

    #[error("Invalid parameter: {msg}")]
    InvalidParameter { msg: String },

    #[error("File context {context} is not open")]
    InvalidHandle { context: u64 },

    #[error("Invalid name: {name}")]
    InvalidName { name: String },

    #[error("Not found: {name}")]
    NotFound { name: String },

    #[error("Path not found: {name}")]
    PathNotFound { name: String },

    #[error("Name already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Access denied: {name}")]
    AccessDenied { name: String },

    #[error("Not a directory: {name}")]
    NotADirectory { name: String },

    #[error("Is a directory: {name}")]
    IsADirectory { name: String },

    #[error("Directory not empty: {name}")]
    DirectoryNotEmpty { name: String },

    #[error("Read at offset {offset} is past end of file")]
    EndOfFile { offset: u64 },

    #[error("Volume is write protected")]
    WriteProtected,

    #[error("Volume is full")]
    DiskFull,

    #[error("Reparse loop while resolving {path}: more than {limit} substitutions")]
    ReparseLoop { path: String, limit: u32 },

    #[error("Not a reparse point: {name}")]
    NotAReparsePoint { name: String },

    #[error("Broken link: {name}")]
    BrokenLink { name: String },

    #[error("Invalid security descriptor: {reason}")]
    InvalidSecurityDescriptor { reason: String },

    #[error("Identity cannot be mapped: {sid}")]
    UnmappableIdentity { sid: String },

    #[error("Insufficient resources: {resource}")]
    InsufficientResources { resource: String },

    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferOverflow { needed: usize, available: usize },

    #[error("Lifecycle violation in {op}: {reason}")]
    Lifecycle { op: String, reason: String },

    #[error("Transport failure: {msg}")]
    Transport { msg: String },

    #[error("Backing store returned {0}")]
    Status(NtStatus),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;

impl FsError {
    pub fn status(&self) -> NtStatus {
        match self {
            FsError::NotImplemented { .. } => NtStatus::NotImplemented,
            FsError::InvalidParameter { .. } => NtStatus::InvalidParameter,
            FsError::InvalidHandle { .. } => NtStatus::InvalidHandle,
            FsError::InvalidName { .. } => NtStatus::ObjectNameInvalid,
            FsError::NotFound { .. } => NtStatus::ObjectNameNotFound,
            FsError::PathNotFound { .. } => NtStatus::ObjectPathNotFound,
            FsError::AlreadyExists { .. } => NtStatus::ObjectNameCollision,
            FsError::AccessDenied { .. } => NtStatus::AccessDenied,
            FsError::NotADirectory { .. } => NtStatus::NotADirectory,
            FsError::IsADirectory { .. } => NtStatus::FileIsADirectory,
            FsError::DirectoryNotEmpty { .. } => NtStatus::DirectoryNotEmpty,
            FsError::EndOfFile { .. } => NtStatus::EndOfFile,
            FsError::WriteProtected => NtStatus::MediaWriteProtected,
            FsError::DiskFull => NtStatus::DiskFull,
            FsError::ReparseLoop { .. } => NtStatus::ReparsePointNotResolved,
            FsError::NotAReparsePoint { .. } => NtStatus::NotAReparsePoint,
            FsError::BrokenLink { .. } => NtStatus::ObjectPathNotFound,
            FsError::InvalidSecurityDescriptor { .. } => NtStatus::InvalidSecurityDescriptor,
            FsError::UnmappableIdentity { .. } => NtStatus::InvalidOwner,
            FsError::InsufficientResources { .. } => NtStatus::InsufficientResources,
            FsError::BufferOverflow { .. } => NtStatus::BufferOverflow,
            FsError::Lifecycle { .. } => NtStatus::InvalidDeviceRequest,
            FsError::Transport { .. } => NtStatus::Unsuccessful,
            FsError::Status(status) => *status,
            FsError::Io(e) => io_kind_to_status(e.kind()),
        }
    }

    pub fn not_implemented(op: impl Into<String>) -> Self {
        FsError::NotImplemented { op: op.into() }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        FsError::InvalidParameter { msg: msg.into() }
    }

    pub fn lifecycle(op: impl Into<String>, reason: impl Into<String>) -> Self {
        FsError::Lifecycle {
            op: op.into(),
            reason: reason.into(),
        }
    }
}

fn io_kind_to_status(kind: std::io::ErrorKind) -> NtStatus {
    use std::io::ErrorKind;
    match kind {
        ErrorKind::NotFound => NtStatus::ObjectNameNotFound,
        ErrorKind::PermissionDenied => NtStatus::AccessDenied,
        ErrorKind::AlreadyExists => NtStatus::ObjectNameCollision,
        ErrorKind::InvalidInput => NtStatus::InvalidParameter,
        ErrorKind::UnexpectedEof => NtStatus::EndOfFile,
        _ => NtStatus::Unsuccessful,
    }
}
