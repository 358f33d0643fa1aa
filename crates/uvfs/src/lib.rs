#![warn(missing_docs)]

//! uvfs: user-mode file system request dispatch.
//!
//! A backing store implements [`FileSystemOperations`]; a
//! [`FileSystemHandle`] binds it to a [`Transport`] and runs a pool of
//! dispatcher workers that answer requests under a guard strategy.

pub mod debug_log;
pub mod dir_buffer;
pub mod dispatcher;
pub mod error;
pub mod file_system;
pub mod filetime;
pub mod guard;
pub mod ops;
pub mod pump;
pub mod reparse;
pub mod request;
pub mod security;
pub mod service;
pub mod status;
pub mod transport;
pub mod types;
pub mod volume;

pub use debug_log::DebugLog;
pub use dispatcher::{DispatcherStats, OperationDispatcher};
pub use error::{FsError, Result};
pub use file_system::{FileSystemHandle, FileSystemState, MountPoint};
pub use guard::{GuardStrategy, OperationGuard};
pub use ops::{CapabilitySet, FileSystemOperations, OperationTable};
pub use request::{OpKind, Operation, Reply, Request, RequestId, Response};
pub use security::{PosixOwnership, SecurityDescriptor, SecurityTranslator};
pub use status::NtStatus;
pub use transport::{ChannelTransport, Transport, TransportClient};
pub use volume::VolumeParams;
