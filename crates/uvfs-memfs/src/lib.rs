#![warn(missing_docs)]

//! In-memory backing store for uvfs, plus the pieces of its demo daemon.

pub mod cli;
pub mod daemon;
pub mod error;
pub mod handles;
pub mod memfs;
pub mod node;
pub mod session;

pub use daemon::MemFsDaemon;
pub use error::MemFsError;
pub use memfs::MemFs;
