use std::path::PathBuf;
use thiserror::Error;
use uvfs::FsError;

/// Errors from setting up an in-memory volume.
#[derive(Debug, Error)]
pub enum MemFsError {
    #[error("Volume label is {len} characters, at most {max} allowed")]
    LabelTooLong { len: usize, max: usize },

    #[error("Failed to import {}: {source}", path.display())]
    Import {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fs(#[from] FsError),
}
