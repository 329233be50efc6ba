//! Ingest errors.

use std::path::PathBuf;

use super::StorageError;

/// Errors raised while importing a file into the corpus.
///
/// A storage-copy failure rolls back the copied blob before surfacing.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Cannot read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("Copy into blob store failed for {path}: {message}")]
    CopyFailed { path: PathBuf, message: String },

    #[error("Duplicate hash race for {id}")]
    DuplicateRace { id: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
