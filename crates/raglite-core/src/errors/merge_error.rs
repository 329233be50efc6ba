//! Merger errors.

use std::path::PathBuf;

use super::StorageError;

/// Errors raised while integrating a run-db into the corpus.
///
/// Every failure aborts the corpus transaction; the run-db is moved to
/// `failed/` and the corpus is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Run db not found: {path}")]
    RunDbMissing { path: PathBuf },

    #[error("Run {run_id} is not completed (status: {status})")]
    RunNotCompleted { run_id: String, status: String },

    #[error("Run db has no _run_meta row: {path}")]
    MetaMissing { path: PathBuf },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
