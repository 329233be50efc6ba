//! Engine errors and result alias.

use super::{ConfigError, IngestError, MergeError, SearchError, StepError, StorageError};

/// Errors that can occur while driving workflow runs.
/// Aggregates subsystem errors via `From` conversions.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Workflow {id:?} not found or not active")]
    WorkflowNotFound { id: String },

    #[error("Run {run_id} deadline exceeded")]
    DeadlineExceeded { run_id: String },

    #[error("Run cancelled")]
    Cancelled,
}

pub type EngineResult<T> = Result<T, EngineError>;
