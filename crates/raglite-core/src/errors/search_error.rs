//! Search errors.

/// Errors raised by the search path. These are surfaced as an empty result
/// set with an explanatory message, never a crash.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Full-text index unavailable: {message}")]
    FtsUnavailable { message: String },

    #[error("Query vector missing for layer {layer}")]
    QueryVectorMissing { layer: String },

    #[error("Empty query")]
    EmptyQuery,

    #[error("Search workflow failed: {message}")]
    WorkflowFailed { message: String },
}
