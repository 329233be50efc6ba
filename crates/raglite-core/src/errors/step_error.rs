//! Workflow step errors.

/// Errors raised while executing a single workflow step.
///
/// Step errors never escape the run-db: the engine logs them into
/// `_step_executions` with a short JSON context and fails the run.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Unknown operation: {operation}")]
    UnknownOperation { operation: String },

    #[error("Invalid config for {operation} step: {message}")]
    InvalidConfig { operation: String, message: String },

    #[error("Expression failed to compile: {expr}: {message}")]
    Expression { expr: String, message: String },

    #[error("Source table {table:?} not found")]
    MissingSource { table: String },

    #[error("Extractor {name:?} not registered")]
    UnknownExtractor { name: String },

    #[error("Extractor {name} failed: {message}")]
    ExtractorFailed { name: String, message: String },

    #[error("Vectorizer failed on layer {layer}: {message}")]
    VectorizerFailed { layer: String, message: String },

    #[error("Unknown run parameter :{name}")]
    UnknownParameter { name: String },

    #[error("Step produced no rows and on_empty = fail")]
    EmptyResult,

    #[error("SQLite error: {message}")]
    Sqlite { message: String },
}

impl StepError {
    pub fn sqlite(message: impl Into<String>) -> Self {
        Self::Sqlite {
            message: message.into(),
        }
    }

    /// Short JSON context recorded next to the error message in the
    /// step-execution log.
    pub fn context_json(&self) -> String {
        let kind = match self {
            Self::UnknownOperation { .. } => "unknown_operation",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::Expression { .. } => "expression",
            Self::MissingSource { .. } => "missing_source",
            Self::UnknownExtractor { .. } => "unknown_extractor",
            Self::ExtractorFailed { .. } => "extractor_failed",
            Self::VectorizerFailed { .. } => "vectorizer_failed",
            Self::UnknownParameter { .. } => "unknown_parameter",
            Self::EmptyResult => "empty_result",
            Self::Sqlite { .. } => "sqlite",
        };
        format!(r#"{{"kind":"{kind}"}}"#)
    }
}
