//! Error handling for raglite.
//! One error enum per subsystem, `thiserror` only, zero `anyhow`.

pub mod config_error;
pub mod engine_error;
pub mod extract_error;
pub mod ingest_error;
pub mod merge_error;
pub mod search_error;
pub mod step_error;
pub mod storage_error;

pub use config_error::ConfigError;
pub use engine_error::{EngineError, EngineResult};
pub use extract_error::ExtractError;
pub use ingest_error::IngestError;
pub use merge_error::MergeError;
pub use search_error::SearchError;
pub use step_error::StepError;
pub use storage_error::StorageError;
