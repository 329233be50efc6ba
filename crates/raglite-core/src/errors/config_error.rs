//! Configuration errors.

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },
}
