//! Extractor errors.

/// Errors raised by extractors behind the narrow Extract contract.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Content is not valid for {extractor}: {message}")]
    InvalidContent { extractor: String, message: String },

    #[error("Invalid extractor config: {message}")]
    InvalidConfig { message: String },

    #[error("Unsupported MIME type {mime_type}")]
    UnsupportedMime { mime_type: String },
}
