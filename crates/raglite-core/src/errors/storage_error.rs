//! Storage errors.

/// Errors raised by the storage layer. Pragma and DDL failures at open
/// time are fatal; a detach failure is logged but never blocks shutdown.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("Pragma failed at open: {pragma}: {message}")]
    Pragma { pragma: String, message: String },

    #[error("Schema bootstrap failed: {message}")]
    Schema { message: String },

    #[error("Alias {alias:?} already attached")]
    AliasInUse { alias: String },

    #[error("Alias {alias:?} not attached")]
    AliasUnknown { alias: String },

    #[error("Table {name:?} does not exist")]
    NoSuchTable { name: String },

    #[error("Transaction rolled back: {message} (rollback: {rollback})")]
    Rollback { message: String, rollback: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Wrap a rusqlite-level failure message.
    pub fn sqlite(message: impl Into<String>) -> Self {
        Self::Sqlite {
            message: message.into(),
        }
    }
}
