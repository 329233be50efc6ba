//! SQLite storage layer.
//!
//! Three database kinds share one wrapper: the permanent corpus, the
//! read-only workflow definitions, and the disposable per-run files.

pub mod connection;
pub mod ident;
pub mod queries;
pub mod schema;

pub use connection::{AttachGuard, Database, DbKind, DbStats};
pub use connection::pool::ReadPool;

use raglite_core::errors::StorageError;

/// Map a rusqlite error to the storage error kind.
pub(crate) fn sql_err(e: rusqlite::Error) -> StorageError {
    StorageError::sqlite(e.to_string())
}
