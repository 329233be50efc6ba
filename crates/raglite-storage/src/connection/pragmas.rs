//! PRAGMA configuration applied to every connection.
//!
//! WAL mode, NORMAL sync, foreign_keys ON, 5s busy_timeout. Pragma failure
//! at open time is fatal.

use rusqlite::Connection;

use raglite_core::errors::StorageError;

/// Apply the required pragmas to a fresh connection.
pub fn apply_pragmas(conn: &Connection) -> Result<(), StorageError> {
    for pragma in [
        "PRAGMA journal_mode = WAL",
        "PRAGMA synchronous = NORMAL",
        "PRAGMA foreign_keys = ON",
        "PRAGMA busy_timeout = 5000",
    ] {
        conn.execute_batch(pragma)
            .map_err(|e| StorageError::Pragma {
                pragma: pragma.to_string(),
                message: e.to_string(),
            })?;
    }
    Ok(())
}

/// Pragmas for read-only pool connections.
pub fn apply_read_pragmas(conn: &Connection) -> Result<(), StorageError> {
    for pragma in ["PRAGMA busy_timeout = 5000", "PRAGMA query_only = ON"] {
        conn.execute_batch(pragma)
            .map_err(|e| StorageError::Pragma {
                pragma: pragma.to_string(),
                message: e.to_string(),
            })?;
    }
    Ok(())
}

/// Verify that WAL mode is active.
pub fn verify_wal_mode(conn: &Connection) -> Result<bool, StorageError> {
    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    Ok(mode.eq_ignore_ascii_case("wal"))
}
