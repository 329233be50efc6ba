//! Key/value config table in the corpus database.

use rusqlite::{params, Connection, OptionalExtension};

use raglite_core::errors::StorageError;

use crate::sql_err;

pub fn get(conn: &Connection, key: &str) -> Result<Option<String>, StorageError> {
    conn.query_row(
        "SELECT value FROM config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(sql_err)
}

pub fn set(conn: &Connection, key: &str, value: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR REPLACE INTO config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )
    .map_err(sql_err)?;
    Ok(())
}
