//! Embedded schema bootstrap, idempotent via CREATE TABLE IF NOT EXISTS.

pub mod corpus;
pub mod run;
pub mod workflows;

use rusqlite::Connection;

use raglite_core::errors::StorageError;

use crate::connection::DbKind;

/// Execute the schema for the given database kind.
pub fn bootstrap(conn: &Connection, kind: DbKind) -> Result<(), StorageError> {
    let sql = match kind {
        DbKind::Corpus => corpus::SCHEMA,
        DbKind::Workflows => workflows::SCHEMA,
        DbKind::Run => run::SCHEMA,
    };
    conn.execute_batch(sql).map_err(|e| StorageError::Schema {
        message: e.to_string(),
    })
}
