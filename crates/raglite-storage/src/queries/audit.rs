//! Append-only audit log of orchestrator actions.

use rusqlite::{params, Connection};

use raglite_core::errors::StorageError;

use crate::sql_err;

pub fn log(
    conn: &Connection,
    actor: &str,
    action: &str,
    target: &str,
    details: &str,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO audit_log (actor, action, target, details) VALUES (?1, ?2, ?3, ?4)",
        params![actor, action, target, details],
    )
    .map_err(sql_err)?;
    Ok(())
}
