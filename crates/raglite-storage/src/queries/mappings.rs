//! workflow_mappings queries: the editable MIME -> workflow dispatch table.

use rusqlite::{params, Connection, OptionalExtension};

use raglite_core::errors::StorageError;

use crate::sql_err;

pub fn workflow_for_mime(
    conn: &Connection,
    mime_type: &str,
) -> Result<Option<String>, StorageError> {
    conn.query_row(
        "SELECT workflow_id FROM workflow_mappings WHERE mime_type = ?1",
        params![mime_type],
        |row| row.get(0),
    )
    .optional()
    .map_err(sql_err)
}

pub fn set(conn: &Connection, mime_type: &str, workflow_id: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO workflow_mappings (mime_type, workflow_id) VALUES (?1, ?2)
         ON CONFLICT(mime_type) DO UPDATE SET workflow_id = excluded.workflow_id",
        params![mime_type, workflow_id],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub fn all(conn: &Connection) -> Result<Vec<(String, String)>, StorageError> {
    let mut stmt = conn
        .prepare("SELECT mime_type, workflow_id FROM workflow_mappings ORDER BY mime_type")
        .map_err(sql_err)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sql_err)?);
    }
    Ok(out)
}
