//! raw_files table queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use raglite_core::errors::StorageError;
use raglite_core::types::{FileStatus, RawFile};

use crate::sql_err;

fn parse_row(row: &Row<'_>) -> rusqlite::Result<RawFile> {
    let status: String = row.get(6)?;
    let ingested_at: String = row.get(7)?;
    Ok(RawFile {
        id: row.get(0)?,
        source_path: row.get(1)?,
        mime_type: row.get(2)?,
        size: row.get(3)?,
        external_path: row.get(4)?,
        checksum: row.get(5)?,
        status: FileStatus::parse(&status).unwrap_or(FileStatus::Pending),
        ingested_at: parse_utc(&ingested_at),
    })
}

pub(crate) fn parse_utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

const COLUMNS: &str =
    "id, source_path, mime_type, size, external_path, checksum, status, ingested_at";

/// Insert a new raw file row with status pending.
pub fn insert(conn: &Connection, file: &RawFile) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO raw_files
         (id, source_path, mime_type, size, external_path, checksum, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            file.id,
            file.source_path,
            file.mime_type,
            file.size,
            file.external_path,
            file.checksum,
            file.status.as_str(),
        ],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<RawFile>, StorageError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM raw_files WHERE id = ?1"),
        params![id],
        parse_row,
    )
    .optional()
    .map_err(sql_err)
}

pub fn exists(conn: &Connection, id: &str) -> Result<bool, StorageError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM raw_files WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .map_err(sql_err)?;
    Ok(count > 0)
}

/// Files in a given status, oldest first, for the orchestrator's dispatch.
pub fn list_by_status(
    conn: &Connection,
    status: FileStatus,
    limit: usize,
) -> Result<Vec<RawFile>, StorageError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {COLUMNS} FROM raw_files WHERE status = ?1
             ORDER BY ingested_at ASC LIMIT ?2"
        ))
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![status.as_str(), limit as i64], parse_row)
        .map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sql_err)?);
    }
    Ok(out)
}

/// All files, newest first, optionally filtered by status.
pub fn list(
    conn: &Connection,
    status: Option<FileStatus>,
    limit: usize,
) -> Result<Vec<RawFile>, StorageError> {
    let mut out = Vec::new();
    match status {
        Some(s) => {
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT {COLUMNS} FROM raw_files WHERE status = ?1
                     ORDER BY ingested_at DESC LIMIT ?2"
                ))
                .map_err(sql_err)?;
            let rows = stmt
                .query_map(params![s.as_str(), limit as i64], parse_row)
                .map_err(sql_err)?;
            for row in rows {
                out.push(row.map_err(sql_err)?);
            }
        }
        None => {
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT {COLUMNS} FROM raw_files ORDER BY ingested_at DESC LIMIT ?1"
                ))
                .map_err(sql_err)?;
            let rows = stmt
                .query_map(params![limit as i64], parse_row)
                .map_err(sql_err)?;
            for row in rows {
                out.push(row.map_err(sql_err)?);
            }
        }
    }
    Ok(out)
}

pub fn update_status(
    conn: &Connection,
    id: &str,
    status: FileStatus,
) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE raw_files SET status = ?2 WHERE id = ?1",
        params![id, status.as_str()],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub fn count_by_status(conn: &Connection, status: FileStatus) -> Result<i64, StorageError> {
    conn.query_row(
        "SELECT COUNT(*) FROM raw_files WHERE status = ?1",
        params![status.as_str()],
        |row| row.get(0),
    )
    .map_err(sql_err)
}

pub fn delete(conn: &Connection, id: &str) -> Result<(), StorageError> {
    conn.execute("DELETE FROM raw_files WHERE id = ?1", params![id])
        .map_err(sql_err)?;
    Ok(())
}
