//! chunks table queries.

use rusqlite::{params, Connection, OptionalExtension, Row};

use raglite_core::errors::StorageError;
use raglite_core::types::{Chunk, ChunkType};

use crate::sql_err;

const COLUMNS: &str = "id, file_id, content, token_count, chunk_type, overlap_prev, \
                       overlap_next, position, parent_id, section, created_by_run";

fn parse_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let chunk_type: String = row.get(4)?;
    Ok(Chunk {
        id: row.get(0)?,
        file_id: row.get(1)?,
        content: row.get(2)?,
        token_count: row.get(3)?,
        chunk_type: ChunkType::parse(&chunk_type).unwrap_or(ChunkType::Semantic),
        overlap_prev: row.get(5)?,
        overlap_next: row.get(6)?,
        position: row.get(7)?,
        parent_id: row.get(8)?,
        section: row.get(9)?,
        created_by_run: row.get(10)?,
    })
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Chunk>, StorageError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM chunks WHERE id = ?1"),
        params![id],
        parse_row,
    )
    .optional()
    .map_err(sql_err)
}

/// Chunks of a file in position order.
pub fn for_file(conn: &Connection, file_id: &str) -> Result<Vec<Chunk>, StorageError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {COLUMNS} FROM chunks WHERE file_id = ?1 ORDER BY position"
        ))
        .map_err(sql_err)?;
    let rows = stmt.query_map(params![file_id], parse_row).map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sql_err)?);
    }
    Ok(out)
}

pub fn count(conn: &Connection) -> Result<i64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
        .map_err(sql_err)
}

/// Export rows ordered by source path then position, for `export`.
pub struct ExportRow {
    pub id: String,
    pub file_id: String,
    pub content: String,
    pub token_count: i64,
    pub chunk_type: String,
    pub source_path: String,
}

pub fn export_rows(conn: &Connection) -> Result<Vec<ExportRow>, StorageError> {
    let mut stmt = conn
        .prepare(
            "SELECT c.id, c.file_id, c.content, c.token_count, c.chunk_type, r.source_path
             FROM chunks c
             JOIN raw_files r ON c.file_id = r.id
             ORDER BY r.source_path, c.position",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ExportRow {
                id: row.get(0)?,
                file_id: row.get(1)?,
                content: row.get(2)?,
                token_count: row.get(3)?,
                chunk_type: row.get(4)?,
                source_path: row.get(5)?,
            })
        })
        .map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sql_err)?);
    }
    Ok(out)
}
