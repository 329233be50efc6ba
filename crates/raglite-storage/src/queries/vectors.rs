//! chunk_vectors table queries.

use rusqlite::{params, Connection, OptionalExtension};

use raglite_core::errors::StorageError;
use raglite_core::types::{ChunkVector, VectorLayer};

use crate::sql_err;

pub fn get(
    conn: &Connection,
    chunk_id: &str,
    layer: VectorLayer,
) -> Result<Option<ChunkVector>, StorageError> {
    conn.query_row(
        "SELECT chunk_id, layer, vector, dimensions, model_version
         FROM chunk_vectors WHERE chunk_id = ?1 AND layer = ?2",
        params![chunk_id, layer.as_str()],
        |row| {
            let layer: String = row.get(1)?;
            Ok(ChunkVector {
                chunk_id: row.get(0)?,
                layer: VectorLayer::parse(&layer).unwrap_or(VectorLayer::Blend),
                vector: row.get(2)?,
                dimensions: row.get(3)?,
                model_version: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(sql_err)
}

pub fn count(conn: &Connection) -> Result<i64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM chunk_vectors", [], |row| row.get(0))
        .map_err(sql_err)
}

pub fn count_for_layer(conn: &Connection, layer: VectorLayer) -> Result<i64, StorageError> {
    conn.query_row(
        "SELECT COUNT(*) FROM chunk_vectors WHERE layer = ?1",
        params![layer.as_str()],
        |row| row.get(0),
    )
    .map_err(sql_err)
}
