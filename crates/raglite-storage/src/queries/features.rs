//! chunk_features table queries.

use rusqlite::{params, Connection, OptionalExtension};

use raglite_core::errors::StorageError;
use raglite_core::types::ChunkFeature;

use crate::sql_err;

pub fn for_chunk(conn: &Connection, chunk_id: &str) -> Result<Vec<ChunkFeature>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT chunk_id, feature_name, feature_value, feature_meta
             FROM chunk_features WHERE chunk_id = ?1 ORDER BY feature_name",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![chunk_id], |row| {
            Ok(ChunkFeature {
                chunk_id: row.get(0)?,
                feature_name: row.get(1)?,
                feature_value: row.get(2)?,
                feature_meta: row.get(3)?,
            })
        })
        .map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sql_err)?);
    }
    Ok(out)
}

pub fn get_value(
    conn: &Connection,
    chunk_id: &str,
    name: &str,
) -> Result<Option<f64>, StorageError> {
    conn.query_row(
        "SELECT feature_value FROM chunk_features
         WHERE chunk_id = ?1 AND feature_name = ?2",
        params![chunk_id, name],
        |row| row.get(0),
    )
    .optional()
    .map_err(sql_err)
}
