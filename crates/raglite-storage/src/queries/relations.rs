//! chunk_relations queries and guarded traversal.

use std::collections::VecDeque;

use rusqlite::{params, Connection};

use raglite_core::errors::StorageError;
use raglite_core::types::{ChunkRelation, RelationType};

use crate::sql_err;

pub fn insert(conn: &Connection, rel: &ChunkRelation) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO chunk_relations
         (from_chunk_id, to_chunk_id, relation_type, weight, created_by_run)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            rel.from_chunk_id,
            rel.to_chunk_id,
            rel.relation_type.as_str(),
            rel.weight,
            rel.created_by_run,
        ],
    )
    .map_err(sql_err)?;
    Ok(())
}

/// Outgoing edges of a chunk.
pub fn from_chunk(conn: &Connection, chunk_id: &str) -> Result<Vec<ChunkRelation>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT from_chunk_id, to_chunk_id, relation_type, weight, created_by_run
             FROM chunk_relations WHERE from_chunk_id = ?1",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![chunk_id], |row| {
            let relation_type: String = row.get(2)?;
            Ok(ChunkRelation {
                from_chunk_id: row.get(0)?,
                to_chunk_id: row.get(1)?,
                relation_type: RelationType::parse(&relation_type)
                    .unwrap_or(RelationType::References),
                weight: row.get(3)?,
                created_by_run: row.get(4)?,
            })
        })
        .map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sql_err)?);
    }
    Ok(out)
}

/// Breadth-first walk of the relation graph up to `max_depth` hops.
///
/// The edge table permits cycles, so revisits are cut with an explicit
/// visited set. Returns visited chunk ids excluding the start.
pub fn neighborhood(
    conn: &Connection,
    start: &str,
    max_depth: usize,
) -> Result<Vec<String>, StorageError> {
    let mut visited = std::collections::HashSet::new();
    let mut queue = VecDeque::new();
    let mut out = Vec::new();

    visited.insert(start.to_string());
    queue.push_back((start.to_string(), 0usize));

    while let Some((id, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for edge in from_chunk(conn, &id)? {
            if visited.insert(edge.to_chunk_id.clone()) {
                out.push(edge.to_chunk_id.clone());
                queue.push_back((edge.to_chunk_id, depth + 1));
            }
        }
    }
    Ok(out)
}

pub fn count(conn: &Connection) -> Result<i64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM chunk_relations", [], |row| row.get(0))
        .map_err(sql_err)
}
