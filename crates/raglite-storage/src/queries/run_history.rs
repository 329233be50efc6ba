//! run_history queries — the merger's idempotency gate.

use rusqlite::{params, Connection, OptionalExtension};

use raglite_core::errors::StorageError;
use raglite_core::types::MergeStatus;

use crate::sql_err;

/// True when the run has already been merged. This is what makes merging
/// the same run-db twice a no-op.
pub fn is_merged(conn: &Connection, run_id: &str) -> Result<bool, StorageError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM run_history
             WHERE run_id = ?1 AND merge_status = 'merged'",
            params![run_id],
            |row| row.get(0),
        )
        .map_err(sql_err)?;
    Ok(count > 0)
}

pub fn merge_status(
    conn: &Connection,
    run_id: &str,
) -> Result<Option<MergeStatus>, StorageError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT merge_status FROM run_history WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql_err)?;
    Ok(status.as_deref().and_then(MergeStatus::parse))
}

/// Record a failed or skipped merge attempt without touching corpus rows.
pub fn record_outcome(
    conn: &Connection,
    run_id: &str,
    workflow_id: &str,
    workflow_version: i64,
    status: MergeStatus,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO run_history (run_id, workflow_id, workflow_version, merge_status, merged_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(run_id) DO UPDATE SET
            merge_status = excluded.merge_status,
            merged_at = excluded.merged_at",
        params![run_id, workflow_id, workflow_version, status.as_str()],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub struct HistoryRow {
    pub run_id: String,
    pub workflow_id: String,
    pub workflow_version: i64,
    pub rows_produced: i64,
    pub merge_status: MergeStatus,
}

pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<HistoryRow>, StorageError> {
    let mut stmt = conn
        .prepare(
            "SELECT run_id, workflow_id, workflow_version, rows_produced, merge_status
             FROM run_history ORDER BY merged_at DESC LIMIT ?1",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            let status: String = row.get(4)?;
            Ok(HistoryRow {
                run_id: row.get(0)?,
                workflow_id: row.get(1)?,
                workflow_version: row.get(2)?,
                rows_produced: row.get(3)?,
                merge_status: MergeStatus::parse(&status).unwrap_or(MergeStatus::Pending),
            })
        })
        .map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sql_err)?);
    }
    Ok(out)
}
