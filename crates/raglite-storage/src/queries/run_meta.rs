//! Run-db bookkeeping queries: _run_meta, _step_executions, _deltas.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use raglite_core::errors::StorageError;
use raglite_core::types::{Delta, Run, RunStatus, StepExecution};

use super::raw_files::parse_utc;
use crate::sql_err;

/// Insert the single `_run_meta` row for a fresh run.
pub fn init(conn: &Connection, run: &Run) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO _run_meta
         (run_id, workflow_id, workflow_version, input_source, started_at, status, worker_id, config)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            run.run_id,
            run.workflow_id,
            run.workflow_version,
            run.input_source,
            run.started_at.to_rfc3339(),
            run.status.as_str(),
            run.worker_id,
            run.config,
        ],
    )
    .map_err(sql_err)?;
    Ok(())
}

/// Atomically set the run status together with finished_at.
pub fn finish(conn: &Connection, run_id: &str, status: RunStatus) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE _run_meta SET status = ?2, finished_at = ?3 WHERE run_id = ?1",
        params![run_id, status.as_str(), Utc::now().to_rfc3339()],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub fn set_status(conn: &Connection, run_id: &str, status: RunStatus) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE _run_meta SET status = ?2 WHERE run_id = ?1",
        params![run_id, status.as_str()],
    )
    .map_err(sql_err)?;
    Ok(())
}

/// Read the run metadata row (there is at most one).
pub fn get(conn: &Connection) -> Result<Option<Run>, StorageError> {
    conn.query_row(
        "SELECT run_id, workflow_id, workflow_version, input_source, started_at,
                finished_at, status, worker_id, config
         FROM _run_meta LIMIT 1",
        [],
        |row| {
            let started_at: String = row.get(4)?;
            let finished_at: Option<String> = row.get(5)?;
            let status: String = row.get(6)?;
            Ok(Run {
                run_id: row.get(0)?,
                workflow_id: row.get(1)?,
                workflow_version: row.get(2)?,
                input_source: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                started_at: parse_utc(&started_at),
                finished_at: finished_at.as_deref().map(parse_utc),
                status: RunStatus::parse(&status).unwrap_or(RunStatus::Pending),
                worker_id: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                config: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            })
        },
    )
    .optional()
    .map_err(sql_err)
}

/// Append a step-execution log row.
pub fn log_step(conn: &Connection, exec: &StepExecution) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO _step_executions
         (step_order, step_name, started_at, finished_at, duration_ms,
          rows_in, rows_out, delta_score, output_table, notes, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            exec.step_order,
            exec.step_name,
            exec.started_at.to_rfc3339(),
            exec.finished_at.map(|t| t.to_rfc3339()),
            exec.duration_ms,
            exec.rows_in,
            exec.rows_out,
            exec.delta_score,
            exec.output_table,
            exec.notes,
            exec.error,
        ],
    )
    .map_err(sql_err)?;
    Ok(())
}

/// Step-execution log in step order.
pub fn step_log(conn: &Connection) -> Result<Vec<StepExecution>, StorageError> {
    let mut stmt = conn
        .prepare(
            "SELECT step_order, step_name, started_at, finished_at, duration_ms,
                    rows_in, rows_out, delta_score, output_table, notes, error
             FROM _step_executions ORDER BY step_order, id",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map([], |row| {
            let started_at: String = row.get(2)?;
            let finished_at: Option<String> = row.get(3)?;
            Ok(StepExecution {
                step_order: row.get(0)?,
                step_name: row.get(1)?,
                started_at: parse_utc(&started_at),
                finished_at: finished_at.as_deref().map(parse_utc),
                duration_ms: row.get(4)?,
                rows_in: row.get(5)?,
                rows_out: row.get(6)?,
                delta_score: row.get(7)?,
                output_table: row.get(8)?,
                notes: row.get(9)?,
                error: row.get(10)?,
            })
        })
        .map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sql_err)?);
    }
    Ok(out)
}

/// Append a per-step delta record.
pub fn log_delta(conn: &Connection, delta: &Delta) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO _deltas
         (step_from, step_to, rows_before, rows_after, rows_lost, rows_gained,
          delta_type, delta_score, jaccard_index, sample_lost, sample_gained)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            delta.step_from,
            delta.step_to,
            delta.rows_before,
            delta.rows_after,
            delta.rows_lost,
            delta.rows_gained,
            delta.delta_type,
            delta.delta_score,
            delta.jaccard_index,
            delta.sample_lost,
            delta.sample_gained,
        ],
    )
    .map_err(sql_err)?;
    Ok(())
}
