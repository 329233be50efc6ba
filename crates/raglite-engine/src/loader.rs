//! Workflow definition loading and lifecycle.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use raglite_core::errors::{EngineError, EngineResult, StorageError};

use crate::builtins;
use crate::types::{OnEmpty, Operation, Step, Workflow, WorkflowStatus};

fn sql_err(e: rusqlite::Error) -> StorageError {
    StorageError::sqlite(e.to_string())
}

/// Load the highest active version of a workflow with its steps.
pub fn load_active(conn: &Connection, workflow_id: &str) -> EngineResult<Workflow> {
    let header = conn
        .query_row(
            "SELECT id, version, name, description, input_schema, output_schema, status
             FROM workflows
             WHERE id = ?1 AND status = 'active'
             ORDER BY version DESC LIMIT 1",
            params![workflow_id],
            |row| {
                let status: String = row.get(6)?;
                Ok(Workflow {
                    id: row.get(0)?,
                    version: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    input_schema: row.get(4)?,
                    output_schema: row.get(5)?,
                    status: WorkflowStatus::parse(&status).unwrap_or(WorkflowStatus::Draft),
                    steps: Vec::new(),
                })
            },
        )
        .optional()
        .map_err(sql_err)?;

    let mut workflow = header.ok_or_else(|| EngineError::WorkflowNotFound {
        id: workflow_id.to_string(),
    })?;
    workflow.steps = load_steps(conn, workflow_id)?;
    Ok(workflow)
}

fn load_steps(conn: &Connection, workflow_id: &str) -> EngineResult<Vec<Step>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT workflow_id, step_order, step_name, operation, source, predicate,
                    output, config, expects_delta, on_empty
             FROM workflow_steps WHERE workflow_id = ?1 ORDER BY step_order",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![workflow_id], |row| {
            let operation: String = row.get(3)?;
            let on_empty: String = row.get(9)?;
            Ok(Step {
                workflow_id: row.get(0)?,
                step_order: row.get(1)?,
                step_name: row.get(2)?,
                operation: Operation::parse(&operation).unwrap_or(Operation::Filter),
                source: row.get(4)?,
                predicate: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                output: row.get(6)?,
                config: row.get(7)?,
                expects_delta: row.get::<_, i64>(8)? != 0,
                on_empty: OnEmpty::parse(&on_empty).unwrap_or(OnEmpty::Continue),
            })
        })
        .map_err(sql_err)?;
    let mut steps = Vec::new();
    for row in rows {
        steps.push(row.map_err(sql_err)?);
    }
    Ok(steps)
}

/// Workflow listing for the CLI.
pub struct WorkflowSummary {
    pub id: String,
    pub version: i64,
    pub name: String,
    pub description: String,
    pub status: WorkflowStatus,
    pub tags: Vec<String>,
}

pub fn list(conn: &Connection) -> EngineResult<Vec<WorkflowSummary>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, version, name, description, status FROM workflows
             ORDER BY name, version DESC",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map([], |row| {
            let status: String = row.get(4)?;
            Ok(WorkflowSummary {
                id: row.get(0)?,
                version: row.get(1)?,
                name: row.get(2)?,
                description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                status: WorkflowStatus::parse(&status).unwrap_or(WorkflowStatus::Draft),
                tags: Vec::new(),
            })
        })
        .map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        let mut summary = row.map_err(sql_err)?;
        summary.tags = tags(conn, &summary.id)?;
        out.push(summary);
    }
    Ok(out)
}

pub fn tags(conn: &Connection, workflow_id: &str) -> EngineResult<Vec<String>> {
    let mut stmt = conn
        .prepare_cached("SELECT tag FROM workflow_tags WHERE workflow_id = ?1 ORDER BY tag")
        .map_err(sql_err)?;
    let rows = stmt
        .query_map(params![workflow_id], |row| row.get::<_, String>(0))
        .map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sql_err)?);
    }
    Ok(out)
}

pub fn activate(conn: &Connection, workflow_id: &str) -> EngineResult<()> {
    conn.execute(
        "UPDATE workflows SET status = 'active', updated_at = datetime('now') WHERE id = ?1",
        params![workflow_id],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub fn deprecate(conn: &Connection, workflow_id: &str) -> EngineResult<()> {
    conn.execute(
        "UPDATE workflows SET status = 'deprecated', updated_at = datetime('now') WHERE id = ?1",
        params![workflow_id],
    )
    .map_err(sql_err)?;
    Ok(())
}

pub fn delete(conn: &Connection, workflow_id: &str) -> EngineResult<()> {
    conn.execute_batch("BEGIN IMMEDIATE").map_err(sql_err)?;
    let run = || -> Result<(), rusqlite::Error> {
        conn.execute("DELETE FROM workflow_tags WHERE workflow_id = ?1", params![workflow_id])?;
        conn.execute("DELETE FROM workflow_steps WHERE workflow_id = ?1", params![workflow_id])?;
        conn.execute("DELETE FROM workflows WHERE id = ?1", params![workflow_id])?;
        Ok(())
    };
    match run() {
        Ok(()) => {
            conn.execute_batch("COMMIT").map_err(sql_err)?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(EngineError::Storage(sql_err(e)))
        }
    }
}

/// Clone a workflow (steps and tags) under a new id as a draft.
pub fn clone_workflow(
    conn: &Connection,
    source_id: &str,
    new_id: &str,
    new_name: &str,
) -> EngineResult<()> {
    conn.execute_batch("BEGIN IMMEDIATE").map_err(sql_err)?;
    let run = || -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO workflows
             (id, name, version, description, input_schema, output_schema, status)
             SELECT ?1, ?2, 1, description, input_schema, output_schema, 'draft'
             FROM workflows WHERE id = ?3 ORDER BY version DESC LIMIT 1",
            params![new_id, new_name, source_id],
        )?;
        conn.execute(
            "INSERT INTO workflow_steps
             (workflow_id, step_order, step_name, operation, source, predicate, output,
              config, expects_delta, on_empty)
             SELECT ?1, step_order, step_name, operation, source, predicate, output,
                    config, expects_delta, on_empty
             FROM workflow_steps WHERE workflow_id = ?2",
            params![new_id, source_id],
        )?;
        conn.execute(
            "INSERT INTO workflow_tags (workflow_id, tag)
             SELECT ?1, tag FROM workflow_tags WHERE workflow_id = ?2",
            params![new_id, source_id],
        )?;
        Ok(())
    };
    match run() {
        Ok(()) => {
            conn.execute_batch("COMMIT").map_err(sql_err)?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(EngineError::Storage(sql_err(e)))
        }
    }
}

/// Load the built-in workflow definitions and MIME mappings. Idempotent:
/// definitions are INSERT OR REPLACE'd by (id, version).
pub fn load_builtins(conn: &Connection) -> EngineResult<()> {
    for (name, sql) in builtins::ALL {
        conn.execute_batch(sql)
            .map_err(|e| StorageError::Schema {
                message: format!("builtin workflow {name}: {e}"),
            })?;
        info!(workflow = name, "loaded builtin workflow");
    }
    Ok(())
}
