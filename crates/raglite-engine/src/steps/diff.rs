//! diff: compare a step's output to a prior step's by key column.

use rusqlite::{params, Connection, OptionalExtension};

use raglite_core::errors::{StepError, StorageError};
use raglite_core::types::Delta;
use raglite_storage::ident::{require_column_name, require_table_name};
use raglite_storage::queries::run_meta;

use crate::types::{decode_config, DiffConfig, Step};

use super::{storage_err, StepContext};

fn sql_err(e: rusqlite::Error) -> StorageError {
    StorageError::sqlite(e.to_string())
}

/// The predicate names the prior table; the source is the newer one.
pub fn execute(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    let cfg: DiffConfig = decode_config(step)?;
    require_table_name(source)?;
    require_table_name(&step.output)?;
    let prior = step.predicate.trim();
    require_table_name(prior)?;
    let key = require_column_name(&cfg.key_column)?.to_string();
    let sample_size = if ctx.sample_size > 0 {
        ctx.sample_size
    } else {
        cfg.sample_size
    };

    ctx.run_db
        .with_conn(|conn| {
            let rows_before: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {prior}"), [], |r| r.get(0))
                .map_err(sql_err)?;
            let rows_after: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {source}"), [], |r| r.get(0))
                .map_err(sql_err)?;

            let lost = key_difference(conn, prior, source, &key)?;
            let gained = key_difference(conn, source, prior, &key)?;
            let intersection: i64 = conn
                .query_row(
                    &format!(
                        "SELECT COUNT(*) FROM (SELECT {key} FROM {prior}
                         INTERSECT SELECT {key} FROM {source})"
                    ),
                    [],
                    |r| r.get(0),
                )
                .map_err(sql_err)?;
            let union: i64 = conn
                .query_row(
                    &format!(
                        "SELECT COUNT(*) FROM (SELECT {key} FROM {prior}
                         UNION SELECT {key} FROM {source})"
                    ),
                    [],
                    |r| r.get(0),
                )
                .map_err(sql_err)?;
            let jaccard = if union > 0 {
                intersection as f64 / union as f64
            } else {
                1.0
            };

            let delta_type = if rows_after < rows_before {
                "reduction"
            } else if rows_after > rows_before {
                "expansion"
            } else {
                "transformation"
            };
            let delta_score = 1.0 - rows_after as f64 / (rows_before.max(1)) as f64;

            let sample_lost = sample_keys(conn, prior, source, &key, sample_size)?;
            let sample_gained = sample_keys(conn, source, prior, &key, sample_size)?;

            conn.execute_batch(&format!(
                "CREATE TABLE {} (
                    rows_before INTEGER, rows_after INTEGER,
                    rows_lost INTEGER, rows_gained INTEGER,
                    delta_type TEXT, delta_score REAL, jaccard_index REAL,
                    sample_lost TEXT, sample_gained TEXT
                )",
                step.output
            ))
            .map_err(sql_err)?;
            conn.execute(
                &format!(
                    "INSERT INTO {} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    step.output
                ),
                params![
                    rows_before,
                    rows_after,
                    lost,
                    gained,
                    delta_type,
                    delta_score,
                    jaccard,
                    sample_lost,
                    sample_gained,
                ],
            )
            .map_err(sql_err)?;

            // Resolve step orders from the run-db's own copy of the steps.
            let step_from: i64 = conn
                .query_row(
                    "SELECT step_order FROM _workflow_steps WHERE output = ?1",
                    params![prior],
                    |r| r.get(0),
                )
                .optional()
                .map_err(sql_err)?
                .unwrap_or(0);

            run_meta::log_delta(
                conn,
                &Delta {
                    step_from,
                    step_to: step.step_order,
                    rows_before,
                    rows_after,
                    rows_lost: lost,
                    rows_gained: gained,
                    delta_type: delta_type.to_string(),
                    delta_score,
                    jaccard_index: jaccard,
                    sample_lost: Some(sample_lost),
                    sample_gained: Some(sample_gained),
                },
            )?;
            Ok(())
        })
        .map_err(storage_err)?;
    Ok(None)
}

fn key_difference(
    conn: &Connection,
    left: &str,
    right: &str,
    key: &str,
) -> Result<i64, StorageError> {
    conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM (SELECT {key} FROM {left}
             EXCEPT SELECT {key} FROM {right})"
        ),
        [],
        |r| r.get(0),
    )
    .map_err(sql_err)
}

fn sample_keys(
    conn: &Connection,
    left: &str,
    right: &str,
    key: &str,
    limit: usize,
) -> Result<String, StorageError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {key} FROM {left} EXCEPT SELECT {key} FROM {right} LIMIT {limit}"
        ))
        .map_err(sql_err)?;
    let keys: Vec<String> = stmt
        .query_map([], |row| {
            row.get::<_, rusqlite::types::Value>(0).map(|v| match v {
                rusqlite::types::Value::Text(t) => t,
                rusqlite::types::Value::Integer(i) => i.to_string(),
                rusqlite::types::Value::Real(r) => r.to_string(),
                _ => String::new(),
            })
        })
        .map_err(sql_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sql_err)?;
    Ok(serde_json::to_string(&keys).unwrap_or_else(|_| "[]".to_string()))
}
