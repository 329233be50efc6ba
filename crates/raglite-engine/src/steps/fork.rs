//! fork and merge: split into labeled branch tables, union them back.

use raglite_core::errors::{StepError, StorageError};
use raglite_storage::ident::require_table_name;

use crate::params::substitute;
use crate::types::{decode_config, ForkConfig, MergeConfig, Step};

use super::{sql_str, storage_err, StepContext};

fn sql_err(e: rusqlite::Error) -> StorageError {
    StorageError::sqlite(e.to_string())
}

/// Split the source into one table per labeled branch. The output table
/// is a manifest of branches and their row counts.
pub fn fork(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    let cfg: ForkConfig = decode_config(step)?;
    require_table_name(source)?;
    require_table_name(&step.output)?;
    if cfg.branches.is_empty() {
        return Err(StepError::InvalidConfig {
            operation: "fork".to_string(),
            message: "branches must not be empty".to_string(),
        });
    }

    ctx.run_db
        .with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE {} (label TEXT PRIMARY KEY, table_name TEXT, row_count INTEGER)",
                step.output
            ))
            .map_err(sql_err)?;
            Ok(())
        })
        .map_err(storage_err)?;

    for branch in &cfg.branches {
        let table = format!("{}_{}", step.output, branch.label);
        require_table_name(&table)?;
        let predicate = if branch.predicate.trim().is_empty() {
            "1=1".to_string()
        } else {
            substitute(&branch.predicate, ctx.params)?
        };
        ctx.run_db
            .with_conn(|conn| {
                conn.execute_batch(&format!(
                    "CREATE TABLE {table} AS SELECT * FROM {source} WHERE {predicate}"
                ))
                .map_err(sql_err)?;
                conn.execute_batch(&format!(
                    "INSERT INTO {} (label, table_name, row_count)
                     VALUES ({}, {}, (SELECT COUNT(*) FROM {table}))",
                    step.output,
                    sql_str(&branch.label),
                    sql_str(&table),
                ))
                .map_err(sql_err)?;
                Ok(())
            })
            .map_err(storage_err)?;
    }
    Ok(None)
}

/// Union the labeled source tables into the output.
pub fn merge(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    let cfg: MergeConfig = decode_config(step)?;
    require_table_name(&step.output)?;

    let sources = if cfg.sources.is_empty() {
        vec![source.to_string()]
    } else {
        cfg.sources.clone()
    };
    for table in &sources {
        require_table_name(table)?;
    }

    let selects: Vec<String> = sources
        .iter()
        .map(|t| format!("SELECT * FROM {t}"))
        .collect();
    ctx.run_db
        .with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE {} AS {}",
                step.output,
                selects.join(" UNION ALL ")
            ))
            .map_err(sql_err)
        })
        .map_err(storage_err)?;
    Ok(None)
}
