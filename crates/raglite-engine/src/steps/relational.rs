//! filter, project, join and aggregate: lowered to SQLite SQL.

use raglite_core::errors::StepError;
use raglite_storage::ident::{require_column_name, require_table_name};

use crate::params::substitute;
use crate::types::{decode_config, AggregateConfig, FilterConfig, JoinConfig, Step};

use super::{sql_str, storage_err, StepContext};

fn exec_ddl(ctx: &StepContext<'_>, sql: &str) -> Result<(), StepError> {
    ctx.run_db
        .with_conn(|conn| {
            conn.execute_batch(sql)
                .map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))
        })
        .map_err(storage_err)
}

/// Rows of the source satisfying the predicate, order preserved. An empty
/// predicate is vacuously true. Config may add ORDER BY / LIMIT for the
/// search top-k step.
pub fn filter(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    let cfg: FilterConfig = decode_config(step)?;
    require_table_name(source)?;
    require_table_name(&step.output)?;

    let predicate = if step.predicate.trim().is_empty() {
        "1=1".to_string()
    } else {
        substitute(&step.predicate, ctx.params)?
    };

    let mut sql = format!(
        "CREATE TABLE {} AS SELECT * FROM {} WHERE {}",
        step.output, source, predicate
    );
    if !cfg.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&substitute(&cfg.order_by, ctx.params)?);
    }
    if !cfg.limit.is_empty() {
        sql.push_str(" LIMIT ");
        sql.push_str(&substitute(&cfg.limit, ctx.params)?);
    }
    exec_ddl(ctx, &sql).map_err(|e| expr_err(e, &predicate))?;
    Ok(None)
}

/// Projection of the source; row count unchanged. The predicate holds the
/// projection list (`*` when empty).
pub fn project(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    require_table_name(source)?;
    require_table_name(&step.output)?;

    let columns = if step.predicate.trim().is_empty() {
        "*".to_string()
    } else {
        substitute(&step.predicate, ctx.params)?
    };
    let sql = format!(
        "CREATE TABLE {} AS SELECT {} FROM {}",
        step.output, columns, source
    );
    exec_ddl(ctx, &sql).map_err(|e| expr_err(e, &columns))?;
    Ok(None)
}

/// Source combined with the table(s) named in the predicate's join
/// clause. Config may narrow the projection.
pub fn join(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    let cfg: JoinConfig = decode_config(step)?;
    require_table_name(source)?;
    require_table_name(&step.output)?;

    let select = if cfg.select.trim().is_empty() {
        "*".to_string()
    } else {
        substitute(&cfg.select, ctx.params)?
    };
    let clause = substitute(&step.predicate, ctx.params)?;
    let sql = format!(
        "CREATE TABLE {} AS SELECT {} FROM {} {}",
        step.output, select, source, clause
    );
    exec_ddl(ctx, &sql).map_err(|e| expr_err(e, &clause))?;
    Ok(None)
}

/// Feature mode adds named computed expressions (as columns, or unpivoted
/// into feature rows); grouping mode aggregates per the predicate.
pub fn aggregate(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    let cfg: AggregateConfig = decode_config(step)?;
    require_table_name(source)?;
    require_table_name(&step.output)?;

    if !cfg.features.is_empty() {
        if cfg.emit == "rows" {
            let key = if cfg.key_column.is_empty() {
                "id"
            } else {
                require_column_name(&cfg.key_column)?
            };
            let selects: Vec<String> = cfg
                .features
                .iter()
                .map(|f| {
                    Ok(format!(
                        "SELECT {key} AS chunk_id, {} AS feature_name, ({}) AS feature_value, \
                         NULL AS feature_meta FROM {source}",
                        sql_str(&f.name),
                        substitute(&f.expr, ctx.params)?,
                    ))
                })
                .collect::<Result<_, StepError>>()?;
            let sql = format!(
                "CREATE TABLE {} AS {}",
                step.output,
                selects.join(" UNION ALL ")
            );
            exec_ddl(ctx, &sql)?;
        } else {
            let mut columns = Vec::with_capacity(cfg.features.len());
            for f in &cfg.features {
                require_column_name(&f.name)?;
                columns.push(format!("({}) AS {}", substitute(&f.expr, ctx.params)?, f.name));
            }
            let sql = format!(
                "CREATE TABLE {} AS SELECT *, {} FROM {}",
                step.output,
                columns.join(", "),
                source
            );
            exec_ddl(ctx, &sql)?;
        }
        return Ok(None);
    }

    // Grouping mode: predicate is the select list.
    let select = if step.predicate.trim().is_empty() {
        "*".to_string()
    } else {
        substitute(&step.predicate, ctx.params)?
    };
    let mut sql = format!(
        "CREATE TABLE {} AS SELECT {} FROM {}",
        step.output, select, source
    );
    if !cfg.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&substitute(&cfg.group_by, ctx.params)?);
    }
    exec_ddl(ctx, &sql).map_err(|e| expr_err(e, &select))?;
    Ok(None)
}

/// Attribute a SQL failure to the expression that produced it.
fn expr_err(err: StepError, expr: &str) -> StepError {
    match err {
        StepError::Sqlite { message } => StepError::Expression {
            expr: expr.to_string(),
            message,
        },
        other => other,
    }
}
