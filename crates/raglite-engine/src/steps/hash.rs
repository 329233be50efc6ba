//! hash: add a content-hash column over the named columns.
//!
//! Hashing happens in Rust per row; SQLite has no native SHA-256 and the
//! column must hold the real digest, not a placeholder.

use rusqlite::types::ValueRef;
use rusqlite::params;

use raglite_core::errors::{StepError, StorageError};
use raglite_core::hash::sha256_hex;
use raglite_storage::ident::{require_column_name, require_table_name};
use xxhash_rust::xxh3::xxh3_64;

use crate::types::{decode_config, HashConfig, Step};

use super::{storage_err, StepContext};

pub fn execute(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    let cfg: HashConfig = decode_config(step)?;
    require_table_name(source)?;
    require_table_name(&step.output)?;
    let out_col = require_column_name(if cfg.output_column.is_empty() {
        "hash"
    } else {
        &cfg.output_column
    })?
    .to_string();
    if cfg.columns.is_empty() {
        return Err(StepError::InvalidConfig {
            operation: "hash".to_string(),
            message: "columns must not be empty".to_string(),
        });
    }
    for col in &cfg.columns {
        require_column_name(col)?;
    }
    let digest: fn(&[u8]) -> String = match cfg.algorithm.as_str() {
        "" | "sha256" => |data| sha256_hex(data),
        "xxh3" => |data| format!("{:016x}", xxh3_64(data)),
        other => {
            return Err(StepError::InvalidConfig {
                operation: "hash".to_string(),
                message: format!("unknown algorithm {other:?}"),
            })
        }
    };

    ctx.run_db
        .with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE {out} AS SELECT * FROM {src};
                 ALTER TABLE {out} ADD COLUMN {col} TEXT;",
                out = step.output,
                src = source,
                col = out_col,
            ))
            .map_err(|e| StorageError::sqlite(e.to_string()))?;

            let column_list = cfg.columns.join(", ");
            let mut select = conn
                .prepare(&format!(
                    "SELECT rowid, {column_list} FROM {}",
                    step.output
                ))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            let mut update = conn
                .prepare(&format!(
                    "UPDATE {} SET {out_col} = ?1 WHERE rowid = ?2",
                    step.output
                ))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;

            let mut rows = select.query([]).map_err(|e| StorageError::sqlite(e.to_string()))?;
            while let Some(row) = rows.next().map_err(|e| StorageError::sqlite(e.to_string()))? {
                let rowid: i64 = row.get(0).map_err(|e| StorageError::sqlite(e.to_string()))?;
                let mut buf: Vec<u8> = Vec::new();
                for i in 0..cfg.columns.len() {
                    match row
                        .get_ref(i + 1)
                        .map_err(|e| StorageError::sqlite(e.to_string()))?
                    {
                        ValueRef::Null => {}
                        ValueRef::Integer(v) => buf.extend_from_slice(v.to_string().as_bytes()),
                        ValueRef::Real(v) => buf.extend_from_slice(v.to_string().as_bytes()),
                        ValueRef::Text(t) => buf.extend_from_slice(t),
                        ValueRef::Blob(b) => buf.extend_from_slice(b),
                    }
                    // Unit separator keeps ('ab','c') distinct from ('a','bc').
                    buf.push(0x1f);
                }
                update
                    .execute(params![digest(&buf), rowid])
                    .map_err(|e| StorageError::sqlite(e.to_string()))?;
            }
            Ok(())
        })
        .map_err(storage_err)?;
    Ok(None)
}
