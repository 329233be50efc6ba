//! external: run a registered extractor over each source row's bytes.

use rusqlite::params;

use raglite_core::errors::{StepError, StorageError};
use raglite_storage::ident::require_table_name;

use crate::types::{decode_config, ExternalConfig, Step};

use super::{storage_err, StepContext};

fn sql_err(e: rusqlite::Error) -> StorageError {
    StorageError::sqlite(e.to_string())
}

const SEGMENT_TABLE_COLUMNS: &str = "id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL,
    extractor TEXT NOT NULL,
    extractor_version TEXT NOT NULL,
    segment_type TEXT NOT NULL,
    content TEXT NOT NULL,
    page INTEGER,
    position INTEGER NOT NULL,
    bbox TEXT,
    confidence REAL NOT NULL DEFAULT 1.0,
    meta TEXT";

pub fn execute(
    ctx: &StepContext<'_>,
    step: &Step,
    source: &str,
) -> Result<Option<String>, StepError> {
    let cfg: ExternalConfig = decode_config(step)?;
    require_table_name(source)?;
    require_table_name(&step.output)?;

    ctx.run_db
        .with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE {} ({SEGMENT_TABLE_COLUMNS})",
                step.output
            ))
            .map_err(sql_err)
        })
        .map_err(storage_err)?;

    let extractor = match ctx.extractors.get(&cfg.extractor) {
        Some(e) => e,
        None => {
            // An unregistered extractor yields an empty output; the step's
            // on_empty policy decides what happens next.
            return Ok(Some(format!("extractor {:?} not registered", cfg.extractor)));
        }
    };

    // Source rows are raw_files projections: id, external_path, mime_type.
    let files: Vec<(String, String, String)> = ctx
        .run_db
        .with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT id, external_path, mime_type FROM {source}"
                ))
                .map_err(sql_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .map_err(sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
        })
        .map_err(storage_err)?;

    let mut extracted = 0usize;
    for (file_id, external_path, mime_type) in files {
        let bytes = std::fs::read(&external_path).map_err(|e| StepError::ExtractorFailed {
            name: cfg.extractor.clone(),
            message: format!("read {external_path}: {e}"),
        })?;

        let mut config = cfg.options.clone();
        if !config.is_object() {
            config = serde_json::json!({});
        }
        config["mime_type"] = serde_json::Value::String(mime_type);

        let segments = extractor
            .extract(&file_id, &bytes, &config)
            .map_err(|e| StepError::ExtractorFailed {
                name: cfg.extractor.clone(),
                message: e.to_string(),
            })?;

        ctx.run_db
            .with_conn(|conn| {
                let mut insert = conn
                    .prepare(&format!(
                        "INSERT OR REPLACE INTO {}
                         (id, file_id, extractor, extractor_version, segment_type, content,
                          page, position, bbox, confidence, meta)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                        step.output
                    ))
                    .map_err(sql_err)?;
                for segment in segments {
                    let segment = segment.map_err(|e| {
                        StorageError::sqlite(format!("extractor {}: {e}", cfg.extractor))
                    })?;
                    let meta = serde_json::to_string(&segment.meta).unwrap_or_default();
                    insert
                        .execute(params![
                            segment.id,
                            segment.file_id,
                            segment.extractor,
                            segment.extractor_version,
                            segment.segment_type.as_str(),
                            segment.content,
                            segment.page,
                            segment.position,
                            segment.bbox,
                            segment.confidence,
                            meta,
                        ])
                        .map_err(sql_err)?;
                    extracted += 1;
                }
                Ok(())
            })
            .map_err(storage_err)?;
    }

    Ok(Some(format!("extracted {extracted} segments")))
}
