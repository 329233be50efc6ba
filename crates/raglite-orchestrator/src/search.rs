//! Search driver: package a query into a search_v1 run and read results.
//!
//! Search errors surface as an empty result set with a message, never a
//! crash. The run-db is removed after reading unless keep_tables is set.

use serde::Serialize;
use tracing::{debug, warn};

use raglite_core::config::SearchConfig;
use raglite_core::errors::{SearchError, StorageError};
use raglite_core::types::RunStatus;
use raglite_engine::{Engine, RunConfig};
use raglite_storage::{Database, DbKind};
use raglite_vectorize::query::{expand_query, fts_match_expr};

/// One search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub score: f64,
    /// Per-layer scores as JSON.
    pub layer_scores: String,
    pub snippet: String,
    pub file_id: String,
}

/// A full response; `message` explains empty result sets.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Call-time overrides for the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub min_score: Option<f64>,
    pub structure_weight: Option<f64>,
    pub lexical_weight: Option<f64>,
    pub contextual_weight: Option<f64>,
}

pub fn search(
    engine: &Engine,
    config: &SearchConfig,
    query: &str,
    options: &SearchOptions,
) -> SearchResponse {
    match run_search(engine, config, query, options) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "search failed");
            SearchResponse {
                results: Vec::new(),
                message: Some(e.to_string()),
            }
        }
    }
}

fn run_search(
    engine: &Engine,
    config: &SearchConfig,
    query: &str,
    options: &SearchOptions,
) -> Result<SearchResponse, SearchError> {
    let terms = expand_query(query);
    if terms.is_empty() {
        return Err(SearchError::EmptyQuery);
    }

    let mut cfg = RunConfig::default();
    let params = &mut cfg.parameters;
    params.insert("query".into(), query.to_string());
    params.insert("fts_query".into(), fts_match_expr(&terms));
    params.insert("candidate_cap".into(), config.candidate_cap.to_string());
    params.insert(
        "top_k".into(),
        options.top_k.unwrap_or(config.top_k).to_string(),
    );
    params.insert(
        "min_score".into(),
        options.min_score.unwrap_or(config.min_score).to_string(),
    );
    params.insert(
        "w_structure".into(),
        options
            .structure_weight
            .unwrap_or(config.structure_weight)
            .to_string(),
    );
    params.insert(
        "w_lexical".into(),
        options
            .lexical_weight
            .unwrap_or(config.lexical_weight)
            .to_string(),
    );
    params.insert(
        "w_contextual".into(),
        options
            .contextual_weight
            .unwrap_or(config.contextual_weight)
            .to_string(),
    );
    let keep_tables = cfg.keep_tables;

    let handle = engine
        .run("search_v1", cfg)
        .map_err(|e| SearchError::WorkflowFailed {
            message: e.to_string(),
        })?;

    if handle.run.status != RunStatus::Completed {
        return Err(SearchError::FtsUnavailable {
            message: format!("search run {} failed", handle.run.run_id),
        });
    }

    let run_db = Database::open(&handle.db_path, DbKind::Run).map_err(|e| {
        SearchError::WorkflowFailed {
            message: e.to_string(),
        }
    })?;

    let results = run_db
        .with_conn(|conn| {
            if !raglite_storage::connection::table_exists(conn, "_output")? {
                return Ok(Vec::new());
            }
            let mut stmt = conn
                .prepare(
                    "SELECT chunk_id, score, layer_scores, snippet, file_id
                     FROM _output ORDER BY score DESC",
                )
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(SearchResult {
                        chunk_id: row.get(0)?,
                        score: row.get(1)?,
                        layer_scores: row.get(2)?,
                        snippet: row.get(3)?,
                        file_id: row.get(4)?,
                    })
                })
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::sqlite(e.to_string()))
        })
        .map_err(|e| SearchError::WorkflowFailed {
            message: e.to_string(),
        })?;

    drop(run_db);
    if !keep_tables {
        let _ = std::fs::remove_file(&handle.db_path);
        for ext in ["db-wal", "db-shm"] {
            let _ = std::fs::remove_file(handle.db_path.with_extension(ext));
        }
    }

    debug!(results = results.len(), "search complete");
    let message = if results.is_empty() {
        Some("no chunks matched the query".to_string())
    } else {
        None
    };
    Ok(SearchResponse { results, message })
}
