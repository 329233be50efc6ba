//! Workflow execution: one disposable run-db per run, corpus attached
//! read-only, steps materialized strictly in order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use raglite_core::config::VectorConfig;
use raglite_core::errors::{EngineError, EngineResult, StepError};
use raglite_core::tokens::{ApproxTokenCounter, TokenCounter};
use raglite_core::traits::{Cancellable, CancellationToken};
use raglite_core::types::{Delta, Run, RunStatus, StepExecution};
use raglite_storage::connection::{row_count, table_exists};
use raglite_storage::queries::run_meta;
use raglite_storage::Database;

use crate::loader;
use crate::params::sql_literal;
use crate::steps::{self, StepContext};
use crate::types::{InputSchema, OnEmpty, RunConfig, Step, Workflow};

/// A finished (or failed) run and where its database lives.
#[derive(Debug)]
pub struct RunHandle {
    pub run: Run,
    pub db_path: PathBuf,
}

/// Executes workflows. Shared by all workers; each run gets its own
/// database file under `runs_dir`.
pub struct Engine {
    corpus_path: PathBuf,
    workflows_db: Arc<Database>,
    runs_dir: PathBuf,
    extractors: Arc<raglite_extract::Registry>,
    token_counter: Box<dyn TokenCounter>,
    vectors: VectorConfig,
    worker_id: String,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(
        corpus_path: &Path,
        workflows_db: Arc<Database>,
        runs_dir: &Path,
        extractors: Arc<raglite_extract::Registry>,
        vectors: VectorConfig,
    ) -> Self {
        Self {
            corpus_path: corpus_path.to_path_buf(),
            workflows_db,
            runs_dir: runs_dir.to_path_buf(),
            extractors,
            token_counter: Box::new(ApproxTokenCounter),
            vectors,
            worker_id: "worker-0".to_string(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_worker_id(mut self, worker_id: &str) -> Self {
        self.worker_id = worker_id.to_string();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_token_counter(mut self, counter: Box<dyn TokenCounter>) -> Self {
        self.token_counter = counter;
        self
    }

    pub fn workflows_db(&self) -> &Database {
        &self.workflows_db
    }

    /// Execute a workflow. Step errors do not escape: they are logged in
    /// the run-db and the returned run reports `failed`. Only
    /// infrastructure failures (run-db creation, workflow missing) and
    /// cancellation surface as errors.
    pub fn run(&self, workflow_id: &str, cfg: RunConfig) -> EngineResult<RunHandle> {
        let workflow = self
            .workflows_db
            .with_conn(|conn| Ok(loader::load_active(conn, workflow_id)))
            .map_err(EngineError::Storage)??;

        let run_id = Uuid::new_v4().to_string();
        let run = Run {
            run_id: run_id.clone(),
            workflow_id: workflow.id.clone(),
            workflow_version: workflow.version,
            input_source: cfg
                .parameters
                .get("file_ids")
                .cloned()
                .unwrap_or_default(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Pending,
            worker_id: self.worker_id.clone(),
            config: serde_json::to_string(&cfg).unwrap_or_default(),
        };

        std::fs::create_dir_all(&self.runs_dir).map_err(raglite_core::errors::StorageError::Io)?;
        let run_db = Database::create_run(&self.runs_dir, &run_id)?;
        let db_path = run_db.path().to_path_buf();

        run_db.with_conn(|conn| run_meta::init(conn, &run))?;
        self.copy_steps(&run_db, &workflow)?;
        run_db.with_conn(|conn| run_meta::set_status(conn, &run_id, RunStatus::Running))?;

        let _corpus = run_db.attach_guard(&self.corpus_path, "corpus")?;

        info!(run_id = %run_id, workflow = %workflow.id, "run started");
        let status = self.execute_steps(&run_db, &workflow, &run, &cfg)?;

        run_db.with_conn(|conn| run_meta::finish(conn, &run_id, status))?;
        info!(run_id = %run_id, status = status.as_str(), "run finished");

        let mut finished = run;
        finished.status = status;
        finished.finished_at = Some(Utc::now());
        Ok(RunHandle {
            run: finished,
            db_path,
        })
    }

    fn copy_steps(&self, run_db: &Database, workflow: &Workflow) -> EngineResult<()> {
        run_db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "INSERT INTO _workflow_steps
                     (step_order, step_name, operation, source, predicate, output, config,
                      expects_delta, on_empty)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))?;
            for step in &workflow.steps {
                stmt.execute(rusqlite::params![
                    step.step_order,
                    step.step_name,
                    step.operation.as_str(),
                    step.source,
                    step.predicate,
                    step.output,
                    step.config,
                    step.expects_delta as i64,
                    step.on_empty.as_str(),
                ])
                .map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))?;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Run the step loop; returns the final run status. Step failures are
    /// recorded and reported as `Failed`, never raised.
    fn execute_steps(
        &self,
        run_db: &Database,
        workflow: &Workflow,
        run: &Run,
        cfg: &RunConfig,
    ) -> EngineResult<RunStatus> {
        let deadline = (cfg.deadline_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(cfg.deadline_secs));
        let ctx = StepContext {
            run_db,
            params: &cfg.parameters,
            extractors: &self.extractors,
            vectors: &self.vectors,
            token_counter: self.token_counter.as_ref(),
            run_id: &run.run_id,
            sample_size: cfg.sample_size,
        };

        let mut prev_output: Option<&str> = None;
        let mut skipping = false;

        for step in &workflow.steps {
            if self.cancel.is_cancelled() {
                self.log_skip(run_db, step, "cancelled")?;
                run_db.with_conn(|conn| run_meta::finish(conn, &run.run_id, RunStatus::Failed))?;
                return Err(EngineError::Cancelled);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    self.log_skip(run_db, step, "deadline exceeded")?;
                    return Ok(RunStatus::Failed);
                }
            }
            if skipping {
                self.log_skip(run_db, step, "skipped")?;
                continue;
            }

            let source = self.resolve_source(run_db, workflow, step, prev_output, cfg)?;
            let started = Utc::now();
            let started_at = Instant::now();
            let rows_in = run_db
                .with_conn(|conn| {
                    if source.is_empty() || !table_exists(conn, &source)? {
                        Ok(0)
                    } else {
                        row_count(conn, &source)
                    }
                })
                .unwrap_or(0);

            debug!(step = %step.step_name, source = %source, rows_in, "executing step");
            let result = steps::execute(&ctx, step, &source);

            let duration_ms = started_at.elapsed().as_millis() as i64;
            let rows_out = run_db
                .with_conn(|conn| {
                    if table_exists(conn, &step.output)? {
                        row_count(conn, &step.output)
                    } else {
                        Ok(0)
                    }
                })
                .unwrap_or(0);
            let delta_score = 1.0 - rows_out as f64 / (rows_in.max(1)) as f64;

            let mut exec = StepExecution {
                step_order: step.step_order,
                step_name: step.step_name.clone(),
                started_at: started,
                finished_at: Some(Utc::now()),
                duration_ms,
                rows_in,
                rows_out,
                delta_score,
                output_table: step.output.clone(),
                notes: None,
                error: None,
            };

            match result {
                Ok(note) => {
                    exec.notes = note;
                    run_db.with_conn(|conn| run_meta::log_step(conn, &exec))?;
                }
                Err(e) => {
                    warn!(step = %step.step_name, error = %e, "step failed");
                    exec.error = Some(format!("{e} {}", e.context_json()));
                    run_db.with_conn(|conn| run_meta::log_step(conn, &exec))?;
                    return Ok(RunStatus::Failed);
                }
            }

            if step.expects_delta {
                self.log_expected_delta(run_db, step, &source, rows_in, rows_out)?;
            }

            if rows_out == 0 {
                match step.on_empty {
                    OnEmpty::Fail => {
                        debug!(step = %step.step_name, "empty result, failing run");
                        return Ok(RunStatus::Failed);
                    }
                    OnEmpty::SkipRemaining => skipping = true,
                    OnEmpty::Continue => {}
                }
            }

            prev_output = Some(step.output.as_str());
        }
        Ok(RunStatus::Completed)
    }

    fn log_skip(&self, run_db: &Database, step: &Step, note: &str) -> EngineResult<()> {
        let now = Utc::now();
        run_db.with_conn(|conn| {
            run_meta::log_step(
                conn,
                &StepExecution {
                    step_order: step.step_order,
                    step_name: step.step_name.clone(),
                    started_at: now,
                    finished_at: Some(now),
                    duration_ms: 0,
                    rows_in: 0,
                    rows_out: 0,
                    delta_score: 0.0,
                    output_table: step.output.clone(),
                    notes: Some(note.to_string()),
                    error: None,
                },
            )
        })?;
        Ok(())
    }

    /// `_input` resolves to the prior step's output, or — on step 1 — to a
    /// projection of the corpus table filtered by the workflow's input
    /// schema and the optional `file_ids` run parameter.
    fn resolve_source<'a>(
        &self,
        run_db: &Database,
        workflow: &Workflow,
        step: &Step,
        prev_output: Option<&'a str>,
        cfg: &RunConfig,
    ) -> EngineResult<String> {
        if step.source != "_input" {
            return Ok(step.source.clone());
        }
        if let Some(prev) = prev_output {
            return Ok(prev.to_string());
        }

        let schema: InputSchema = match &workflow.input_schema {
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                EngineError::Step(StepError::InvalidConfig {
                    operation: "input_schema".to_string(),
                    message: e.to_string(),
                })
            })?,
            None => {
                return Err(EngineError::Step(StepError::MissingSource {
                    table: "_input".to_string(),
                }))
            }
        };
        raglite_storage::ident::require_table_name(&schema.source).map_err(EngineError::Step)?;

        let mut clauses: Vec<String> = Vec::new();
        if !schema.mime_types.is_empty() {
            clauses.push(format!("mime_type IN ({})", literal_list(&schema.mime_types)));
        }
        if !schema.statuses.is_empty() {
            clauses.push(format!("status IN ({})", literal_list(&schema.statuses)));
        }
        if let Some(file_ids) = cfg.parameters.get("file_ids") {
            let ids: Vec<String> = file_ids
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !ids.is_empty() {
                clauses.push(format!("id IN ({})", literal_list(&ids)));
            }
        }
        let where_clause = if clauses.is_empty() {
            "1=1".to_string()
        } else {
            clauses.join(" AND ")
        };

        run_db.with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE _input AS SELECT * FROM {} WHERE {}",
                schema.source, where_clause
            ))
            .map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))
        })?;
        Ok("_input".to_string())
    }

    /// Record the declared delta between a step's source and output when
    /// both carry an `id` column; falls back to pure row accounting.
    fn log_expected_delta(
        &self,
        run_db: &Database,
        step: &Step,
        source: &str,
        rows_in: i64,
        rows_out: i64,
    ) -> EngineResult<()> {
        run_db.with_conn(|conn| {
            let keyed = has_column(conn, source, "id")? && has_column(conn, &step.output, "id")?;
            let (lost, gained, jaccard) = if keyed {
                let lost: i64 = conn
                    .query_row(
                        &format!(
                            "SELECT COUNT(*) FROM (SELECT id FROM {source}
                             EXCEPT SELECT id FROM {})",
                            step.output
                        ),
                        [],
                        |r| r.get(0),
                    )
                    .map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))?;
                let gained: i64 = conn
                    .query_row(
                        &format!(
                            "SELECT COUNT(*) FROM (SELECT id FROM {}
                             EXCEPT SELECT id FROM {source})",
                            step.output
                        ),
                        [],
                        |r| r.get(0),
                    )
                    .map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))?;
                let intersection: i64 = conn
                    .query_row(
                        &format!(
                            "SELECT COUNT(*) FROM (SELECT id FROM {source}
                             INTERSECT SELECT id FROM {})",
                            step.output
                        ),
                        [],
                        |r| r.get(0),
                    )
                    .map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))?;
                let union = rows_in + rows_out - intersection;
                let jaccard = if union > 0 {
                    intersection as f64 / union as f64
                } else {
                    1.0
                };
                (lost, gained, jaccard)
            } else {
                ((rows_in - rows_out).max(0), (rows_out - rows_in).max(0), 0.0)
            };

            let delta_type = if rows_out < rows_in {
                "reduction"
            } else if rows_out > rows_in {
                "expansion"
            } else {
                "transformation"
            };
            run_meta::log_delta(
                conn,
                &Delta {
                    step_from: step.step_order - 1,
                    step_to: step.step_order,
                    rows_before: rows_in,
                    rows_after: rows_out,
                    rows_lost: lost,
                    rows_gained: gained,
                    delta_type: delta_type.to_string(),
                    delta_score: 1.0 - rows_out as f64 / (rows_in.max(1)) as f64,
                    jaccard_index: jaccard,
                    sample_lost: None,
                    sample_gained: None,
                },
            )
        })?;
        Ok(())
    }
}

fn has_column(
    conn: &rusqlite::Connection,
    table: &str,
    column: &str,
) -> Result<bool, raglite_core::errors::StorageError> {
    if !table_exists(conn, table)? {
        return Ok(false);
    }
    let pragma = match table.split_once('.') {
        Some((alias, bare)) => format!("PRAGMA {alias}.table_info({bare})"),
        None => format!("PRAGMA table_info({table})"),
    };
    let mut stmt = conn
        .prepare(&pragma)
        .map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| raglite_core::errors::StorageError::sqlite(e.to_string()))?;
    Ok(names.iter().any(|n| n == column))
}

fn literal_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| sql_literal(v))
        .collect::<Vec<_>>()
        .join(", ")
}
