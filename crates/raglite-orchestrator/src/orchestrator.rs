//! The orchestrator: decides what to process and coordinates workers.
//!
//! A coordinator, not a bulk writer — workers own their run-dbs, the
//! merger owns chunk writes. The orchestrator's only corpus writes are
//! raw_files rows at ingest time and the audit trail.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use raglite_core::config::RagliteConfig;
use raglite_core::errors::{EngineError, EngineResult, IngestError, StorageError};
use raglite_core::traits::{Cancellable, CancellationToken};
use raglite_core::types::{Chunk, FileStatus, RawFile, RunStatus};
use raglite_engine::{Engine, RunConfig, RunHandle};
use raglite_storage::queries::{chunks, mappings, raw_files, relations, vectors};
use raglite_storage::{Database, ReadPool};

use crate::ingest::Ingestor;
use crate::merger::{Merger, QueueStatus};
use crate::search::{self, SearchOptions, SearchResponse};

pub struct Orchestrator {
    config: RagliteConfig,
    corpus: Arc<Database>,
    /// Read-only pool for inspection paths, so status and export never
    /// queue behind the merger's write handle.
    readers: ReadPool,
    workflows: Arc<Database>,
    extractors: Arc<raglite_extract::Registry>,
    cancel: CancellationToken,
}

/// Summary of one process_pending sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessSummary {
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped_unknown_mime: usize,
}

/// Aggregated system status for the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub pending_files: i64,
    pub vectorized_files: i64,
    pub failed_files: i64,
    pub total_chunks: i64,
    pub total_vectors: i64,
    pub total_relations: i64,
    pub queue_pending: usize,
    pub queue_done: usize,
    pub queue_failed: usize,
    pub corpus_size_bytes: u64,
    pub workflows: Vec<String>,
}

impl Orchestrator {
    pub fn new(
        config: RagliteConfig,
        corpus: Arc<Database>,
        workflows: Arc<Database>,
        extractors: Arc<raglite_extract::Registry>,
    ) -> Result<Self, StorageError> {
        let readers = ReadPool::open(&config.corpus_db_path(), 4)?;
        Ok(Self {
            config,
            corpus,
            readers,
            workflows,
            extractors,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn engine(&self, worker_id: &str) -> Engine {
        Engine::new(
            &self.config.corpus_db_path(),
            self.workflows.clone(),
            &self.config.runs_dir(),
            self.extractors.clone(),
            self.config.vectors.clone(),
        )
        .with_worker_id(worker_id)
        .with_cancellation(self.cancel.clone())
    }

    pub fn ingest(&self, path: &Path) -> Result<Vec<String>, IngestError> {
        let ingestor = Ingestor::new(&self.corpus, &self.config.data_dir);
        if path.is_dir() {
            ingestor.ingest_dir(path)
        } else {
            ingestor.ingest_file(path).map(|id| vec![id])
        }
    }

    /// Dispatch all pending files to their mapped workflows across the
    /// worker pool. Files with an unmapped MIME type are not an error —
    /// they stay pending.
    pub fn process_pending(&self, merger: &Merger) -> EngineResult<ProcessSummary> {
        let pending = self
            .corpus
            .with_conn(|conn| raw_files::list_by_status(conn, FileStatus::Pending, 1000))?;

        let mut summary = ProcessSummary::default();
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for file in &pending {
            let workflow = self
                .workflows
                .with_conn(|conn| mappings::workflow_for_mime(conn, &file.mime_type))?;
            match workflow {
                Some(workflow_id) => {
                    match groups.iter_mut().find(|(id, _)| *id == workflow_id) {
                        Some((_, ids)) => ids.push(file.id.clone()),
                        None => groups.push((workflow_id, vec![file.id.clone()])),
                    }
                }
                None => summary.skipped_unknown_mime += 1,
            }
        }
        if groups.is_empty() {
            return Ok(summary);
        }

        let worker_count = self.config.workers.count.max(1);
        let deadline = self.config.workers.run_deadline_secs;
        let results: Vec<EngineResult<RunHandle>> = std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for (slot, (workflow_id, file_ids)) in groups.into_iter().enumerate() {
                let worker_id = format!("worker-{}", slot % worker_count);
                let engine = self.engine(&worker_id);
                handles.push(scope.spawn(move || {
                    let mut cfg = RunConfig {
                        deadline_secs: deadline,
                        ..RunConfig::default()
                    };
                    cfg.parameters
                        .insert("file_ids".to_string(), file_ids.join(","));
                    info!(workflow = %workflow_id, files = file_ids.len(), worker = %worker_id, "dispatching run");
                    engine.run(&workflow_id, cfg)
                }));
            }
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for result in results {
            summary.dispatched += 1;
            match result {
                Ok(handle) if handle.run.status == RunStatus::Completed => {
                    summary.completed += 1;
                    // Ownership of the run-db transfers to the merger here.
                    self.queue_run(merger, &handle.db_path)?;
                }
                Ok(handle) => {
                    summary.failed += 1;
                    warn!(run_id = %handle.run.run_id, "run failed, left in runs/ for inspection");
                }
                Err(EngineError::Cancelled) => {
                    summary.failed += 1;
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(error = %e, "run dispatch failed");
                }
            }
        }
        Ok(summary)
    }

    /// Move a completed run-db into the merger's pending queue.
    pub fn queue_run(&self, merger: &Merger, db_path: &Path) -> EngineResult<()> {
        let target = merger
            .pending_dir()
            .join(db_path.file_name().unwrap_or_default());
        std::fs::rename(db_path, &target).map_err(StorageError::Io)?;
        for ext in ["db-wal", "db-shm"] {
            let sidecar = db_path.with_extension(ext);
            if sidecar.exists() {
                let _ = std::fs::remove_file(sidecar);
            }
        }
        Ok(())
    }

    /// Run a single workflow by id (CLI `run`).
    pub fn run_workflow(&self, workflow_id: &str, cfg: RunConfig) -> EngineResult<RunHandle> {
        self.engine("worker-cli").run(workflow_id, cfg)
    }

    pub fn search(&self, query: &str, options: &SearchOptions) -> SearchResponse {
        let engine = self.engine("worker-search");
        search::search(&engine, &self.config.search, query, options)
    }

    pub fn status(&self, queue: QueueStatus) -> EngineResult<SystemStatus> {
        let (pending, vectorized, failed, chunk_count, vector_count, relation_count) =
            self.readers.with_conn(|conn| {
                Ok((
                    raw_files::count_by_status(conn, FileStatus::Pending)?,
                    raw_files::count_by_status(conn, FileStatus::Vectorized)?,
                    raw_files::count_by_status(conn, FileStatus::Failed)?,
                    chunks::count(conn)?,
                    vectors::count(conn)?,
                    relations::count(conn)?,
                ))
            })?;
        let stats = self.corpus.stats()?;
        let workflow_ids = self
            .workflows
            .with_conn(|conn| {
                Ok(mappings::all(conn)?
                    .into_iter()
                    .map(|(_, workflow)| workflow)
                    .collect::<Vec<_>>())
            })
            .map(|mut ids: Vec<String>| {
                ids.sort_unstable();
                ids.dedup();
                ids
            })?;

        Ok(SystemStatus {
            pending_files: pending,
            vectorized_files: vectorized,
            failed_files: failed,
            total_chunks: chunk_count,
            total_vectors: vector_count,
            total_relations: relation_count,
            queue_pending: queue.pending,
            queue_done: queue.done,
            queue_failed: queue.failed,
            corpus_size_bytes: stats.size_bytes,
            workflows: workflow_ids,
        })
    }

    pub fn get_chunk(&self, chunk_id: &str) -> EngineResult<Option<Chunk>> {
        Ok(self.readers.with_conn(|conn| chunks::get(conn, chunk_id))?)
    }

    pub fn get_file(&self, file_id: &str) -> EngineResult<Option<RawFile>> {
        Ok(self.readers.with_conn(|conn| raw_files::get(conn, file_id))?)
    }

    pub fn list_files(
        &self,
        status: Option<FileStatus>,
        limit: usize,
    ) -> EngineResult<Vec<RawFile>> {
        Ok(self
            .readers
            .with_conn(|conn| raw_files::list(conn, status, limit))?)
    }

    /// Chunks reachable from a start chunk over the relation graph.
    pub fn related_chunks(&self, chunk_id: &str, depth: usize) -> EngineResult<Vec<String>> {
        Ok(self
            .readers
            .with_conn(|conn| relations::neighborhood(conn, chunk_id, depth))?)
    }

    /// Write all chunks as JSON or CSV.
    pub fn export(&self, format: ExportFormat, out: &mut dyn Write) -> EngineResult<()> {
        let rows = self.readers.with_conn(chunks::export_rows)?;
        match format {
            ExportFormat::Json => {
                let items: Vec<serde_json::Value> = rows
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "id": r.id,
                            "file_id": r.file_id,
                            "content": r.content,
                            "token_count": r.token_count,
                            "chunk_type": r.chunk_type,
                            "source_path": r.source_path,
                        })
                    })
                    .collect();
                serde_json::to_writer_pretty(&mut *out, &items).map_err(|e| {
                    EngineError::Storage(StorageError::sqlite(e.to_string()))
                })?;
                writeln!(out).map_err(StorageError::Io)?;
            }
            ExportFormat::Csv => {
                writeln!(out, "id,file_id,token_count,chunk_type,source_path")
                    .map_err(StorageError::Io)?;
                for r in rows {
                    writeln!(
                        out,
                        "{},{},{},{},{}",
                        r.id,
                        r.file_id,
                        r.token_count,
                        r.chunk_type,
                        csv_escape(&r.source_path),
                    )
                    .map_err(StorageError::Io)?;
                }
            }
        }
        Ok(())
    }

    pub fn set_mapping(&self, mime_type: &str, workflow_id: &str) -> EngineResult<()> {
        Ok(self
            .workflows
            .with_conn(|conn| mappings::set(conn, mime_type, workflow_id))?)
    }

    pub fn config(&self) -> &RagliteConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Arc<Database> {
        &self.corpus
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.config.runs_dir()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
