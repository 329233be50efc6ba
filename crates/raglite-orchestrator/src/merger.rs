//! The merger: sole writer of the corpus database.
//!
//! Consumes completed run-dbs from the pending queue in mtime order, one
//! corpus transaction per run-db. A failure rolls the transaction back and
//! moves the file to failed/; the corpus is never left half-merged.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rusqlite::Connection;
use tracing::{error, info, warn};

use raglite_core::config::MergerConfig;
use raglite_core::errors::{MergeError, StorageError};
use raglite_core::traits::{Cancellable, CancellationToken};
use raglite_core::types::MergeStatus;
use raglite_storage::connection::table_exists;
use raglite_storage::queries::run_history;
use raglite_storage::Database;

const RUN_ALIAS: &str = "run_src";

/// Result of merging one run-db.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged { chunks: usize },
    AlreadyMerged,
}

/// Queue depths for status output.
#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    pub pending: usize,
    pub done: usize,
    pub failed: usize,
}

pub struct Merger {
    corpus: Arc<Database>,
    pending_dir: PathBuf,
    done_dir: PathBuf,
    failed_dir: PathBuf,
    batch_size: usize,
    tick_interval: Duration,
    cancel: CancellationToken,
}

impl Merger {
    pub fn new(
        corpus: Arc<Database>,
        data_dir: &Path,
        config: &MergerConfig,
    ) -> Result<Self, MergeError> {
        let queue = data_dir.join("queue");
        let pending_dir = queue.join("pending");
        let done_dir = queue.join("done");
        let failed_dir = queue.join("failed");
        for dir in [&pending_dir, &queue.join("processing"), &done_dir, &failed_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            corpus,
            pending_dir,
            done_dir,
            failed_dir,
            batch_size: config.batch_size,
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn pending_dir(&self) -> &Path {
        &self.pending_dir
    }

    /// Ticker loop. Cancellation is honored between batches only — a
    /// transaction in flight always finishes.
    pub fn run_loop(&self) {
        info!(pending = %self.pending_dir.display(), "merger started");
        while !self.cancel.is_cancelled() {
            match self.process_batch() {
                Ok(0) => {}
                Ok(n) => info!(merged = n, "merger batch done"),
                Err(e) => error!(error = %e, "merger batch failed"),
            }
            // Sleep in slices so shutdown stays inside the 5s budget.
            let mut remaining = self.tick_interval;
            while remaining > Duration::ZERO && !self.cancel.is_cancelled() {
                let slice = remaining.min(Duration::from_millis(100));
                std::thread::sleep(slice);
                remaining = remaining.saturating_sub(slice);
            }
        }
        if let Err(e) = self.corpus.checkpoint() {
            warn!(error = %e, "wal checkpoint on shutdown failed");
        }
        info!("merger stopped");
    }

    /// Merge up to `batch_size` pending run-dbs, FIFO by mtime. Returns
    /// how many were processed (merged, skipped or failed).
    pub fn process_batch(&self) -> Result<usize, MergeError> {
        let mut entries: Vec<(PathBuf, SystemTime)> = std::fs::read_dir(&self.pending_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "db"))
            .filter_map(|e| {
                let mtime = e.metadata().and_then(|m| m.modified()).ok()?;
                Some((e.path(), mtime))
            })
            .collect();
        entries.sort_by_key(|(_, mtime)| *mtime);
        entries.truncate(self.batch_size);

        let mut processed = 0usize;
        for (path, _) in entries {
            processed += 1;
            match self.merge_run(&path) {
                Ok(outcome) => {
                    if let MergeOutcome::Merged { chunks } = outcome {
                        info!(run_db = %path.display(), chunks, "merged");
                    }
                    self.move_to(&path, &self.done_dir)?;
                }
                Err(e) => {
                    error!(run_db = %path.display(), error = %e, "merge failed");
                    self.move_to(&path, &self.failed_dir)?;
                }
            }
        }
        Ok(processed)
    }

    /// Merge a single run-db into the corpus. Idempotent: a run already
    /// recorded as merged is skipped without touching the corpus.
    pub fn merge_run(&self, run_db_path: &Path) -> Result<MergeOutcome, MergeError> {
        if !run_db_path.exists() {
            return Err(MergeError::RunDbMissing {
                path: run_db_path.to_path_buf(),
            });
        }

        let _guard = self.corpus.attach_guard(run_db_path, RUN_ALIAS)?;

        let meta = self.corpus.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT run_id, workflow_id, workflow_version, status, started_at, finished_at
                     FROM {RUN_ALIAS}._run_meta LIMIT 1"
                ),
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .map_err(|e| StorageError::sqlite(e.to_string()))
        });
        let (run_id, workflow_id, workflow_version, status, started_at, finished_at) =
            meta.map_err(|_| MergeError::MetaMissing {
                path: run_db_path.to_path_buf(),
            })?;

        if status != "completed" {
            self.corpus.with_conn(|conn| {
                run_history::record_outcome(
                    conn,
                    &run_id,
                    &workflow_id,
                    workflow_version,
                    MergeStatus::Failed,
                )
            })?;
            return Err(MergeError::RunNotCompleted { run_id, status });
        }

        let already = self
            .corpus
            .with_conn(|conn| run_history::is_merged(conn, &run_id))?;
        if already {
            return Ok(MergeOutcome::AlreadyMerged);
        }

        let chunks = self.corpus.transaction(|conn| {
            let mut inserted = 0usize;

            if table_exists(conn, &format!("{RUN_ALIAS}._output"))? {
                inserted = conn
                    .execute(
                        &format!(
                            "INSERT OR IGNORE INTO chunks
                             (id, file_id, content, token_count, chunk_type, overlap_prev,
                              overlap_next, position, parent_id, section, created_by_run)
                             SELECT id, file_id, content, token_count, chunk_type, overlap_prev,
                                    overlap_next, position, parent_id, section, ?1
                             FROM {RUN_ALIAS}._output"
                        ),
                        rusqlite::params![run_id],
                    )
                    .map_err(|e| StorageError::sqlite(e.to_string()))?;
            }

            if table_exists(conn, &format!("{RUN_ALIAS}._output_features"))? {
                conn.execute_batch(&format!(
                    "INSERT OR REPLACE INTO chunk_features
                     (chunk_id, feature_name, feature_value, feature_meta)
                     SELECT f.chunk_id, f.feature_name, CAST(f.feature_value AS REAL), f.feature_meta
                     FROM {RUN_ALIAS}._output_features f
                     WHERE f.chunk_id IN (SELECT id FROM chunks)"
                ))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            }

            if table_exists(conn, &format!("{RUN_ALIAS}._output_vectors"))? {
                conn.execute_batch(&format!(
                    "INSERT OR REPLACE INTO chunk_vectors
                     (chunk_id, layer, vector, dimensions, model_version)
                     SELECT v.chunk_id, v.layer, v.vector, v.dimensions, v.model_version
                     FROM {RUN_ALIAS}._output_vectors v
                     WHERE v.chunk_id IN (SELECT id FROM chunks)"
                ))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            }

            if table_exists(conn, &format!("{RUN_ALIAS}._output_relations"))? {
                conn.execute(
                    &format!(
                        "INSERT OR IGNORE INTO chunk_relations
                         (from_chunk_id, to_chunk_id, relation_type, weight, created_by_run)
                         SELECT r.from_chunk_id, r.to_chunk_id, r.relation_type, r.weight, ?1
                         FROM {RUN_ALIAS}._output_relations r
                         WHERE r.from_chunk_id IN (SELECT id FROM chunks)
                           AND r.to_chunk_id IN (SELECT id FROM chunks)"
                    ),
                    rusqlite::params![run_id],
                )
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            }

            conn.execute(
                "INSERT OR REPLACE INTO run_history
                 (run_id, workflow_id, workflow_version, started_at, finished_at, status,
                  rows_produced, merge_status, merged_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'completed', ?6, 'merged', datetime('now'))",
                rusqlite::params![
                    run_id,
                    workflow_id,
                    workflow_version,
                    started_at,
                    finished_at,
                    inserted as i64,
                ],
            )
            .map_err(|e| StorageError::sqlite(e.to_string()))?;

            if table_exists(conn, &format!("{RUN_ALIAS}._output"))? {
                conn.execute_batch(&format!(
                    "UPDATE raw_files SET status = 'vectorized'
                     WHERE id IN (SELECT DISTINCT file_id FROM {RUN_ALIAS}._output)"
                ))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            }

            Ok(inserted)
        })?;

        Ok(MergeOutcome::Merged { chunks })
    }

    fn move_to(&self, path: &Path, dir: &Path) -> Result<(), MergeError> {
        let target = dir.join(path.file_name().unwrap_or_default());
        std::fs::rename(path, &target)?;
        // WAL sidecars ride along when present.
        for ext in ["db-wal", "db-shm"] {
            let sidecar = path.with_extension(ext);
            if sidecar.exists() {
                let _ = std::fs::remove_file(&sidecar);
            }
        }
        Ok(())
    }

    pub fn status(&self) -> QueueStatus {
        let count = |dir: &Path| {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .filter(|e| e.path().extension().is_some_and(|x| x == "db"))
                        .count()
                })
                .unwrap_or(0)
        };
        QueueStatus {
            pending: count(&self.pending_dir),
            done: count(&self.done_dir),
            failed: count(&self.failed_dir),
        }
    }

    /// Remove done/ entries older than the cutoff. Returns removed count.
    pub fn gc(&self, max_age: Duration) -> Result<usize, MergeError> {
        let cutoff = SystemTime::now() - max_age;
        let mut removed = 0usize;
        for entry in std::fs::read_dir(&self.done_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|x| x != "db") {
                continue;
            }
            let mtime = entry.metadata().and_then(|m| m.modified());
            if let Ok(mtime) = mtime {
                if mtime < cutoff && std::fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Move failed run-dbs back into the pending queue.
    pub fn retry_failed(&self) -> Result<usize, MergeError> {
        let mut retried = 0usize;
        for entry in std::fs::read_dir(&self.failed_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|x| x != "db") {
                continue;
            }
            let target = self.pending_dir.join(path.file_name().unwrap_or_default());
            if std::fs::rename(&path, &target).is_ok() {
                retried += 1;
            }
        }
        Ok(retried)
    }
}

/// Orphaned run files under runs/ whose `_run_meta.status` is still
/// `running` get removed by GC after the cutoff.
pub fn gc_orphan_runs(runs_dir: &Path, max_age: Duration) -> Result<usize, MergeError> {
    let cutoff = SystemTime::now() - max_age;
    let mut removed = 0usize;
    if !runs_dir.exists() {
        return Ok(0);
    }
    for entry in std::fs::read_dir(runs_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_none_or(|x| x != "db") {
            continue;
        }
        let Ok(mtime) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if mtime >= cutoff {
            continue;
        }
        let stale = Connection::open(&path)
            .ok()
            .and_then(|conn| {
                conn.query_row("SELECT status FROM _run_meta LIMIT 1", [], |r| {
                    r.get::<_, String>(0)
                })
                .ok()
            })
            .map(|status| status == "running" || status == "failed")
            .unwrap_or(true);
        if stale && std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}
