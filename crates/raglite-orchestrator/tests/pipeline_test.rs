//! End-to-end pipeline tests: ingest, process, merge, search.

use std::path::PathBuf;
use std::sync::Arc;

use raglite_core::config::RagliteConfig;
use raglite_core::errors::StorageError;
use raglite_core::hash::sha256_str;
use raglite_core::types::{FileStatus, MergeStatus};
use raglite_engine::loader;
use raglite_orchestrator::{MergeOutcome, Merger, Orchestrator, SearchOptions};
use raglite_storage::queries::{raw_files, run_history};
use raglite_storage::Database;

struct Fixture {
    _dir: tempfile::TempDir,
    data_dir: PathBuf,
    orchestrator: Orchestrator,
    merger: Merger,
    corpus: Arc<Database>,
}

fn setup() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_path_buf();
    let config = RagliteConfig {
        data_dir: data_dir.clone(),
        ..RagliteConfig::default()
    };

    let corpus = Arc::new(Database::open_corpus(&data_dir).unwrap());
    let workflows = Arc::new(Database::open_workflows(&data_dir).unwrap());
    workflows
        .with_conn(|conn| Ok(loader::load_builtins(conn)))
        .unwrap()
        .unwrap();

    let merger = Merger::new(corpus.clone(), &data_dir, &config.merger).unwrap();
    let orchestrator = Orchestrator::new(
        config,
        corpus.clone(),
        workflows,
        Arc::new(raglite_extract::Registry::with_builtins()),
    )
    .unwrap();
    Fixture {
        _dir: dir,
        data_dir,
        orchestrator,
        merger,
        corpus,
    }
}

fn write_source(fx: &Fixture, name: &str, content: &str) -> PathBuf {
    let src_dir = fx.data_dir.join("sources");
    std::fs::create_dir_all(&src_dir).unwrap();
    let path = src_dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

const GO_ADD: &str = "func Add(a, b int) int { return a + b }\n";

#[test]
fn full_pipeline_go_file() {
    let fx = setup();
    let src = write_source(&fx, "add.go", GO_ADD);

    let ids = fx.orchestrator.ingest(&src).unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0], sha256_str(GO_ADD));

    let summary = fx.orchestrator.process_pending(&fx.merger).unwrap();
    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);

    // The run-db now sits in the pending queue; one batch merges it.
    assert_eq!(fx.merger.status().pending, 1);
    let processed = fx.merger.process_batch().unwrap();
    assert_eq!(processed, 1);
    assert_eq!(fx.merger.status().pending, 0);
    assert_eq!(fx.merger.status().done, 1);

    fx.corpus
        .with_conn(|conn| {
            let chunk_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(chunk_count, 1);

            // created_by_run is stamped by the merger.
            let by_run: Option<String> = conn
                .query_row("SELECT created_by_run FROM chunks", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert!(by_run.is_some());

            let vector_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunk_vectors", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(vector_count, 4);

            // Every stored blob satisfies len = 4 * dimensions.
            let bad: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM chunk_vectors WHERE length(vector) != 4 * dimensions",
                    [],
                    |r| r.get(0),
                )
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(bad, 0);

            let file = raw_files::get(conn, &ids[0])?.unwrap();
            assert_eq!(file.status, FileStatus::Vectorized);
            Ok(())
        })
        .unwrap();
}

#[test]
fn merge_twice_is_idempotent() {
    let fx = setup();
    let src = write_source(&fx, "add.go", GO_ADD);
    fx.orchestrator.ingest(&src).unwrap();
    fx.orchestrator.process_pending(&fx.merger).unwrap();

    // Find the queued run-db and merge it directly, twice.
    let pending: Vec<_> = std::fs::read_dir(fx.merger.pending_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "db"))
        .collect();
    assert_eq!(pending.len(), 1);
    let run_db_path = pending[0].path();

    let first = fx.merger.merge_run(&run_db_path).unwrap();
    assert!(matches!(first, MergeOutcome::Merged { chunks: 1 }));

    let snapshot = fx
        .corpus
        .with_conn(|conn| {
            let chunks: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            let vectors: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunk_vectors", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            Ok((chunks, vectors))
        })
        .unwrap();

    let second = fx.merger.merge_run(&run_db_path).unwrap();
    assert_eq!(second, MergeOutcome::AlreadyMerged);

    let after = fx
        .corpus
        .with_conn(|conn| {
            let chunks: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            let vectors: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunk_vectors", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            Ok((chunks, vectors))
        })
        .unwrap();
    assert_eq!(snapshot, after);

    let status = fx
        .corpus
        .with_conn(|conn| {
            let run_id: String = conn
                .query_row("SELECT run_id FROM run_history", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            run_history::merge_status(conn, &run_id)
        })
        .unwrap();
    assert_eq!(status, Some(MergeStatus::Merged));
}

#[test]
fn incomplete_run_db_goes_to_failed() {
    let fx = setup();
    // A run-db whose _run_meta still says running must not merge.
    let runs_dir = fx.data_dir.join("runs");
    std::fs::create_dir_all(&runs_dir).unwrap();
    let run_db = Database::create_run(&runs_dir, "half-done").unwrap();
    run_db
        .with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO _run_meta (run_id, workflow_id, workflow_version, started_at, status)
                 VALUES ('half-done', 'code_chunking_v1', 1, '2026-01-01T00:00:00Z', 'running')",
            )
            .map_err(|e| StorageError::sqlite(e.to_string()))
        })
        .unwrap();
    drop(run_db);

    let queued = fx.merger.pending_dir().join("half-done.db");
    std::fs::rename(runs_dir.join("half-done.db"), &queued).unwrap();

    fx.merger.process_batch().unwrap();
    assert_eq!(fx.merger.status().failed, 1);
    assert_eq!(fx.merger.status().done, 0);

    // Corpus untouched.
    assert_eq!(fx.corpus.row_count("chunks").unwrap(), 0);

    // retry-failed moves it back to pending.
    assert_eq!(fx.merger.retry_failed().unwrap(), 1);
    assert_eq!(fx.merger.status().pending, 1);
}

#[test]
fn search_finds_merged_chunk() {
    let fx = setup();
    let src = write_source(&fx, "add.go", GO_ADD);
    fx.orchestrator.ingest(&src).unwrap();
    fx.orchestrator.process_pending(&fx.merger).unwrap();
    fx.merger.process_batch().unwrap();

    let response = fx
        .orchestrator
        .search("add integers", &SearchOptions::default());
    assert!(
        !response.results.is_empty(),
        "expected a hit: {:?}",
        response.message
    );
    let hit = &response.results[0];
    assert!(hit.score >= 0.0);
    assert!(hit.snippet.contains("Add"));
    let scores: serde_json::Value = serde_json::from_str(&hit.layer_scores).unwrap();
    assert!(scores.get("structure").is_some());

    // top_k = 1 returns exactly one result.
    let one = fx.orchestrator.search(
        "add integers",
        &SearchOptions {
            top_k: Some(1),
            ..SearchOptions::default()
        },
    );
    assert_eq!(one.results.len(), 1);
}

#[test]
fn search_on_empty_corpus_is_empty_with_message() {
    let fx = setup();
    let response = fx.orchestrator.search("anything", &SearchOptions::default());
    assert!(response.results.is_empty());
    assert!(response.message.is_some());
}

#[test]
fn unknown_mime_stays_pending() {
    let fx = setup();
    let src = write_source(&fx, "blob.bin", "\u{1}\u{2}\u{3}binary-ish");
    // Force an unmapped mime by using an extension nobody maps.
    let id = fx.orchestrator.ingest(&src).unwrap()[0].clone();

    let summary = fx.orchestrator.process_pending(&fx.merger).unwrap();
    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.skipped_unknown_mime, 1);

    let file = fx.orchestrator.get_file(&id).unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Pending);
}

#[test]
fn concurrent_workers_on_disjoint_files_merge_cleanly() {
    let fx = setup();
    // Two workflows run in parallel: code and text.
    let go = write_source(&fx, "sum.go", "func Sum(xs []int) int {\n\tt := 0\n\tfor _, x := range xs {\n\t\tt += x\n\t}\n\treturn t\n}\n");
    let txt = write_source(
        &fx,
        "notes.md",
        &format!("# Notes\n\n{}\n\n{}\n", "alpha beta gamma ".repeat(30), "delta words ".repeat(40)),
    );
    fx.orchestrator.ingest(&go).unwrap();
    fx.orchestrator.ingest(&txt).unwrap();

    let summary = fx.orchestrator.process_pending(&fx.merger).unwrap();
    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.completed, 2);

    // Merge everything in mtime order.
    fx.merger.process_batch().unwrap();
    assert_eq!(fx.merger.status().done, 2);

    fx.corpus
        .with_conn(|conn| {
            let files_done: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM raw_files WHERE status = 'vectorized'",
                    [],
                    |r| r.get(0),
                )
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(files_done, 2);
            let chunks: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert!(chunks >= 2);
            let merged: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM run_history WHERE merge_status = 'merged'",
                    [],
                    |r| r.get(0),
                )
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(merged, 2);
            Ok(())
        })
        .unwrap();
}

#[test]
fn gc_removes_old_done_entries() {
    let fx = setup();
    let src = write_source(&fx, "add.go", GO_ADD);
    fx.orchestrator.ingest(&src).unwrap();
    fx.orchestrator.process_pending(&fx.merger).unwrap();
    fx.merger.process_batch().unwrap();
    assert_eq!(fx.merger.status().done, 1);

    // Zero cutoff removes everything already processed.
    let removed = fx.merger.gc(std::time::Duration::ZERO).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(fx.merger.status().done, 0);
}

#[test]
fn export_json_lists_chunks() {
    let fx = setup();
    let src = write_source(&fx, "add.go", GO_ADD);
    fx.orchestrator.ingest(&src).unwrap();
    fx.orchestrator.process_pending(&fx.merger).unwrap();
    fx.merger.process_batch().unwrap();

    let mut buf = Vec::new();
    fx.orchestrator
        .export(raglite_orchestrator::ExportFormat::Json, &mut buf)
        .unwrap();
    let parsed: Vec<serde_json::Value> = serde_json::from_slice(&buf).unwrap();
    assert_eq!(parsed.len(), 1);
    assert!(parsed[0]["content"].as_str().unwrap().contains("Add"));
}
