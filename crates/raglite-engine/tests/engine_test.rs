//! Engine integration tests: real run-dbs on disk, builtin workflows,
//! step semantics and empty-result policies.

use std::path::Path;
use std::sync::Arc;

use raglite_core::config::VectorConfig;
use raglite_core::errors::{EngineError, StorageError};
use raglite_core::hash::{sha256_hex, sha256_str};
use raglite_core::traits::{Cancellable, CancellationToken};
use raglite_core::types::RunStatus;
use raglite_engine::{loader, Engine, RunConfig};
use raglite_storage::Database;
use rusqlite::params;

struct Fixture {
    _dir: tempfile::TempDir,
    corpus: Database,
    workflows: Arc<Database>,
    engine: Engine,
    data_dir: std::path::PathBuf,
}

fn setup() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_path_buf();
    let corpus = Database::open_corpus(&data_dir).unwrap();
    let workflows = Arc::new(Database::open_workflows(&data_dir).unwrap());
    workflows
        .with_conn(|conn| Ok(loader::load_builtins(conn)))
        .unwrap()
        .unwrap();

    let engine = Engine::new(
        &data_dir.join("corpus.db"),
        workflows.clone(),
        &data_dir.join("runs"),
        Arc::new(raglite_extract::Registry::with_builtins()),
        VectorConfig::default(),
    );
    Fixture {
        _dir: dir,
        corpus,
        workflows,
        engine,
        data_dir,
    }
}

/// Write a file into the blob store and register it in raw_files.
fn ingest_fixture(fx: &Fixture, name: &str, mime: &str, content: &str) -> String {
    let id = sha256_str(content);
    let blob_dir = fx.data_dir.join("storage").join("raw").join(&id[..2]);
    std::fs::create_dir_all(&blob_dir).unwrap();
    let blob_path = blob_dir.join(&id);
    std::fs::write(&blob_path, content).unwrap();

    fx.corpus
        .with_conn(|conn| {
            conn.execute(
                "INSERT INTO raw_files (id, source_path, mime_type, size, external_path, checksum)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    name,
                    mime,
                    content.len() as i64,
                    blob_path.to_string_lossy(),
                    id
                ],
            )
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
            Ok(())
        })
        .unwrap();
    id
}

fn open_run_db(path: &Path) -> Database {
    Database::open(path, raglite_storage::DbKind::Run).unwrap()
}

fn insert_workflow(fx: &Fixture, id: &str, steps_sql: &str) {
    fx.workflows
        .with_conn(|conn| {
            conn.execute(
                "INSERT INTO workflows (id, version, name, status, input_schema)
                 VALUES (?1, 1, ?1, 'active',
                         '{\"source\": \"corpus.raw_files\", \"statuses\": [\"pending\"]}')",
                params![id],
            )
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
            conn.execute_batch(steps_sql)
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            Ok(())
        })
        .unwrap();
}

const GO_ADD: &str = "func Add(a, b int) int { return a + b }\n";

#[test]
fn code_workflow_produces_chunk_and_vectors() {
    let fx = setup();
    ingest_fixture(&fx, "add.go", "text/x-go", GO_ADD);

    let handle = fx
        .engine
        .run("code_chunking_v1", RunConfig::default())
        .unwrap();
    assert_eq!(handle.run.status, RunStatus::Completed);

    let run_db = open_run_db(&handle.db_path);
    assert_eq!(run_db.row_count("_output").unwrap(), 1);

    run_db
        .with_conn(|conn| {
            let (chunk_id, chunk_type, token_count): (String, String, i64) = conn
                .query_row(
                    "SELECT id, chunk_type, token_count FROM _output",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(chunk_type, "semantic");
            assert!(token_count > 0);

            // All four layers present with the declared dimensions.
            for (layer, dims) in [
                ("structure", 256i64),
                ("lexical", 128),
                ("contextual", 128),
                ("blend", 256),
            ] {
                let (blob, stored_dims): (Vec<u8>, i64) = conn
                    .query_row(
                        "SELECT vector, dimensions FROM _output_vectors
                         WHERE chunk_id = ?1 AND layer = ?2",
                        params![chunk_id, layer],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .map_err(|e| StorageError::sqlite(e.to_string()))?;
                assert_eq!(stored_dims, dims, "layer {layer}");
                assert_eq!(blob.len() as i64, 4 * dims, "layer {layer}");
            }

            let has_func: f64 = conn
                .query_row(
                    "SELECT feature_value FROM _output_features
                     WHERE chunk_id = ?1 AND feature_name = 'has_func'",
                    params![chunk_id],
                    |row| row.get(0),
                )
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(has_func, 1.0);
            Ok(())
        })
        .unwrap();
}

#[test]
fn chunk_id_is_content_hash() {
    let fx = setup();
    ingest_fixture(&fx, "add.go", "text/x-go", GO_ADD);
    let handle = fx
        .engine
        .run("code_chunking_v1", RunConfig::default())
        .unwrap();
    let run_db = open_run_db(&handle.db_path);
    run_db
        .with_conn(|conn| {
            let (id, content): (String, String) = conn
                .query_row("SELECT id, content FROM _output", [], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(id, sha256_str(&content));
            Ok(())
        })
        .unwrap();
}

#[test]
fn vacuous_filter_preserves_rows_and_order() {
    let fx = setup();
    for i in 0..3 {
        ingest_fixture(
            &fx,
            &format!("f{i}.txt"),
            "text/plain",
            &format!("file number {i} body"),
        );
    }
    insert_workflow(
        &fx,
        "passthrough_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, expects_delta, on_empty)
         VALUES ('passthrough_v1', 1, 'all', 'filter', '_input', '', 'all_files', 0, 'continue')",
    );

    let handle = fx
        .engine
        .run("passthrough_v1", RunConfig::default())
        .unwrap();
    assert_eq!(handle.run.status, RunStatus::Completed);

    let run_db = open_run_db(&handle.db_path);
    assert_eq!(run_db.row_count("all_files").unwrap(), 3);

    // Same order as the corpus table scan.
    let corpus_ids: Vec<String> = fx
        .corpus
        .with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM raw_files")
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            Ok(ids)
        })
        .unwrap();
    let run_ids: Vec<String> = run_db
        .with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM all_files")
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            Ok(ids)
        })
        .unwrap();
    assert_eq!(corpus_ids, run_ids);
}

#[test]
fn on_empty_fail_fails_the_run_once() {
    let fx = setup();
    ingest_fixture(&fx, "f.txt", "text/plain", "body");
    insert_workflow(
        &fx,
        "must_fail_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, expects_delta, on_empty)
         VALUES
         ('must_fail_v1', 1, 'none', 'filter', '_input', '1=0', 'nothing', 0, 'fail'),
         ('must_fail_v1', 2, 'later', 'filter', '_input', '', 'unreached', 0, 'continue')",
    );

    let handle = fx.engine.run("must_fail_v1", RunConfig::default()).unwrap();
    assert_eq!(handle.run.status, RunStatus::Failed);

    let run_db = open_run_db(&handle.db_path);
    run_db
        .with_conn(|conn| {
            let status: String = conn
                .query_row("SELECT status FROM _run_meta", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(status, "failed");
            let finished: Option<String> = conn
                .query_row("SELECT finished_at FROM _run_meta", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert!(finished.is_some());
            // Only the failing step ran.
            let logged: i64 = conn
                .query_row("SELECT COUNT(*) FROM _step_executions", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(logged, 1);
            Ok(())
        })
        .unwrap();
    assert!(!run_db.table_exists("unreached").unwrap());
}

#[test]
fn skip_remaining_completes_with_skipped_steps() {
    let fx = setup();
    insert_workflow(
        &fx,
        "skippy_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, expects_delta, on_empty)
         VALUES
         ('skippy_v1', 1, 'none', 'filter', '_input', '1=0', 'empty_set', 0, 'skip_remaining'),
         ('skippy_v1', 2, 'later', 'filter', 'empty_set', '', 'skipped_out', 0, 'continue')",
    );

    let handle = fx.engine.run("skippy_v1", RunConfig::default()).unwrap();
    assert_eq!(handle.run.status, RunStatus::Completed);

    let run_db = open_run_db(&handle.db_path);
    run_db
        .with_conn(|conn| {
            let note: Option<String> = conn
                .query_row(
                    "SELECT notes FROM _step_executions WHERE step_order = 2",
                    [],
                    |r| r.get(0),
                )
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(note.as_deref(), Some("skipped"));
            Ok(())
        })
        .unwrap();
}

#[test]
fn hash_step_computes_real_sha256() {
    let fx = setup();
    ingest_fixture(&fx, "f.txt", "text/plain", "hash me please");
    insert_workflow(
        &fx,
        "hasher_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, config, expects_delta, on_empty)
         VALUES
         ('hasher_v1', 1, 'all', 'filter', '_input', '', 'picked', NULL, 0, 'continue'),
         ('hasher_v1', 2, 'hashed', 'hash', 'picked', '', 'with_hash',
          '{\"columns\": [\"source_path\"], \"output_column\": \"path_hash\"}', 0, 'continue')",
    );

    let handle = fx.engine.run("hasher_v1", RunConfig::default()).unwrap();
    assert_eq!(handle.run.status, RunStatus::Completed);

    let run_db = open_run_db(&handle.db_path);
    run_db
        .with_conn(|conn| {
            let (path, hash): (String, String) = conn
                .query_row("SELECT source_path, path_hash FROM with_hash", [], |r| {
                    Ok((r.get(0)?, r.get(1)?))
                })
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            let mut expect = path.into_bytes();
            expect.push(0x1f);
            assert_eq!(hash, sha256_hex(&expect));
            // The placeholder shape (64 zeros) must never appear.
            assert_ne!(hash, "0".repeat(64));
            Ok(())
        })
        .unwrap();
}

#[test]
fn step_error_is_logged_and_run_fails() {
    let fx = setup();
    ingest_fixture(&fx, "f.txt", "text/plain", "body");
    insert_workflow(
        &fx,
        "broken_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, expects_delta, on_empty)
         VALUES ('broken_v1', 1, 'bad', 'filter', '_input', 'no_such_column = 1', 'out', 0, 'continue')",
    );

    let handle = fx.engine.run("broken_v1", RunConfig::default()).unwrap();
    assert_eq!(handle.run.status, RunStatus::Failed);

    let run_db = open_run_db(&handle.db_path);
    run_db
        .with_conn(|conn| {
            let error: Option<String> = conn
                .query_row("SELECT error FROM _step_executions", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            let error = error.unwrap();
            assert!(error.contains("no_such_column"));
            assert!(error.contains("\"kind\""));
            Ok(())
        })
        .unwrap();
}

#[test]
fn unknown_run_parameter_fails_the_run() {
    let fx = setup();
    ingest_fixture(&fx, "f.txt", "text/plain", "body");
    insert_workflow(
        &fx,
        "needs_param_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, expects_delta, on_empty)
         VALUES ('needs_param_v1', 1, 'p', 'filter', '_input', 'size > :threshold', 'out', 0, 'continue')",
    );
    let handle = fx
        .engine
        .run("needs_param_v1", RunConfig::default())
        .unwrap();
    assert_eq!(handle.run.status, RunStatus::Failed);
}

#[test]
fn window_respects_min_tokens_floor() {
    let fx = setup();
    // Three short paragraphs and one long one; min_tokens 50 in the text
    // workflow means nothing under the floor may be emitted.
    let long: String = (0..120).map(|i| format!("word{i} ")).collect();
    let content = format!("tiny one\n\nanother small\n\n{long}\n");
    ingest_fixture(&fx, "doc.txt", "text/plain", &content);

    let handle = fx
        .engine
        .run("text_chunking_v1", RunConfig::default())
        .unwrap();
    assert_eq!(handle.run.status, RunStatus::Completed);

    let run_db = open_run_db(&handle.db_path);
    run_db
        .with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT token_count FROM _output")
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            let counts = stmt
                .query_map([], |row| row.get::<_, i64>(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert!(!counts.is_empty());
            for count in counts {
                assert!(count >= 50, "chunk below min_tokens floor: {count}");
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn window_overlap_links_adjacent_chunks() {
    let fx = setup();
    // Three ~300-token paragraphs force at least two chunks at max 512,
    // carrying 64 overlap tokens across each cut.
    let para = |tag: &str| -> String {
        (0..300).map(|i| format!("{tag}{i} ")).collect::<String>()
    };
    let content = format!("{}\n\n{}\n\n{}\n", para("alpha"), para("beta"), para("gamma"));
    ingest_fixture(&fx, "long.txt", "text/plain", &content);

    let handle = fx
        .engine
        .run("text_chunking_v1", RunConfig::default())
        .unwrap();
    assert_eq!(handle.run.status, RunStatus::Completed);

    let run_db = open_run_db(&handle.db_path);
    run_db
        .with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT overlap_prev, overlap_next, position FROM _output ORDER BY position",
                )
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(|e| StorageError::sqlite(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert!(rows.len() >= 2, "expected multiple chunks, got {}", rows.len());
            for pair in rows.windows(2) {
                // The tail carried out of one chunk equals the head carried
                // into the next.
                assert_eq!(pair[0].1, pair[1].0);
                assert!(pair[1].0 > 0);
            }
            // Positions are monotone from zero.
            for (i, row) in rows.iter().enumerate() {
                assert_eq!(row.2, i as i64);
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn cancelled_engine_fails_run_and_keeps_db() {
    let fx = setup();
    ingest_fixture(&fx, "f.txt", "text/plain", "body");
    let token = CancellationToken::new();
    token.cancel();
    let engine = Engine::new(
        &fx.data_dir.join("corpus.db"),
        fx.workflows.clone(),
        &fx.data_dir.join("runs"),
        Arc::new(raglite_extract::Registry::with_builtins()),
        VectorConfig::default(),
    )
    .with_cancellation(token);

    let err = engine
        .run("text_chunking_v1", RunConfig::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));

    // The run-db is left intact for inspection, status failed.
    let runs: Vec<_> = std::fs::read_dir(fx.data_dir.join("runs"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "db"))
        .collect();
    assert_eq!(runs.len(), 1);
    let run_db = open_run_db(&runs[0].path());
    run_db
        .with_conn(|conn| {
            let status: String = conn
                .query_row("SELECT status FROM _run_meta", [], |r| r.get(0))
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            assert_eq!(status, "failed");
            Ok(())
        })
        .unwrap();
}

#[test]
fn run_db_is_self_contained() {
    let fx = setup();
    ingest_fixture(&fx, "add.go", "text/x-go", GO_ADD);
    let handle = fx
        .engine
        .run("code_chunking_v1", RunConfig::default())
        .unwrap();
    let run_db = open_run_db(&handle.db_path);
    // The steps copy makes inspect work on the bare file.
    let steps: i64 = run_db.row_count("_workflow_steps").unwrap();
    assert_eq!(steps, 9);
    let log: i64 = run_db.row_count("_step_executions").unwrap();
    assert_eq!(log, 9);
}
