//! Per-operation semantics: project, join, aggregate grouping, diff,
//! fork and merge, driven through data-defined workflows.

use std::sync::Arc;

use raglite_core::config::VectorConfig;
use raglite_core::errors::StorageError;
use raglite_core::types::RunStatus;
use raglite_engine::{loader, Engine, RunConfig};
use raglite_storage::Database;
use rusqlite::params;

struct Fixture {
    _dir: tempfile::TempDir,
    corpus: Database,
    workflows: Arc<Database>,
    engine: Engine,
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
    }
}

fn seed_file(fx: &Fixture, id: &str, mime: &str, size: i64) {
    fx.corpus
        .with_conn(|conn| {
            conn.execute(
                "INSERT INTO raw_files (id, source_path, mime_type, size, external_path, checksum)
                 VALUES (?1, ?1, ?2, ?3, ?1, ?1)",
                params![id, mime, size],
            )
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
            Ok(())
        })
        .unwrap();
}

fn define(fx: &Fixture, id: &str, steps_sql: &str) {
    fx.workflows
        .with_conn(|conn| {
            conn.execute(
                "INSERT INTO workflows (id, version, name, status, input_schema)
                 VALUES (?1, 1, ?1, 'active', '{\"source\": \"corpus.raw_files\"}')",
                params![id],
            )
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
            conn.execute_batch(steps_sql)
                .map_err(|e| StorageError::sqlite(e.to_string()))?;
            Ok(())
        })
        .unwrap();
}

fn run_db(fx: &Fixture, workflow: &str) -> Database {
    let handle = fx.engine.run(workflow, RunConfig::default()).unwrap();
    assert_eq!(handle.run.status, RunStatus::Completed, "workflow {workflow}");
    Database::open(&handle.db_path, raglite_storage::DbKind::Run).unwrap()
}

#[test]
fn project_keeps_row_count_and_narrows_columns() {
    let fx = setup();
    seed_file(&fx, "a", "text/plain", 10);
    seed_file(&fx, "b", "text/plain", 20);
    define(
        &fx,
        "proj_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, expects_delta, on_empty)
         VALUES ('proj_v1', 1, 'narrow', 'project', '_input', 'id, size', 'narrow', 0, 'continue')",
    );
    let db = run_db(&fx, "proj_v1");
    assert_eq!(db.row_count("narrow").unwrap(), 2);
    db.with_conn(|conn| {
        let columns: i64 = conn
            .query_row("SELECT COUNT(*) FROM pragma_table_info('narrow')", [], |r| {
                r.get(0)
            })
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
        assert_eq!(columns, 2);
        Ok(())
    })
    .unwrap();
}

#[test]
fn join_combines_with_named_table() {
    let fx = setup();
    seed_file(&fx, "a", "text/plain", 10);
    // Two steps over the same corpus table, joined on id.
    define(
        &fx,
        "join_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, config, expects_delta, on_empty)
         VALUES
         ('join_v1', 1, 'left_side', 'project', '_input', 'id, mime_type', 'left_side', NULL, 0, 'continue'),
         ('join_v1', 2, 'right_side', 'project', 'corpus.raw_files', 'id AS rid, size', 'right_side', NULL, 0, 'continue'),
         ('join_v1', 3, 'joined', 'join', 'left_side',
          'JOIN right_side ON right_side.rid = left_side.id', 'joined',
          '{\"select\": \"left_side.id AS id, left_side.mime_type, right_side.size\"}', 0, 'continue')",
    );
    let db = run_db(&fx, "join_v1");
    db.with_conn(|conn| {
        let (id, size): (String, i64) = conn
            .query_row("SELECT id, size FROM joined", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
        assert_eq!(id, "a");
        assert_eq!(size, 10);
        Ok(())
    })
    .unwrap();
}

#[test]
fn aggregate_grouping_mode() {
    let fx = setup();
    seed_file(&fx, "a", "text/plain", 10);
    seed_file(&fx, "b", "text/plain", 30);
    seed_file(&fx, "c", "text/x-go", 5);
    define(
        &fx,
        "agg_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, config, expects_delta, on_empty)
         VALUES ('agg_v1', 1, 'by_mime', 'aggregate', '_input',
                 'mime_type, COUNT(*) AS n, SUM(size) AS total', 'by_mime',
                 '{\"group_by\": \"mime_type\"}', 0, 'continue')",
    );
    let db = run_db(&fx, "agg_v1");
    db.with_conn(|conn| {
        let (n, total): (i64, i64) = conn
            .query_row(
                "SELECT n, total FROM by_mime WHERE mime_type = 'text/plain'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
        assert_eq!(n, 2);
        assert_eq!(total, 40);
        Ok(())
    })
    .unwrap();
}

#[test]
fn aggregate_feature_columns_mode() {
    let fx = setup();
    seed_file(&fx, "a", "text/plain", 12);
    define(
        &fx,
        "feat_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, config, expects_delta, on_empty)
         VALUES ('feat_v1', 1, 'widen', 'aggregate', '_input', '', 'widened',
                 '{\"features\": [{\"name\": \"double_size\", \"expr\": \"size * 2\"}]}',
                 0, 'continue')",
    );
    let db = run_db(&fx, "feat_v1");
    db.with_conn(|conn| {
        let doubled: i64 = conn
            .query_row("SELECT double_size FROM widened", [], |r| r.get(0))
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
        assert_eq!(doubled, 24);
        Ok(())
    })
    .unwrap();
}

#[test]
fn diff_records_losses_gains_and_jaccard() {
    let fx = setup();
    for (id, size) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
        seed_file(&fx, id, "text/plain", size);
    }
    define(
        &fx,
        "diff_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, expects_delta, on_empty)
         VALUES
         ('diff_v1', 1, 'everything', 'filter', '_input', '', 'everything', 0, 'continue'),
         ('diff_v1', 2, 'big_only', 'filter', 'everything', 'size >= 3', 'big_only', 0, 'continue'),
         ('diff_v1', 3, 'what_changed', 'diff', 'big_only', 'everything', 'what_changed', 0, 'continue')",
    );
    let db = run_db(&fx, "diff_v1");
    db.with_conn(|conn| {
        let (lost, gained, jaccard): (i64, i64, f64) = conn
            .query_row(
                "SELECT rows_lost, rows_gained, jaccard_index FROM what_changed",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
        assert_eq!(lost, 2);
        assert_eq!(gained, 0);
        assert!((jaccard - 0.5).abs() < 1e-9);
        // The diff also lands in the run-db delta log.
        let deltas: i64 = conn
            .query_row("SELECT COUNT(*) FROM _deltas", [], |r| r.get(0))
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
        assert_eq!(deltas, 1);
        Ok(())
    })
    .unwrap();
}

#[test]
fn fork_then_merge_roundtrips_rows() {
    let fx = setup();
    for (id, size) in [("a", 1), ("b", 2), ("c", 30)] {
        seed_file(&fx, id, "text/plain", size);
    }
    define(
        &fx,
        "forked_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, config, expects_delta, on_empty)
         VALUES
         ('forked_v1', 1, 'everything', 'filter', '_input', '', 'everything', NULL, 0, 'continue'),
         ('forked_v1', 2, 'split', 'fork', 'everything', '', 'branches',
          '{\"branches\": [{\"label\": \"small\", \"predicate\": \"size < 10\"},
                           {\"label\": \"large\", \"predicate\": \"size >= 10\"}]}', 0, 'continue'),
         ('forked_v1', 3, 'reunite', 'merge', 'branches_small', '', 'reunited',
          '{\"sources\": [\"branches_small\", \"branches_large\"]}', 0, 'continue')",
    );
    let db = run_db(&fx, "forked_v1");
    assert_eq!(db.row_count("branches_small").unwrap(), 2);
    assert_eq!(db.row_count("branches_large").unwrap(), 1);
    assert_eq!(db.row_count("reunited").unwrap(), 3);
    db.with_conn(|conn| {
        let labels: i64 = conn
            .query_row("SELECT COUNT(*) FROM branches", [], |r| r.get(0))
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
        assert_eq!(labels, 2);
        Ok(())
    })
    .unwrap();
}

#[test]
fn expects_delta_logs_reduction() {
    let fx = setup();
    for (id, size) in [("a", 1), ("b", 20)] {
        seed_file(&fx, id, "text/plain", size);
    }
    define(
        &fx,
        "delta_v1",
        "INSERT INTO workflow_steps
         (workflow_id, step_order, step_name, operation, source, predicate, output, expects_delta, on_empty)
         VALUES
         ('delta_v1', 1, 'everything', 'filter', '_input', '', 'everything', 0, 'continue'),
         ('delta_v1', 2, 'big', 'filter', 'everything', 'size >= 10', 'big', 1, 'continue')",
    );
    let db = run_db(&fx, "delta_v1");
    db.with_conn(|conn| {
        let (delta_type, before, after): (String, i64, i64) = conn
            .query_row(
                "SELECT delta_type, rows_before, rows_after FROM _deltas",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
        assert_eq!(delta_type, "reduction");
        assert_eq!(before, 2);
        assert_eq!(after, 1);
        Ok(())
    })
    .unwrap();
}
