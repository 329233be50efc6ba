//! Tests for open/attach/detach, transactions and inspection helpers.

use raglite_core::errors::StorageError;
use raglite_storage::{Database, DbKind};

fn temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

#[test]
fn open_corpus_bootstraps_schema() {
    let dir = temp_dir();
    let db = Database::open_corpus(dir.path()).unwrap();
    assert!(db.table_exists("raw_files").unwrap());
    assert!(db.table_exists("chunks").unwrap());
    assert!(db.table_exists("chunk_vectors").unwrap());
    assert!(db.table_exists("run_history").unwrap());
    assert!(db.table_exists("chunks_fts").unwrap());
    assert!(!db.table_exists("nope").unwrap());
}

#[test]
fn bootstrap_is_idempotent() {
    let dir = temp_dir();
    drop(Database::open_corpus(dir.path()).unwrap());
    // Opening again executes the same DDL; IF NOT EXISTS makes it a no-op.
    let db = Database::open_corpus(dir.path()).unwrap();
    assert!(db.table_exists("chunks").unwrap());
}

#[test]
fn wal_mode_is_active() {
    let dir = temp_dir();
    let db = Database::open_corpus(dir.path()).unwrap();
    let wal = db
        .with_conn(|conn| raglite_storage::connection::pragmas::verify_wal_mode(conn))
        .unwrap();
    assert!(wal);
}

#[test]
fn attach_twice_same_alias_fails() {
    let dir = temp_dir();
    let corpus = Database::open_corpus(dir.path()).unwrap();
    let run = Database::create_run(dir.path(), "run-a").unwrap();
    drop(run);

    let run_path = dir.path().join("run-a.db");
    corpus.attach(&run_path, "run_src").unwrap();
    let err = corpus.attach(&run_path, "run_src").unwrap_err();
    assert!(matches!(err, StorageError::AliasInUse { .. }));
    corpus.detach("run_src").unwrap();
}

#[test]
fn detach_unknown_alias_fails() {
    let dir = temp_dir();
    let corpus = Database::open_corpus(dir.path()).unwrap();
    let err = corpus.detach("ghost").unwrap_err();
    assert!(matches!(err, StorageError::AliasUnknown { .. }));
}

#[test]
fn attach_guard_detaches_on_drop() {
    let dir = temp_dir();
    let corpus = Database::open_corpus(dir.path()).unwrap();
    drop(Database::create_run(dir.path(), "run-b").unwrap());
    let run_path = dir.path().join("run-b.db");

    {
        let _guard = corpus.attach_guard(&run_path, "run_src").unwrap();
        assert_eq!(corpus.attached(), vec!["run_src".to_string()]);
    }
    assert!(corpus.attached().is_empty());
    // Alias is free again.
    let _guard = corpus.attach_guard(&run_path, "run_src").unwrap();
}

#[test]
fn transaction_commits_on_ok() {
    let dir = temp_dir();
    let db = Database::open_corpus(dir.path()).unwrap();
    db.transaction(|conn| {
        conn.execute_batch(
            "INSERT INTO raw_files (id, source_path, mime_type, size, external_path, checksum)
             VALUES ('a', '/x', 'text/plain', 1, '/blob/a', 'a')",
        )
        .map_err(|e| StorageError::sqlite(e.to_string()))
    })
    .unwrap();
    assert_eq!(db.row_count("raw_files").unwrap(), 1);
}

#[test]
fn transaction_rolls_back_on_err() {
    let dir = temp_dir();
    let db = Database::open_corpus(dir.path()).unwrap();
    let result: Result<(), _> = db.transaction(|conn| {
        conn.execute_batch(
            "INSERT INTO raw_files (id, source_path, mime_type, size, external_path, checksum)
             VALUES ('b', '/x', 'text/plain', 1, '/blob/b', 'b')",
        )
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
        Err(StorageError::sqlite("boom"))
    });
    assert!(result.is_err());
    assert_eq!(db.row_count("raw_files").unwrap(), 0);
}

#[test]
fn row_count_missing_table() {
    let dir = temp_dir();
    let db = Database::open_corpus(dir.path()).unwrap();
    assert!(db.row_count("missing_table").is_err());
}

#[test]
fn run_db_cleaned_up_on_create_failure() {
    // Point create_run at a path that cannot hold a database.
    let dir = temp_dir();
    let file = dir.path().join("not_a_dir");
    std::fs::write(&file, b"x").unwrap();
    assert!(Database::create_run(&file, "r").is_err());
}

#[test]
fn stats_reports_tables() {
    let dir = temp_dir();
    let db = Database::open_corpus(dir.path()).unwrap();
    let stats = db.stats().unwrap();
    assert!(stats.tables > 5);
    assert!(stats.page_size > 0);
}

#[test]
fn run_db_kind() {
    let dir = temp_dir();
    let db = Database::create_run(dir.path(), "run-z").unwrap();
    assert_eq!(db.kind(), DbKind::Run);
    assert!(db.table_exists("_run_meta").unwrap());
    assert!(db.table_exists("_step_executions").unwrap());
    assert!(db.table_exists("_deltas").unwrap());
}
