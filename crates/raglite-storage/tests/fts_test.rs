//! FTS sync triggers: insert/update/delete on chunks reflect in chunks_fts.

use raglite_core::errors::StorageError;
use raglite_storage::Database;
use rusqlite::params;

fn seed(db: &Database) {
    db.with_conn(|conn| {
        conn.execute_batch(
            "INSERT INTO raw_files (id, source_path, mime_type, size, external_path, checksum)
             VALUES ('f1', '/src/a.go', 'text/x-go', 10, '/blob/f1', 'f1')",
        )
        .map_err(|e| StorageError::sqlite(e.to_string()))
    })
    .unwrap();
}

fn insert_chunk(db: &Database, id: &str, content: &str) {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO chunks (id, file_id, content, token_count, chunk_type, position)
             VALUES (?1, 'f1', ?2, 3, 'semantic', 0)",
            params![id, content],
        )
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
        Ok(())
    })
    .unwrap();
}

fn fts_matches(db: &Database, query: &str) -> i64 {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM chunks_fts WHERE chunks_fts MATCH ?1",
            params![query],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::sqlite(e.to_string()))
    })
    .unwrap()
}

#[test]
fn insert_is_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_corpus(dir.path()).unwrap();
    seed(&db);
    insert_chunk(&db, "c1", "func add returns the sum of two integers");
    assert_eq!(fts_matches(&db, "integers"), 1);
    assert_eq!(fts_matches(&db, "subtract"), 0);
}

#[test]
fn delete_drops_from_index() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_corpus(dir.path()).unwrap();
    seed(&db);
    insert_chunk(&db, "c1", "parse tokens from the stream");
    db.with_conn(|conn| {
        conn.execute("DELETE FROM chunks WHERE id = 'c1'", [])
            .map_err(|e| StorageError::sqlite(e.to_string()))?;
        Ok(())
    })
    .unwrap();
    assert_eq!(fts_matches(&db, "tokens"), 0);
}

#[test]
fn update_reindexes() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_corpus(dir.path()).unwrap();
    seed(&db);
    insert_chunk(&db, "c1", "original words here");
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE chunks SET content = 'replacement vocabulary now' WHERE id = 'c1'",
            [],
        )
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
        Ok(())
    })
    .unwrap();
    assert_eq!(fts_matches(&db, "original"), 0);
    assert_eq!(fts_matches(&db, "vocabulary"), 1);
}
