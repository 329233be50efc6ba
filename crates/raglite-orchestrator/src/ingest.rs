//! File ingest: streaming hash, MIME detection, content-addressed copy.
//!
//! The raw_files row never embeds bytes; they live in the blob store at
//! `{dataDir}/storage/raw/{hash[..2]}/{hash}`. Ingest is idempotent by
//! content hash, and a failed insert removes the just-copied blob.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use raglite_core::errors::IngestError;
use raglite_core::hash::sha256_file;
use raglite_core::types::{FileStatus, RawFile};
use raglite_storage::queries::{audit, raw_files};
use raglite_storage::Database;

use crate::mime;

pub struct Ingestor<'a> {
    corpus: &'a Database,
    storage_dir: PathBuf,
}

impl<'a> Ingestor<'a> {
    pub fn new(corpus: &'a Database, data_dir: &Path) -> Self {
        Self {
            corpus,
            storage_dir: data_dir.join("storage").join("raw"),
        }
    }

    /// Ingest one file; returns its content-addressed id. Re-ingesting the
    /// same content returns the existing id without rewriting a byte.
    pub fn ingest_file(&self, path: &Path) -> Result<String, IngestError> {
        let metadata = std::fs::metadata(path).map_err(|e| IngestError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let id = sha256_file(path).map_err(|e| IngestError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if self.corpus.with_conn(|conn| raw_files::exists(conn, &id))? {
            debug!(id = %id, "already ingested");
            return Ok(id);
        }

        let mut header = [0u8; 512];
        let read = File::open(path)
            .and_then(|mut f| f.read(&mut header))
            .map_err(|e| IngestError::Unreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let mime_type = mime::detect(path, &header[..read]);

        let shard = self.storage_dir.join(&id[..2]);
        std::fs::create_dir_all(&shard)?;
        let external_path = shard.join(&id);
        std::fs::copy(path, &external_path).map_err(|e| IngestError::CopyFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let file = RawFile {
            id: id.clone(),
            source_path: path.to_string_lossy().into_owned(),
            mime_type: mime_type.clone(),
            size: metadata.len() as i64,
            external_path: external_path.to_string_lossy().into_owned(),
            checksum: id.clone(),
            status: FileStatus::Pending,
            ingested_at: Utc::now(),
        };

        let inserted = self.corpus.with_conn(|conn| raw_files::insert(conn, &file));
        if let Err(e) = inserted {
            // Roll the copied blob back before surfacing the failure,
            // unless a concurrent ingest of the same content won the race.
            let raced = self
                .corpus
                .with_conn(|conn| raw_files::exists(conn, &id))
                .unwrap_or(false);
            if raced {
                return Ok(id);
            }
            if let Err(rm) = std::fs::remove_file(&external_path) {
                warn!(path = %external_path.display(), error = %rm, "blob rollback failed");
            }
            return Err(IngestError::Storage(e));
        }

        let _ = self.corpus.with_conn(|conn| {
            audit::log(
                conn,
                "orchestrator",
                "ingest",
                &id,
                &format!(
                    r#"{{"path":{:?},"mime":{:?},"size":{}}}"#,
                    file.source_path, mime_type, file.size
                ),
            )
        });
        debug!(id = %id, mime = %mime_type, "ingested");
        Ok(id)
    }

    /// Recursively ingest a directory, skipping hidden entries and common
    /// dependency directories. Unreadable files are skipped with a warning.
    pub fn ingest_dir(&self, root: &Path) -> Result<Vec<String>, IngestError> {
        let mut ids = Vec::new();
        self.walk(root, &mut ids)?;
        Ok(ids)
    }

    fn walk(&self, dir: &Path, ids: &mut Vec<String>) -> Result<(), IngestError> {
        let entries = std::fs::read_dir(dir).map_err(|e| IngestError::Unreadable {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                if matches!(name.as_str(), "vendor" | "node_modules" | "target" | "testdata") {
                    continue;
                }
                self.walk(&path, ids)?;
            } else {
                match self.ingest_file(&path) {
                    Ok(id) => ids.push(id),
                    Err(e) => warn!(path = %path.display(), error = %e, "ingest skipped"),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let corpus = Database::open_corpus(dir.path()).unwrap();
        (dir, corpus)
    }

    #[test]
    fn ingest_hello_has_known_id() {
        let (dir, corpus) = setup();
        let src = dir.path().join("hello.txt");
        std::fs::write(&src, b"hello").unwrap();

        let ingestor = Ingestor::new(&corpus, dir.path());
        let id = ingestor.ingest_file(&src).unwrap();
        assert_eq!(
            id,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let file = corpus
            .with_conn(|conn| raw_files::get(conn, &id))
            .unwrap()
            .unwrap();
        assert_eq!(file.status, FileStatus::Pending);
        assert_eq!(file.size, 5);
        // Blob store holds byte-equal content.
        let stored = std::fs::read(&file.external_path).unwrap();
        assert_eq!(stored, b"hello");
        assert!(file.external_path.contains("/2c/"));
    }

    #[test]
    fn ingest_is_idempotent() {
        let (dir, corpus) = setup();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"same content").unwrap();
        let ingestor = Ingestor::new(&corpus, dir.path());

        let first = ingestor.ingest_file(&src).unwrap();
        let second = ingestor.ingest_file(&src).unwrap();
        assert_eq!(first, second);

        let count: i64 = corpus.row_count("raw_files").unwrap();
        assert_eq!(count, 1);

        // Exactly one blob file exists.
        let shard = dir.path().join("storage").join("raw").join(&first[..2]);
        assert_eq!(std::fs::read_dir(shard).unwrap().count(), 1);
    }

    #[test]
    fn same_content_different_name_is_one_row() {
        let (dir, corpus) = setup();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"twin").unwrap();
        std::fs::write(&b, b"twin").unwrap();
        let ingestor = Ingestor::new(&corpus, dir.path());
        assert_eq!(
            ingestor.ingest_file(&a).unwrap(),
            ingestor.ingest_file(&b).unwrap()
        );
        assert_eq!(corpus.row_count("raw_files").unwrap(), 1);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let (dir, corpus) = setup();
        let ingestor = Ingestor::new(&corpus, dir.path());
        let err = ingestor.ingest_file(&dir.path().join("ghost")).unwrap_err();
        assert!(matches!(err, IngestError::Unreadable { .. }));
    }

    #[test]
    fn ingest_dir_skips_hidden_and_vendor() {
        let (dir, corpus) = setup();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("vendor")).unwrap();
        std::fs::create_dir_all(tree.join("src")).unwrap();
        std::fs::write(tree.join("src/main.go"), b"func main() {}\n").unwrap();
        std::fs::write(tree.join("vendor/dep.go"), b"package dep\n").unwrap();
        std::fs::write(tree.join(".hidden"), b"secret").unwrap();

        let ingestor = Ingestor::new(&corpus, dir.path());
        let ids = ingestor.ingest_dir(&tree).unwrap();
        assert_eq!(ids.len(), 1);
    }
}
