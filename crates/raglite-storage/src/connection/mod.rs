//! Connection management: one serialized writer per database file,
//! alias-tracked ATTACH/DETACH, transactions with rollback surfacing.

pub mod pool;
pub mod pragmas;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::warn;

use raglite_core::errors::StorageError;

use crate::schema;
use crate::sql_err;
use self::pragmas::apply_pragmas;

/// Which of the three database kinds a handle points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Corpus,
    Workflows,
    Run,
}

/// A single SQLite database file with its serialized write connection.
///
/// Writers are bounded to one per file (the Mutex); WAL keeps readers from
/// blocking behind it. Attached aliases are tracked so a leaked alias is a
/// hard error instead of a silent cross-db write path.
pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
    kind: DbKind,
    aliases: Mutex<HashMap<String, PathBuf>>,
}

impl Database {
    /// Open or create a database of the given kind, apply pragmas and run
    /// the idempotent schema bootstrap.
    pub fn open(path: &Path, kind: DbKind) -> Result<Self, StorageError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path).map_err(sql_err)?;
        apply_pragmas(&conn)?;
        schema::bootstrap(&conn, kind)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            kind,
            aliases: Mutex::new(HashMap::new()),
        })
    }

    /// Open the corpus database under a data directory.
    pub fn open_corpus(data_dir: &Path) -> Result<Self, StorageError> {
        Self::open(&data_dir.join("corpus.db"), DbKind::Corpus)
    }

    /// Open the workflow-definitions database under a data directory.
    pub fn open_workflows(data_dir: &Path) -> Result<Self, StorageError> {
        Self::open(&data_dir.join("workflows.db"), DbKind::Workflows)
    }

    /// Create a fresh run database. Cleans up the file if bootstrap fails.
    pub fn create_run(runs_dir: &Path, run_id: &str) -> Result<Self, StorageError> {
        let path = runs_dir.join(format!("{run_id}.db"));
        match Self::open(&path, DbKind::Run) {
            Ok(db) => Ok(db),
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                Err(e)
            }
        }
    }

    /// Execute a closure with the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| StorageError::sqlite("connection lock poisoned"))?;
        f(&guard)
    }

    /// Attach another database file under an alias. Attaching a held alias
    /// fails; pair every attach with a detach (or use `attach_guard`).
    pub fn attach(&self, path: &Path, alias: &str) -> Result<(), StorageError> {
        let mut aliases = self
            .aliases
            .lock()
            .map_err(|_| StorageError::sqlite("alias lock poisoned"))?;
        if aliases.contains_key(alias) {
            return Err(StorageError::AliasInUse {
                alias: alias.to_string(),
            });
        }
        if !crate::ident::is_valid_table_name(alias) || alias.contains('.') {
            return Err(StorageError::sqlite(format!("invalid alias {alias:?}")));
        }
        self.with_conn(|conn| {
            conn.execute(
                &format!("ATTACH DATABASE ?1 AS {alias}"),
                [path.to_string_lossy()],
            )
            .map_err(sql_err)?;
            Ok(())
        })?;
        aliases.insert(alias.to_string(), path.to_path_buf());
        Ok(())
    }

    /// Detach a previously attached alias.
    pub fn detach(&self, alias: &str) -> Result<(), StorageError> {
        let mut aliases = self
            .aliases
            .lock()
            .map_err(|_| StorageError::sqlite("alias lock poisoned"))?;
        if !aliases.contains_key(alias) {
            return Err(StorageError::AliasUnknown {
                alias: alias.to_string(),
            });
        }
        self.with_conn(|conn| {
            conn.execute_batch(&format!("DETACH DATABASE {alias}"))
                .map_err(sql_err)
        })?;
        aliases.remove(alias);
        Ok(())
    }

    /// Attach with a guard that detaches on drop. A detach failure at drop
    /// is logged, never raised — shutdown must not hang on it.
    pub fn attach_guard<'a>(
        &'a self,
        path: &Path,
        alias: &str,
    ) -> Result<AttachGuard<'a>, StorageError> {
        self.attach(path, alias)?;
        Ok(AttachGuard {
            db: self,
            alias: alias.to_string(),
        })
    }

    /// Currently attached aliases.
    pub fn attached(&self) -> Vec<String> {
        self.aliases
            .lock()
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Execute a closure inside a BEGIN IMMEDIATE transaction. Commits on
    /// Ok, rolls back on Err; a rollback failure is surfaced together with
    /// the primary error.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        self.with_conn(|conn| {
            conn.execute_batch("BEGIN IMMEDIATE").map_err(sql_err)?;
            match f(conn) {
                Ok(value) => {
                    conn.execute_batch("COMMIT").map_err(sql_err)?;
                    Ok(value)
                }
                Err(e) => match conn.execute_batch("ROLLBACK") {
                    Ok(()) => Err(e),
                    Err(rb) => Err(StorageError::Rollback {
                        message: e.to_string(),
                        rollback: rb.to_string(),
                    }),
                },
            }
        })
    }

    /// Check whether a table exists (main database only).
    pub fn table_exists(&self, name: &str) -> Result<bool, StorageError> {
        self.with_conn(|conn| table_exists(conn, name))
    }

    /// Count rows of a table. The name must be a valid identifier.
    pub fn row_count(&self, name: &str) -> Result<i64, StorageError> {
        self.with_conn(|conn| row_count(conn, name))
    }

    /// Force a WAL checkpoint (TRUNCATE mode).
    pub fn checkpoint(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")
                .map_err(sql_err)
        })
    }

    /// VACUUM the database.
    pub fn vacuum(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| conn.execute_batch("VACUUM").map_err(sql_err))
    }

    /// File-level and page-level statistics.
    pub fn stats(&self) -> Result<DbStats, StorageError> {
        let size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        let wal_size = std::fs::metadata(self.path.with_extension("db-wal"))
            .map(|m| m.len())
            .unwrap_or(0);
        self.with_conn(|conn| {
            let tables: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                    [],
                    |row| row.get(0),
                )
                .map_err(sql_err)?;
            let page_size: i64 = conn
                .pragma_query_value(None, "page_size", |row| row.get(0))
                .map_err(sql_err)?;
            let page_count: i64 = conn
                .pragma_query_value(None, "page_count", |row| row.get(0))
                .map_err(sql_err)?;
            let free_pages: i64 = conn
                .pragma_query_value(None, "freelist_count", |row| row.get(0))
                .map_err(sql_err)?;
            Ok(DbStats {
                path: self.path.clone(),
                size_bytes,
                wal_size,
                tables,
                page_size,
                page_count,
                free_pages,
            })
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }
}

/// Table existence check against `sqlite_master`, alias-aware.
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, StorageError> {
    let (master, bare) = match name.split_once('.') {
        Some((alias, bare)) => (format!("{alias}.sqlite_master"), bare),
        None => ("sqlite_master".to_string(), name),
    };
    crate::ident::require_table_name(name)
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    let count: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {master} WHERE type = 'table' AND name = ?1"),
            [bare],
            |row| row.get(0),
        )
        .map_err(sql_err)?;
    Ok(count > 0)
}

/// Row count of a table whose name came from a workflow definition.
pub fn row_count(conn: &Connection, name: &str) -> Result<i64, StorageError> {
    crate::ident::require_table_name(name)
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    conn.query_row(&format!("SELECT COUNT(*) FROM {name}"), [], |row| row.get(0))
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(_, Some(ref msg)) if msg.contains("no such table") => {
                StorageError::NoSuchTable {
                    name: name.to_string(),
                }
            }
            other => sql_err(other),
        })
}

/// Detaches its alias when dropped.
pub struct AttachGuard<'a> {
    db: &'a Database,
    alias: String,
}

impl AttachGuard<'_> {
    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.db.detach(&self.alias) {
            warn!(alias = %self.alias, error = %e, "detach failed on guard drop");
        }
    }
}

/// Database statistics for status output.
#[derive(Debug, Clone)]
pub struct DbStats {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub wal_size: u64,
    pub tables: i64,
    pub page_size: i64,
    pub page_count: i64,
    pub free_pages: i64,
}
