//! SQLite backend for the image set store.
//!
//! All access goes through one connection behind a mutex. Schema changes
//! live in `sql/` and are applied whenever a handle is opened.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod error;
pub mod imageset_repo;
pub mod migrations;

pub use error::DatabaseError;
pub use imageset_repo::SqliteImageSetStore;

/// Shared handle to the image set database.
///
/// Clones share the connection. File databases use WAL journaling so a
/// reader (e.g. `sqlite3` during debugging) does not block a sync cycle.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the database file at `path`, creating it and its parent
    /// directory on first use, and brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        migrations::run_all(&conn)?;

        log::info!("Image set database ready at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fresh schema in memory; contents are lost when the last clone drops.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` while holding the connection lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// Returns the default database path: `~/.imageset-sync/data/imagesets.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".imageset-sync").join("data").join("imagesets.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_schema_is_current() {
        let db = Database::open_in_memory().unwrap();
        let (applied, indexes): (u32, u32) = db
            .with_conn(|conn| {
                let applied = conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
                let indexes = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master
                     WHERE type = 'index' AND tbl_name = 'cluster_image_sets'
                       AND name NOT LIKE 'sqlite_autoindex%'",
                    [],
                    |r| r.get(0),
                )?;
                Ok((applied, indexes))
            })
            .unwrap();
        assert_eq!(applied, 2);
        assert!(indexes >= 1);
    }

    #[test]
    fn test_clones_share_connection() {
        let db = Database::open_in_memory().unwrap();
        let other = db.clone();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cluster_image_sets
                    (name, uid, resource_version, api_version, kind, release_image, created_at)
                 VALUES ('a', 'u1', 1, 'v1', 'ClusterImageSet', 'r', '2026-01-01T00:00:00Z')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        let count: u32 = other
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM cluster_image_sets", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_open_file_db_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        let db = Database::open(&path).unwrap();
        db.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM cluster_image_sets", [], |r| r.get(0))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let db = Database::open(&path).unwrap();
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO cluster_image_sets
                        (name, uid, resource_version, api_version, kind, release_image, created_at)
                     VALUES ('a', 'u1', 1, 'v1', 'ClusterImageSet', 'r', '2026-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let count: u32 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM cluster_image_sets", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path().unwrap();
        assert!(path.ends_with("imagesets.db"));
        assert!(path.to_string_lossy().contains(".imageset-sync"));
    }
}
