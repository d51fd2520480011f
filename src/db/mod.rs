//! SQLite persistence layer.
//!
//! One `rusqlite` connection per `Database` handle, shared behind an
//! `Arc<Mutex<..>>` so repos and workers can clone the handle freely.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod candidate_repo;
pub mod document_repo;
pub mod error;
pub mod mapping_repo;
pub mod migrations;
pub mod order_repo;
pub mod run_repo;
pub mod stats_repo;

pub use error::DbError;

/// Shared handle to the application database.
///
/// Clones are cheap and point at the same connection. SQLite serializes
/// writes anyway, so a single mutex-guarded connection is enough; WAL
/// mode keeps readers from blocking on it.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the database file, creating it and any parent directories
    /// as needed, and brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DbError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        log::info!("Opened database at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database with the full schema applied, for tests.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection lock held.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let conn = self.conn.lock().map_err(|_| DbError::LockPoisoned)?;
        f(&conn)
    }
}

/// Default location of the database: `~/.orderflow/data/orderflow.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".orderflow").join("data").join("orderflow.db"))
}

/// Current UTC timestamp in the string form used across all tables.
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
