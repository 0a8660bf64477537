//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.
//!
//! Several `Database` handles may point at the same file. Every compound
//! write goes through [`Database::immediate`], which takes SQLite's write
//! lock up front so two writers touching the same slot or chat pair are
//! serialized by the store itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use tutorlink_shared::constants::DEFAULT_BUSY_TIMEOUT_MS;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/tutorlink/tutorlink.db`
    /// - macOS:   `~/Library/Application Support/com.tutorlink.tutorlink/tutorlink.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\tutorlink\tutorlink\data\tutorlink.db`
    pub fn new() -> Result<Self> {
        Self::open_at(&default_path()?)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Used by tests and tooling.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// How long a statement waits for another connection's write lock.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The transaction commits when `f` returns `Ok`. On `Err`, or if the
    /// caller unwinds, it is dropped and rolled back, leaving prior state
    /// untouched.
    pub fn immediate<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Platform data path of the default database file.
pub fn default_path() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("com", "tutorlink", "tutorlink").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().join("tutorlink.db"))
}
