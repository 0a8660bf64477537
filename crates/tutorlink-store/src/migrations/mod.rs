//! Database migration runner.
//!
//! Migrations are executed in order on every [`Database::new`] / [`Database::open_at`]
//! call.  Each migration is guarded by a `user_version` pragma so it runs
//! exactly once, and the whole run holds the write lock so two processes
//! opening a fresh file cannot apply the same step twice.
//!
//! [`Database::new`]: crate::Database::new
//! [`Database::open_at`]: crate::Database::open_at

pub mod v001_initial;
pub mod v002_message_files;
pub mod v003_uniqueness;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::{Result, StoreError};

/// Current schema version.  Bump this and add a new migration module whenever
/// the schema changes.
pub const CURRENT_VERSION: u32 = 3;

type Step = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

const STEPS: [(u32, &str, Step); 3] = [
    (1, "v001_initial", v001_initial::up),
    (2, "v002_message_files", v002_message_files::up),
    (3, "v003_uniqueness", v003_uniqueness::up),
];

/// Run all pending migrations against the open connection.
///
/// The function reads `PRAGMA user_version` to determine which migrations have
/// already been applied, then executes any outstanding ones in order.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let current: u32 = tx.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    for (version, name, up) in STEPS {
        if current < version {
            tracing::info!(migration = name, "applying migration");
            up(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
            tx.pragma_update(None, "user_version", version)?;
        }
    }

    tx.commit()?;
    Ok(())
}
