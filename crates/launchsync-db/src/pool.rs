//! Opening the launchsync database.
//!
//! Every pooled connection points at the same SQLite file and is prepared
//! the same way before first use: WAL journal, enforced foreign keys (the
//! mirror and watermark ledgers reference destinations) and a busy timeout
//! for the moments when a cycle and the operator API write together.

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{ffi, Connection};
use thiserror::Error;

use crate::migrations::{run_migrations, MigrationError};

/// Pool of connections to the launchsync database file.
pub type DbPool = Pool<SqliteConnectionManager>;

/// How each connection waits on locks and how many may be open at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub busy_timeout: Duration,
    /// Upper bound on open connections. Blocking ledger work beyond this
    /// waits for a checkout.
    pub max_connections: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            max_connections: 8,
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to open database pool: {0}")]
    Open(#[from] r2d2::Error),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

fn prepare_connection(conn: &mut Connection, settings: PoolSettings) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        return Err(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CANTOPEN),
            Some(format!("database refused WAL journal, stayed in {mode}")),
        ));
    }
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(settings.busy_timeout)
}

/// Opens a pool over the database file at `path`, creating the file if
/// needed. The schema is left untouched; see [`open_database`].
///
/// `:memory:` is not supported: each pooled connection would see its own
/// empty database.
pub fn open_pool(path: impl AsRef<Path>, settings: PoolSettings) -> Result<DbPool, PoolError> {
    let manager = SqliteConnectionManager::file(path)
        .with_init(move |conn| prepare_connection(conn, settings));
    let pool = Pool::builder()
        .max_size(settings.max_connections)
        .build(manager)?;
    Ok(pool)
}

/// Opens the pool and brings the schema up to date.
pub fn open_database(path: impl AsRef<Path>, settings: PoolSettings) -> Result<DbPool, PoolError> {
    let pool = open_pool(path, settings)?;
    let applied = run_migrations(&*pool.get()?)?;
    if applied > 0 {
        tracing::info!(count = applied, "applied database migrations");
    }
    Ok(pool)
}
