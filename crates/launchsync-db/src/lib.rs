//! Database layer for launchsync.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and embedded SQL migrations. Every table holding the event cache, the
//! destination registry and the mirror, watermark and sent ledgers is created
//! through versioned migrations managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: the reconciliation loop is the single writer
//!   and the operator API reads concurrently, which WAL handles without an
//!   external database process.
//! - **`r2d2` connection pool**: bounded connection reuse across the blocking
//!   thread pool. [`open_database`] opens the pool and migrates in one step.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!` so the schema ships with the code that queries it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{open_database, open_pool, DbPool, PoolError, PoolSettings};
