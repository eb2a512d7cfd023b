//! Error types for the server crate.

use launchsync_ledger::LedgerError;
use launchsync_types::ExternalError;
use thiserror::Error;

/// Errors raised inside a reconciliation or countdown cycle.
///
/// None of these escape a cycle; they are logged at the smallest unit of
/// work and counted in the cycle report.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// No pooled connection could be checked out.
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A blocking database task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    External(#[from] ExternalError),
}

/// Errors that abort server startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Database(#[from] launchsync_db::PoolError),

    #[error("failed to bind or serve: {0}")]
    Io(#[from] std::io::Error),
}
