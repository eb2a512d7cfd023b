//! Error types for the ledger layer.

/// Errors that can occur during ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A database operation failed.
    #[error("ledger database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored timestamp could not be parsed.
    #[error("invalid stored timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },

    /// A stored row violates the data model.
    #[error("inconsistent stored row: {0}")]
    Inconsistent(String),
}
