//! Timestamp encoding shared by every table.
//!
//! Instants are stored as fixed-width RFC 3339 UTC strings with nanosecond
//! precision, so SQL string comparison and `MAX()` agree with chronological
//! order and a round trip through the database is lossless.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::LedgerError;

pub fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// # Errors
///
/// Returns `LedgerError::Timestamp` if `value` is not RFC 3339.
pub fn parse_ts(value: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| LedgerError::Timestamp {
            value: value.to_string(),
            source,
        })
}
