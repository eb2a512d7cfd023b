//! Sent registry: idempotency keys for delivered notifications.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::LedgerError;
use crate::time::format_ts;

/// Identifies one notification for one destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SentKey {
    pub event_id: String,
    pub destination_id: i64,
    /// e.g. `countdown:60` or `status:2>1:...`.
    pub notification_key: String,
}

impl SentKey {
    pub fn new(event_id: impl Into<String>, destination_id: i64, key: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            destination_id,
            notification_key: key.into(),
        }
    }

    pub fn countdown(event_id: impl Into<String>, destination_id: i64, minutes: u32) -> Self {
        Self::new(event_id, destination_id, format!("countdown:{minutes}"))
    }
}

/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn was_sent(conn: &Connection, key: &SentKey) -> Result<bool, LedgerError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sent_notifications
            WHERE event_id = ?1 AND destination_id = ?2 AND notification_key = ?3
         )",
        params![key.event_id, key.destination_id, key.notification_key],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Records a delivery. Returns `false` if the key was already present.
///
/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn mark_sent(conn: &Connection, key: &SentKey, at: DateTime<Utc>) -> Result<bool, LedgerError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO sent_notifications
            (event_id, destination_id, notification_key, sent_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            key.event_id,
            key.destination_id,
            key.notification_key,
            format_ts(at)
        ],
    )?;
    Ok(inserted > 0)
}

/// Deletes registry rows older than `cutoff`. Returns the number removed.
///
/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn prune_sent_before(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize, LedgerError> {
    let deleted = conn.execute(
        "DELETE FROM sent_notifications WHERE sent_at < ?1",
        [format_ts(cutoff)],
    )?;
    Ok(deleted)
}
