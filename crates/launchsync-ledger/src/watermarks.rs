//! Notification watermark ledger.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::LedgerError;
use crate::time::{format_ts, parse_ts};

/// Reads a destination's countdown watermark, if one was ever written.
///
/// # Errors
///
/// Returns `LedgerError` on SQL failure or an unparsable timestamp.
pub fn get_watermark(
    conn: &Connection,
    destination_id: i64,
) -> Result<Option<DateTime<Utc>>, LedgerError> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT watermark FROM notification_watermarks WHERE destination_id = ?1",
            [destination_id],
            |row| row.get(0),
        )
        .optional()?;
    stored.as_deref().map(parse_ts).transpose()
}

/// Moves the watermark forward to `at` and returns the stored value.
///
/// The write keeps the later of the stored and the new instant, so the
/// cursor never moves backward even if callers race or clocks step back.
///
/// # Errors
///
/// Returns `LedgerError` on SQL failure or an unparsable timestamp.
pub fn advance_watermark(
    conn: &Connection,
    destination_id: i64,
    at: DateTime<Utc>,
) -> Result<DateTime<Utc>, LedgerError> {
    let stored: String = conn.query_row(
        "INSERT INTO notification_watermarks (destination_id, watermark)
         VALUES (?1, ?2)
         ON CONFLICT(destination_id) DO UPDATE SET
            watermark = MAX(watermark, excluded.watermark)
         RETURNING watermark",
        params![destination_id, format_ts(at)],
        |row| row.get(0),
    )?;
    parse_ts(&stored)
}
