//! Calendar mirror ledger: the durable record of what has been mirrored.

use launchsync_types::CalendarMirror;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LedgerError;
use crate::time::{format_ts, parse_ts};

type MirrorRow = (i64, String, String, String);

fn map_row(row: &Row<'_>) -> rusqlite::Result<MirrorRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_mirror((destination_id, event_id, entry_id, created_at): MirrorRow) -> Result<CalendarMirror, LedgerError> {
    Ok(CalendarMirror {
        destination_id,
        event_id,
        entry_id,
        created_at: parse_ts(&created_at)?,
    })
}

fn collect(
    conn: &Connection,
    sql: &str,
    param: impl rusqlite::ToSql,
) -> Result<Vec<CalendarMirror>, LedgerError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([param], map_row)?;
    let mut mirrors = Vec::new();
    for row in rows {
        mirrors.push(into_mirror(row?)?);
    }
    Ok(mirrors)
}

/// Records a mirror. An existing record for the same pair is replaced, so
/// there is never more than one mirror per (destination, event).
///
/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn record_mirror(conn: &Connection, mirror: &CalendarMirror) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO calendar_mirrors (destination_id, event_id, entry_id, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(destination_id, event_id) DO UPDATE SET
            entry_id = excluded.entry_id,
            created_at = excluded.created_at",
        params![
            mirror.destination_id,
            mirror.event_id,
            mirror.entry_id,
            format_ts(mirror.created_at),
        ],
    )?;
    Ok(())
}

/// Removes one mirror record. Returns whether a row was deleted.
///
/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn remove_mirror(
    conn: &Connection,
    destination_id: i64,
    event_id: &str,
) -> Result<bool, LedgerError> {
    let deleted = conn.execute(
        "DELETE FROM calendar_mirrors WHERE destination_id = ?1 AND event_id = ?2",
        params![destination_id, event_id],
    )?;
    Ok(deleted > 0)
}

/// Drops every mirror record of a destination. Returns the number removed.
///
/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn remove_mirrors_for_destination(
    conn: &Connection,
    destination_id: i64,
) -> Result<usize, LedgerError> {
    let deleted = conn.execute(
        "DELETE FROM calendar_mirrors WHERE destination_id = ?1",
        [destination_id],
    )?;
    Ok(deleted)
}

/// # Errors
///
/// Returns `LedgerError` on SQL failure or an undecodable row.
pub fn get_mirror(
    conn: &Connection,
    destination_id: i64,
    event_id: &str,
) -> Result<Option<CalendarMirror>, LedgerError> {
    conn.query_row(
        "SELECT destination_id, event_id, entry_id, created_at
         FROM calendar_mirrors WHERE destination_id = ?1 AND event_id = ?2",
        params![destination_id, event_id],
        map_row,
    )
    .optional()?
    .map(into_mirror)
    .transpose()
}

/// Every mirror of one event, across destinations.
///
/// # Errors
///
/// Returns `LedgerError` on SQL failure or an undecodable row.
pub fn mirrors_for_event(conn: &Connection, event_id: &str) -> Result<Vec<CalendarMirror>, LedgerError> {
    collect(
        conn,
        "SELECT destination_id, event_id, entry_id, created_at
         FROM calendar_mirrors WHERE event_id = ?1 ORDER BY destination_id ASC",
        event_id,
    )
}

/// Every mirror held by one destination.
///
/// # Errors
///
/// Returns `LedgerError` on SQL failure or an undecodable row.
pub fn mirrors_for_destination(
    conn: &Connection,
    destination_id: i64,
) -> Result<Vec<CalendarMirror>, LedgerError> {
    collect(
        conn,
        "SELECT destination_id, event_id, entry_id, created_at
         FROM calendar_mirrors WHERE destination_id = ?1 ORDER BY event_id ASC",
        destination_id,
    )
}

/// Every mirror in the ledger.
///
/// # Errors
///
/// Returns `LedgerError` on SQL failure or an undecodable row.
pub fn list_mirrors(conn: &Connection) -> Result<Vec<CalendarMirror>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT destination_id, event_id, entry_id, created_at
         FROM calendar_mirrors ORDER BY destination_id ASC, event_id ASC",
    )?;
    let rows = stmt.query_map([], map_row)?;
    let mut mirrors = Vec::new();
    for row in rows {
        mirrors.push(into_mirror(row?)?);
    }
    Ok(mirrors)
}
