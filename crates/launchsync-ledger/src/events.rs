//! Event cache store.
//!
//! Holds the last-known attributes of every tracked event. Only the
//! reconciliation loop writes here.

use launchsync_types::{Event, EventStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LedgerError;
use crate::time::{format_ts, parse_ts};

const EVENT_COLUMNS: &str = "id, provider_id, name, status, description, url, image_url,
     start_at, end_at, slug, live, has_secondary_resource";

/// Raw column values; timestamps and status are decoded outside the row
/// callback so their errors surface as [`LedgerError`].
struct EventRow {
    id: String,
    provider_id: Option<i64>,
    name: String,
    status: Option<u8>,
    description: Option<String>,
    url: Option<String>,
    image_url: Option<String>,
    start_at: String,
    end_at: String,
    slug: String,
    live: bool,
    has_secondary_resource: bool,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            provider_id: row.get(1)?,
            name: row.get(2)?,
            status: row.get(3)?,
            description: row.get(4)?,
            url: row.get(5)?,
            image_url: row.get(6)?,
            start_at: row.get(7)?,
            end_at: row.get(8)?,
            slug: row.get(9)?,
            live: row.get(10)?,
            has_secondary_resource: row.get(11)?,
        })
    }

    fn into_event(self) -> Result<Event, LedgerError> {
        let status = match self.status {
            Some(code) => Some(EventStatus::from_u8(code).ok_or_else(|| {
                LedgerError::Inconsistent(format!(
                    "event {} has unknown status code {code}",
                    self.id
                ))
            })?),
            None => None,
        };
        Ok(Event {
            start: parse_ts(&self.start_at)?,
            end: parse_ts(&self.end_at)?,
            id: self.id,
            provider_id: self.provider_id,
            name: self.name,
            status,
            description: self.description,
            url: self.url,
            image_url: self.image_url,
            slug: self.slug,
            live: self.live,
            has_secondary_resource: self.has_secondary_resource,
        })
    }
}

/// Lists every cached event ordered by `(start, id)`.
///
/// # Errors
///
/// Returns `LedgerError` on SQL failure or if a stored row cannot be decoded.
pub fn list_events(conn: &Connection) -> Result<Vec<Event>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM events ORDER BY start_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map([], EventRow::from_row)?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?.into_event()?);
    }
    Ok(events)
}

/// Fetches one cached event.
///
/// # Errors
///
/// Returns `LedgerError` on SQL failure or if the row cannot be decoded.
pub fn get_event(conn: &Connection, id: &str) -> Result<Option<Event>, LedgerError> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
        [id],
        EventRow::from_row,
    )
    .optional()?
    .map(EventRow::into_event)
    .transpose()
}

/// Inserts or fully replaces the cached attributes of an event.
///
/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure, including a violated
/// `start <= end` check.
pub fn upsert_event(conn: &Connection, event: &Event) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO events (
            id, provider_id, name, status, description, url, image_url,
            start_at, end_at, slug, live, has_secondary_resource, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, datetime('now'))
        ON CONFLICT(id) DO UPDATE SET
            provider_id = excluded.provider_id,
            name = excluded.name,
            status = excluded.status,
            description = excluded.description,
            url = excluded.url,
            image_url = excluded.image_url,
            start_at = excluded.start_at,
            end_at = excluded.end_at,
            slug = excluded.slug,
            live = excluded.live,
            has_secondary_resource = excluded.has_secondary_resource,
            updated_at = excluded.updated_at",
        params![
            event.id,
            event.provider_id,
            event.name,
            event.status.map(EventStatus::as_u8),
            event.description,
            event.url,
            event.image_url,
            format_ts(event.start),
            format_ts(event.end),
            event.slug,
            event.live,
            event.has_secondary_resource,
        ],
    )?;
    Ok(())
}

/// Removes an event from the cache. Returns whether a row was deleted.
///
/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn remove_event(conn: &Connection, id: &str) -> Result<bool, LedgerError> {
    let deleted = conn.execute("DELETE FROM events WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}
