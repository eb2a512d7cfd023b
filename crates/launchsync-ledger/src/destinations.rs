//! Destination registry.
//!
//! The settings CRUD surface owns these rows. The reconciliation engine only
//! reads them, apart from the two self-healing write-backs
//! [`disable_quota`] and [`clear_endpoint`].

use std::collections::{BTreeSet, HashMap};

use launchsync_types::{
    CalendarSettings, Destination, FilterMode, NotificationSettings, ProviderFilter,
    StatusToggles,
};
use rusqlite::{params, Connection, Row};

use crate::error::LedgerError;

const DESTINATION_COLUMNS: &str = "id, calendar_quota, include_launches, include_events,
     hide_if_no_url, provider_filter_mode, notification_endpoint, notify_launches,
     notify_events, notify_t0_change, notify_go, notify_tbd, notify_tbc, notify_liftoff,
     notify_hold, notify_end_status, include_mirror_link";

fn map_row(row: &Row<'_>) -> rusqlite::Result<(Destination, String)> {
    let destination = Destination {
        id: row.get(0)?,
        calendar: CalendarSettings {
            quota: row.get(1)?,
            include_launches: row.get(2)?,
            include_events: row.get(3)?,
            hide_if_no_url: row.get(4)?,
        },
        provider_filter: ProviderFilter::default(),
        notifications: NotificationSettings {
            endpoint: row.get(6)?,
            launches: row.get(7)?,
            events: row.get(8)?,
            t0_change: row.get(9)?,
            status: StatusToggles {
                go: row.get(10)?,
                tbd: row.get(11)?,
                tbc: row.get(12)?,
                liftoff: row.get(13)?,
                hold: row.get(14)?,
                end_status: row.get(15)?,
            },
            include_mirror_link: row.get(16)?,
            countdown_minutes: Vec::new(),
        },
    };
    let mode: String = row.get(5)?;
    Ok((destination, mode))
}

fn filter_mode(destination_id: i64, mode: &str) -> Result<FilterMode, LedgerError> {
    FilterMode::parse(mode).ok_or_else(|| {
        LedgerError::Inconsistent(format!(
            "destination {destination_id} has unknown filter mode '{mode}'"
        ))
    })
}

/// Loads every destination with its provider filter and countdown leads.
///
/// Uses three bulk queries and assembles the records in memory.
///
/// # Errors
///
/// Returns `LedgerError` on SQL failure or an unknown filter mode.
pub fn list_destinations(conn: &Connection) -> Result<Vec<Destination>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DESTINATION_COLUMNS} FROM destinations ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map([], map_row)?;

    let mut destinations = Vec::new();
    for row in rows {
        let (mut destination, mode) = row?;
        destination.provider_filter.mode = filter_mode(destination.id, &mode)?;
        destinations.push(destination);
    }

    let mut providers: HashMap<i64, BTreeSet<i64>> = HashMap::new();
    let mut stmt = conn.prepare("SELECT destination_id, provider_id FROM destination_providers")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (destination_id, provider_id) = row?;
        providers.entry(destination_id).or_default().insert(provider_id);
    }

    let mut leads: HashMap<i64, Vec<u32>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT destination_id, minutes FROM countdown_leads ORDER BY destination_id, minutes",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, u32>(1)?)))?;
    for row in rows {
        let (destination_id, minutes) = row?;
        leads.entry(destination_id).or_default().push(minutes);
    }

    for destination in &mut destinations {
        if let Some(set) = providers.remove(&destination.id) {
            destination.provider_filter.providers = set;
        }
        if let Some(minutes) = leads.remove(&destination.id) {
            destination.notifications.countdown_minutes = minutes;
        }
    }

    Ok(destinations)
}

/// Loads one destination.
///
/// # Errors
///
/// Returns `LedgerError` on SQL failure or an unknown filter mode.
pub fn get_destination(conn: &Connection, id: i64) -> Result<Option<Destination>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DESTINATION_COLUMNS} FROM destinations WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map([id], map_row)?;
    let Some(row) = rows.next() else {
        return Ok(None);
    };
    let (mut destination, mode) = row?;
    destination.provider_filter.mode = filter_mode(id, &mode)?;

    let mut stmt = conn.prepare(
        "SELECT provider_id FROM destination_providers WHERE destination_id = ?1",
    )?;
    let rows = stmt.query_map([id], |row| row.get::<_, i64>(0))?;
    for row in rows {
        destination.provider_filter.providers.insert(row?);
    }

    let mut stmt = conn.prepare(
        "SELECT minutes FROM countdown_leads WHERE destination_id = ?1 ORDER BY minutes",
    )?;
    let rows = stmt.query_map([id], |row| row.get::<_, u32>(0))?;
    for row in rows {
        destination.notifications.countdown_minutes.push(row?);
    }

    Ok(Some(destination))
}

/// Inserts or replaces a destination, its provider filter and its countdown
/// leads in one transaction. Countdown leads are normalized first.
///
/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn upsert_destination(conn: &Connection, destination: &Destination) -> Result<(), LedgerError> {
    let mut notifications = destination.notifications.clone();
    notifications.normalize_countdowns();
    let calendar = &destination.calendar;
    let status = &notifications.status;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO destinations (
            id, calendar_quota, include_launches, include_events, hide_if_no_url,
            provider_filter_mode, notification_endpoint, notify_launches, notify_events,
            notify_t0_change, notify_go, notify_tbd, notify_tbc, notify_liftoff,
            notify_hold, notify_end_status, include_mirror_link
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        ON CONFLICT(id) DO UPDATE SET
            calendar_quota = excluded.calendar_quota,
            include_launches = excluded.include_launches,
            include_events = excluded.include_events,
            hide_if_no_url = excluded.hide_if_no_url,
            provider_filter_mode = excluded.provider_filter_mode,
            notification_endpoint = excluded.notification_endpoint,
            notify_launches = excluded.notify_launches,
            notify_events = excluded.notify_events,
            notify_t0_change = excluded.notify_t0_change,
            notify_go = excluded.notify_go,
            notify_tbd = excluded.notify_tbd,
            notify_tbc = excluded.notify_tbc,
            notify_liftoff = excluded.notify_liftoff,
            notify_hold = excluded.notify_hold,
            notify_end_status = excluded.notify_end_status,
            include_mirror_link = excluded.include_mirror_link",
        params![
            destination.id,
            calendar.quota,
            calendar.include_launches,
            calendar.include_events,
            calendar.hide_if_no_url,
            destination.provider_filter.mode.as_str(),
            notifications.endpoint,
            notifications.launches,
            notifications.events,
            notifications.t0_change,
            status.go,
            status.tbd,
            status.tbc,
            status.liftoff,
            status.hold,
            status.end_status,
            notifications.include_mirror_link,
        ],
    )?;

    tx.execute(
        "DELETE FROM destination_providers WHERE destination_id = ?1",
        [destination.id],
    )?;
    for provider_id in &destination.provider_filter.providers {
        tx.execute(
            "INSERT INTO destination_providers (destination_id, provider_id) VALUES (?1, ?2)",
            params![destination.id, provider_id],
        )?;
    }

    tx.execute(
        "DELETE FROM countdown_leads WHERE destination_id = ?1",
        [destination.id],
    )?;
    for minutes in &notifications.countdown_minutes {
        tx.execute(
            "INSERT INTO countdown_leads (destination_id, minutes) VALUES (?1, ?2)",
            params![destination.id, minutes],
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// Self-healing write-back: sets the calendar quota to 0 after the calendar
/// service permanently rejected the destination. Returns whether a row
/// changed.
///
/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn disable_quota(conn: &Connection, id: i64) -> Result<bool, LedgerError> {
    let updated = conn.execute(
        "UPDATE destinations SET calendar_quota = 0 WHERE id = ?1 AND calendar_quota != 0",
        [id],
    )?;
    Ok(updated > 0)
}

/// Self-healing write-back: clears the delivery endpoint after the transport
/// reported it gone. Returns whether a row changed.
///
/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn clear_endpoint(conn: &Connection, id: i64) -> Result<bool, LedgerError> {
    let updated = conn.execute(
        "UPDATE destinations SET notification_endpoint = NULL
         WHERE id = ?1 AND notification_endpoint IS NOT NULL",
        [id],
    )?;
    Ok(updated > 0)
}
