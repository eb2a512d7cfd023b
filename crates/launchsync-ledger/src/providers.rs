//! Provider (agency) registry.

use launchsync_types::Provider;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::LedgerError;

/// Inserts or refreshes a provider.
///
/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn upsert_provider(conn: &Connection, provider: &Provider) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO providers (id, name, logo_url, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            logo_url = excluded.logo_url,
            updated_at = excluded.updated_at",
        params![provider.id, provider.name, provider.logo_url],
    )?;
    Ok(())
}

/// # Errors
///
/// Returns `LedgerError::Database` on SQL failure.
pub fn get_provider(conn: &Connection, id: i64) -> Result<Option<Provider>, LedgerError> {
    let provider = conn
        .query_row(
            "SELECT id, name, logo_url FROM providers WHERE id = ?1",
            [id],
            |row| {
                Ok(Provider {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    logo_url: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(provider)
}
