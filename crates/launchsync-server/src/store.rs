//! SQLite-backed destination store and the blocking-pool bridge.

use async_trait::async_trait;
use launchsync_db::DbPool;
use launchsync_ledger::LedgerError;
use launchsync_types::Destination;
use rusqlite::Connection;

use crate::error::ReconcileError;
use crate::ports::DestinationStore;

/// Runs `f` against a pooled connection on the blocking thread pool.
pub async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, ReconcileError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, LedgerError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<T, ReconcileError> {
        let conn = pool.get()?;
        Ok(f(&*conn)?)
    })
    .await?
}

/// Destination registry in the local database.
#[derive(Clone)]
pub struct SqliteDestinationStore {
    pool: DbPool,
}

impl SqliteDestinationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DestinationStore for SqliteDestinationStore {
    async fn list_destinations(&self) -> Result<Vec<Destination>, ReconcileError> {
        with_conn(&self.pool, launchsync_ledger::list_destinations).await
    }

    async fn get_destination(&self, id: i64) -> Result<Option<Destination>, ReconcileError> {
        with_conn(&self.pool, move |conn| {
            launchsync_ledger::get_destination(conn, id)
        })
        .await
    }

    async fn disable_quota(&self, id: i64) -> Result<bool, ReconcileError> {
        let changed =
            with_conn(&self.pool, move |conn| launchsync_ledger::disable_quota(conn, id)).await?;
        if changed {
            tracing::warn!(destination_id = id, "calendar access revoked, quota disabled");
        }
        Ok(changed)
    }

    async fn clear_endpoint(&self, id: i64) -> Result<bool, ReconcileError> {
        let changed =
            with_conn(&self.pool, move |conn| launchsync_ledger::clear_endpoint(conn, id))
                .await?;
        if changed {
            tracing::warn!(destination_id = id, "delivery endpoint gone, endpoint cleared");
        }
        Ok(changed)
    }
}
