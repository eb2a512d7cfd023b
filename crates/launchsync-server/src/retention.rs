//! Background task that prunes the sent registry.
//!
//! Keys only need to outlive the window in which a retry could repeat the
//! same message; older rows are dropped.

use chrono::{DateTime, Utc};
use launchsync_db::DbPool;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::ReconcileError;
use crate::store::with_conn;

/// Deletes sent-registry rows recorded before `now - retention`.
pub async fn prune_sent_notifications(
    pool: &DbPool,
    now: DateTime<Utc>,
    retention: chrono::Duration,
) -> Result<usize, ReconcileError> {
    let cutoff = now - retention;
    with_conn(pool, move |conn| launchsync_ledger::prune_sent_before(conn, cutoff)).await
}

/// Starts a background task that periodically prunes the sent registry.
///
/// This task runs indefinitely.
///
/// # Arguments
///
/// * `pool` - Database connection pool.
/// * `interval_seconds` - Time in seconds to wait between prunes.
/// * `retention_days` - How long a sent key is kept.
pub async fn start_sent_retention_task(pool: DbPool, interval_seconds: u64, retention_days: u32) {
    if interval_seconds == 0 {
        tracing::warn!("sent registry retention disabled (interval=0)");
        return;
    }
    let interval = Duration::from_secs(interval_seconds);
    let retention = chrono::Duration::days(i64::from(retention_days));
    tracing::info!(
        interval_seconds,
        retention_days,
        "starting sent registry retention task"
    );

    loop {
        sleep(interval).await;

        match prune_sent_notifications(&pool, Utc::now(), retention).await {
            Ok(0) => tracing::debug!("no expired sent keys to delete"),
            Ok(count) => tracing::info!(count, "deleted expired sent keys"),
            Err(e) => tracing::error!(error = %e, "failed to prune sent registry"),
        }
    }
}
