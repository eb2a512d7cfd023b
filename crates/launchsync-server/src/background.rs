//! Periodic drivers for the reconciliation cycle and the countdown scan.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::countdown::{CountdownScanner, ScanOutcome};
use crate::reconcile::{CycleOutcome, Reconciler};

/// Runs a reconciliation cycle every `interval_seconds`, first tick
/// immediately. Runs indefinitely.
///
/// A tick that arrives while the previous cycle is still running is skipped
/// rather than queued.
pub async fn start_reconcile_task(reconciler: Arc<Reconciler>, interval_seconds: u64) {
    if interval_seconds == 0 {
        tracing::warn!("reconcile task disabled (interval=0)");
        return;
    }
    tracing::info!(interval_seconds, "starting reconcile task");

    let mut ticker = interval(Duration::from_secs(interval_seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if reconciler.run_cycle().await == CycleOutcome::Skipped {
            tracing::debug!("previous reconcile cycle still running");
        }
    }
}

/// Runs the countdown scan every `interval_seconds`. Runs indefinitely.
pub async fn start_countdown_task(scanner: Arc<CountdownScanner>, interval_seconds: u64) {
    if interval_seconds == 0 {
        tracing::warn!("countdown task disabled (interval=0)");
        return;
    }
    tracing::info!(interval_seconds, "starting countdown task");

    let mut ticker = interval(Duration::from_secs(interval_seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if let ScanOutcome::Skipped = scanner.scan().await {
            tracing::debug!("previous countdown scan still running");
        }
    }
}
