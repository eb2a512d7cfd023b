//! Countdown scan.
//!
//! Runs on its own timer. For every destination with an endpoint and at
//! least one lead time it selects the crossings since the destination's
//! watermark, delivers them once, and moves the watermark to `now`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use launchsync_engine::{due_countdowns, scan_lower_bound};
use launchsync_ledger::SentKey;
use launchsync_types::{Destination, Event, Notification, NotificationKind};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::error::ReconcileError;
use crate::fanout::{DeliveryOutcome, DeliveryReport, Notifier};
use crate::ports::DestinationStore;
use crate::store::with_conn;

/// Counters for one countdown scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountdownReport {
    pub destinations_scanned: usize,
    /// Destinations seen for the first time; their watermark was only set.
    pub watermarks_initialized: usize,
    pub deliveries: DeliveryReport,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed(CountdownReport),
    /// Another scan was still running.
    Skipped,
}

enum DestinationScan {
    Initialized,
    Scanned(DeliveryReport),
}

pub struct CountdownScanner {
    destinations: Arc<dyn DestinationStore>,
    notifier: Arc<Notifier>,
    max_lookback: chrono::Duration,
    concurrency: usize,
    running: Mutex<()>,
}

impl CountdownScanner {
    pub fn new(
        destinations: Arc<dyn DestinationStore>,
        notifier: Arc<Notifier>,
        max_lookback: chrono::Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            destinations,
            notifier,
            max_lookback,
            concurrency: concurrency.max(1),
            running: Mutex::new(()),
        }
    }

    pub async fn scan(&self) -> ScanOutcome {
        self.scan_at(Utc::now()).await
    }

    /// Runs one scan as of `now`, unless a scan is already in progress.
    pub async fn scan_at(&self, now: DateTime<Utc>) -> ScanOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::debug!("countdown scan already running, skipping");
            return ScanOutcome::Skipped;
        };
        let scan_id = uuid::Uuid::new_v4();
        let report = self
            .run(now)
            .instrument(tracing::info_span!("countdown_scan", %scan_id))
            .await;
        ScanOutcome::Completed(report)
    }

    async fn run(&self, now: DateTime<Utc>) -> CountdownReport {
        let mut report = CountdownReport::default();

        let destinations = match self.destinations.list_destinations().await {
            Ok(all) => all,
            Err(e) => {
                tracing::error!(error = %e, "failed to list destinations for countdown scan");
                report.failures += 1;
                return report;
            }
        };
        let subscribed: Vec<Destination> = destinations
            .into_iter()
            .filter(|d| {
                d.notifications.endpoint.is_some() && !d.notifications.countdown_minutes.is_empty()
            })
            .collect();
        if subscribed.is_empty() {
            return report;
        }

        let events = match with_conn(self.notifier.pool(), launchsync_ledger::list_events).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(error = %e, "failed to load event cache for countdown scan");
                report.failures += 1;
                return report;
            }
        };

        let events = Arc::new(events);
        let results: Vec<(i64, Result<DestinationScan, ReconcileError>)> = stream::iter(subscribed)
            .map(|destination| {
                let events = Arc::clone(&events);
                async move {
                    (
                        destination.id,
                        self.scan_destination(&destination, &events, now).await,
                    )
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (destination_id, result) in results {
            report.destinations_scanned += 1;
            match result {
                Ok(DestinationScan::Initialized) => report.watermarks_initialized += 1,
                Ok(DestinationScan::Scanned(deliveries)) => report.deliveries.merge(deliveries),
                Err(e) => {
                    tracing::warn!(destination_id, error = %e, "countdown scan failed for destination");
                    report.failures += 1;
                }
            }
        }

        tracing::info!(
            destinations = report.destinations_scanned,
            sent = report.deliveries.sent,
            failed = report.deliveries.failed,
            "countdown scan complete"
        );
        report
    }

    async fn scan_destination(
        &self,
        destination: &Destination,
        events: &[Event],
        now: DateTime<Utc>,
    ) -> Result<DestinationScan, ReconcileError> {
        let pool = self.notifier.pool();
        let destination_id = destination.id;

        let watermark = with_conn(pool, move |conn| {
            launchsync_ledger::get_watermark(conn, destination_id)
        })
        .await?;

        let Some(lower) = scan_lower_bound(watermark, now, self.max_lookback) else {
            with_conn(pool, move |conn| {
                launchsync_ledger::advance_watermark(conn, destination_id, now)
            })
            .await?;
            tracing::debug!(destination_id, "countdown watermark initialized");
            return Ok(DestinationScan::Initialized);
        };

        let mut deliveries = DeliveryReport::default();
        for hit in due_countdowns(destination, events, lower, now) {
            let (provider, entries) = self.notifier.enrichment(hit.event).await?;
            let mut notification = Notification::for_event(
                NotificationKind::Countdown {
                    minutes: hit.minutes,
                },
                hit.event,
            )
            .with_provider(provider);
            if destination.notifications.include_mirror_link {
                notification = notification.with_mirror_entry(entries.get(&destination_id).cloned());
            }
            let key = SentKey::countdown(hit.event.id.clone(), destination_id, hit.minutes);
            let outcome = self.notifier.deliver(destination, key, notification, now).await;
            deliveries.record(outcome);
            if outcome == DeliveryOutcome::EndpointCleared {
                break;
            }
        }

        with_conn(pool, move |conn| {
            launchsync_ledger::advance_watermark(conn, destination_id, now)
        })
        .await?;
        Ok(DestinationScan::Scanned(deliveries))
    }
}
