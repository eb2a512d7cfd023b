//! Notification fan-out.
//!
//! Turns a decided [`NotificationClass`] into at most one message per
//! destination and delivers it through the transport. Each delivery is
//! keyed in the sent registry so retries never duplicate a message.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use launchsync_db::DbPool;
use launchsync_engine::NotificationClass;
use launchsync_ledger::{format_ts, SentKey};
use launchsync_types::{Destination, Event, EventStatus, Notification, NotificationKind, Provider};
use serde::Serialize;

use crate::error::ReconcileError;
use crate::ports::{bounded, DeliveryTransport, DestinationStore};
use crate::store::with_conn;

/// A change worth notifying about, queued by the reconciliation loop.
#[derive(Debug, Clone)]
pub struct ChangeNotice {
    pub class: NotificationClass,
    /// Cached record before the change.
    pub previous: Event,
    /// Record as now reported upstream.
    pub current: Event,
    /// When the cycle that saw the change ran. Part of the sent key, so a
    /// transition that repeats later is a new message.
    pub observed_at: DateTime<Utc>,
}

impl ChangeNotice {
    fn sent_key(&self, destination_id: i64, kind: NotificationKind) -> SentKey {
        let code = |status: Option<EventStatus>| status.map_or(0, EventStatus::as_u8);
        SentKey::new(
            self.current.id.clone(),
            destination_id,
            format!(
                "{}:{}>{}:{}>{}@{}",
                kind.as_str(),
                code(self.previous.status),
                code(self.current.status),
                format_ts(self.previous.start),
                format_ts(self.current.start),
                format_ts(self.observed_at),
            ),
        )
    }
}

/// Picks the message kind `destination` should receive for a change, if any.
///
/// A compound change yields one message: combined when both parts are
/// wanted, otherwise the part that is.
pub fn change_kind_for(
    destination: &Destination,
    class: NotificationClass,
    event: &Event,
) -> Option<NotificationKind> {
    if !destination.admits_for_notifications(event) {
        return None;
    }
    let wants_status = destination.wants_status(event.status);
    let wants_time = destination.wants_time_change(event.kind());
    match class {
        NotificationClass::None => None,
        NotificationClass::StatusOnly => wants_status.then_some(NotificationKind::Status),
        NotificationClass::TimeOnly => wants_time.then_some(NotificationKind::TimeChange),
        NotificationClass::Both => match (wants_status, wants_time) {
            (true, true) => Some(NotificationKind::StatusAndTime),
            (true, false) => Some(NotificationKind::Status),
            (false, true) => Some(NotificationKind::TimeChange),
            (false, false) => None,
        },
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    /// The sent registry already holds the key.
    AlreadySent,
    /// The endpoint no longer exists and was cleared.
    EndpointCleared,
    Failed,
}

/// Delivery counters for one fan-out or scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub sent: usize,
    pub already_sent: usize,
    pub endpoints_cleared: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Sent => self.sent += 1,
            DeliveryOutcome::AlreadySent => self.already_sent += 1,
            DeliveryOutcome::EndpointCleared => self.endpoints_cleared += 1,
            DeliveryOutcome::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: DeliveryReport) {
        self.sent += other.sent;
        self.already_sent += other.already_sent;
        self.endpoints_cleared += other.endpoints_cleared;
        self.failed += other.failed;
    }
}

/// Delivers notifications to destinations with per-destination isolation.
pub struct Notifier {
    pool: DbPool,
    destinations: Arc<dyn DestinationStore>,
    transport: Arc<dyn DeliveryTransport>,
    concurrency: usize,
    call_timeout: Duration,
}

impl Notifier {
    pub fn new(
        pool: DbPool,
        destinations: Arc<dyn DestinationStore>,
        transport: Arc<dyn DeliveryTransport>,
        concurrency: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            destinations,
            transport,
            concurrency: concurrency.max(1),
            call_timeout,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Loads the provider and the per-destination mirror entry ids of an
    /// event, used to enrich messages.
    pub(crate) async fn enrichment(
        &self,
        event: &Event,
    ) -> Result<(Option<Provider>, HashMap<i64, String>), ReconcileError> {
        let provider_id = event.provider_id;
        let event_id = event.id.clone();
        with_conn(&self.pool, move |conn| {
            let provider = match provider_id {
                Some(id) => launchsync_ledger::get_provider(conn, id)?,
                None => None,
            };
            let entries = launchsync_ledger::mirrors_for_event(conn, &event_id)?
                .into_iter()
                .map(|m| (m.destination_id, m.entry_id))
                .collect();
            Ok((provider, entries))
        })
        .await
    }

    /// Fans one change out to every eligible destination.
    pub async fn dispatch_change(
        &self,
        notice: &ChangeNotice,
        destinations: &[Destination],
        now: DateTime<Utc>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let targets: Vec<(Destination, NotificationKind)> = destinations
            .iter()
            .filter_map(|d| {
                change_kind_for(d, notice.class, &notice.current).map(|k| (d.clone(), k))
            })
            .collect();
        if targets.is_empty() {
            return report;
        }

        let (provider, entries) = match self.enrichment(&notice.current).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    event_id = %notice.current.id,
                    error = %e,
                    "failed to load notification context, sending without it"
                );
                (None, HashMap::new())
            }
        };

        let outcomes: Vec<DeliveryOutcome> = stream::iter(targets)
            .map(|(destination, kind)| {
                let mut notification = Notification::for_event(kind, &notice.current)
                    .with_provider(provider.clone());
                if kind != NotificationKind::Status {
                    notification = notification.with_previous_start(notice.previous.start);
                }
                if destination.notifications.include_mirror_link {
                    notification =
                        notification.with_mirror_entry(entries.get(&destination.id).cloned());
                }
                let key = notice.sent_key(destination.id, kind);
                async move { self.deliver(&destination, key, notification, now).await }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            report.record(outcome);
        }
        tracing::debug!(
            event_id = %notice.current.id,
            class = notice.class.as_str(),
            sent = report.sent,
            failed = report.failed,
            "change notification fanned out"
        );
        report
    }

    /// Delivers one notification unless its key was already sent.
    pub async fn deliver(
        &self,
        destination: &Destination,
        key: SentKey,
        notification: Notification,
        now: DateTime<Utc>,
    ) -> DeliveryOutcome {
        let Some(endpoint) = destination.notifications.endpoint.as_deref() else {
            return DeliveryOutcome::Failed;
        };

        let lookup = key.clone();
        match with_conn(&self.pool, move |conn| launchsync_ledger::was_sent(conn, &lookup)).await {
            Ok(true) => return DeliveryOutcome::AlreadySent,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    destination_id = destination.id,
                    error = %e,
                    "sent registry unavailable, not delivering"
                );
                return DeliveryOutcome::Failed;
            }
        }

        match bounded(
            self.call_timeout,
            self.transport.send(endpoint, &notification),
        )
        .await
        {
            Ok(()) => {
                let event_id = key.event_id.clone();
                if let Err(e) =
                    with_conn(&self.pool, move |conn| launchsync_ledger::mark_sent(conn, &key, now))
                        .await
                {
                    tracing::error!(
                        destination_id = destination.id,
                        event_id = %event_id,
                        error = %e,
                        "delivered but failed to record in sent registry"
                    );
                }
                DeliveryOutcome::Sent
            }
            Err(e) if e.is_not_found() => {
                if let Err(err) = self.destinations.clear_endpoint(destination.id).await {
                    tracing::error!(
                        destination_id = destination.id,
                        error = %err,
                        "failed to clear vanished endpoint"
                    );
                }
                DeliveryOutcome::EndpointCleared
            }
            Err(e) => {
                tracing::warn!(
                    destination_id = destination.id,
                    event_id = %key.event_id,
                    class = %e.class,
                    error = %e,
                    "notification delivery failed"
                );
                DeliveryOutcome::Failed
            }
        }
    }
}
