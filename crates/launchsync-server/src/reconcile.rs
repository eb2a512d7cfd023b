//! The reconciliation loop.
//!
//! One cycle compares the upstream snapshot with the event cache, keeps the
//! calendar mirrors of every destination in line with its quota allocation,
//! and queues change notifications. Failures are isolated per
//! (event, destination, operation) and never abort the cycle.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use launchsync_db::DbPool;
use launchsync_engine::{
    diff_events, plan_allocation, plan_mirror_action, target_set, AllocationPlan, EventDiff,
    MirrorAction, MirrorSettings, NotificationClass, TransitionPolicy,
};
use launchsync_types::{
    CalendarEntryDraft, CalendarMirror, Destination, ErrorClass, Event, ExternalError,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::error::ReconcileError;
use crate::fanout::{ChangeNotice, DeliveryReport, Notifier};
use crate::ports::{bounded, Capabilities};
use crate::store::with_conn;

/// Tunables of the reconciliation loop.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileSettings {
    /// Maximum in-flight external calls.
    pub concurrency: usize,
    /// Upper bound for every external call.
    pub call_timeout: Duration,
    pub mirror: MirrorSettings,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            call_timeout: Duration::from_secs(10),
            mirror: MirrorSettings::default(),
        }
    }
}

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub skipped_records: usize,
    pub new_events: usize,
    pub updated_events: usize,
    pub vanished_events: usize,
    /// Events whose processing is retried next cycle.
    pub deferred_events: usize,
    pub mirrors_created: usize,
    pub mirrors_updated: usize,
    pub mirrors_deleted: usize,
    pub destinations_disabled: usize,
    pub failures: usize,
    pub notifications: DeliveryReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// A cycle was already running.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MirrorOp {
    Update,
    Delete,
}

struct MirrorResult {
    mirror: CalendarMirror,
    op: MirrorOp,
    result: Result<(), ExternalError>,
}

/// The reconciliation state object: pool, capabilities, policy, settings.
pub struct Reconciler {
    pool: DbPool,
    caps: Capabilities,
    policy: TransitionPolicy,
    settings: ReconcileSettings,
    notifier: Arc<Notifier>,
    running: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        pool: DbPool,
        caps: Capabilities,
        policy: TransitionPolicy,
        settings: ReconcileSettings,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            pool,
            caps,
            policy,
            settings,
            notifier,
            running: Mutex::new(()),
        }
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        self.run_cycle_at(Utc::now()).await
    }

    /// Runs one full cycle as of `now`, unless one is already in progress.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::debug!("reconcile cycle already running, skipping");
            return CycleOutcome::Skipped;
        };
        let cycle_id = uuid::Uuid::new_v4();
        let report = self
            .cycle(now)
            .instrument(tracing::info_span!("reconcile_cycle", %cycle_id))
            .await;
        tracing::info!(%cycle_id, ?report, "reconcile cycle complete");
        CycleOutcome::Completed(report)
    }

    async fn cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();

        let snapshot = match bounded(self.settings.call_timeout, self.caps.feed.fetch()).await {
            Ok(snapshot) if !snapshot.is_empty() => snapshot,
            Ok(_) => {
                tracing::warn!("feed returned an empty snapshot, nothing changes this cycle");
                return report;
            }
            Err(e) => {
                tracing::warn!(class = %e.class, error = %e, "feed fetch failed, nothing changes this cycle");
                return report;
            }
        };
        report.fetched = snapshot.events.len();

        let providers: Vec<_> = snapshot.providers.into_values().collect();
        if let Err(e) = with_conn(&self.pool, move |conn| {
            providers
                .iter()
                .try_for_each(|p| launchsync_ledger::upsert_provider(conn, p))
        })
        .await
        {
            tracing::warn!(error = %e, "failed to refresh providers");
        }

        let cached: BTreeMap<String, Event> =
            match with_conn(&self.pool, launchsync_ledger::list_events).await {
                Ok(events) => events.into_iter().map(|e| (e.id.clone(), e)).collect(),
                Err(e) => {
                    tracing::error!(error = %e, "failed to load event cache, aborting cycle");
                    report.failures += 1;
                    return report;
                }
            };

        let upstream_ids: BTreeSet<String> = snapshot.events.keys().cloned().collect();
        let mut fresh: BTreeMap<String, Event> = BTreeMap::new();
        for (id, event) in snapshot.events {
            match event.validate() {
                Ok(()) if event.id == id => {
                    fresh.insert(id, event);
                }
                Ok(()) => {
                    tracing::warn!(event_id = %id, record_id = %event.id, "feed key does not match record id, skipping");
                    report.skipped_records += 1;
                }
                Err(e) => {
                    tracing::warn!(event_id = %id, error = %e, "inconsistent upstream record, skipping");
                    report.skipped_records += 1;
                }
            }
        }

        let mut notices = Vec::new();

        // Events present on both sides.
        for (id, current) in &fresh {
            let Some(previous) = cached.get(id) else {
                continue;
            };
            let Some(diff) = diff_events(Some(previous), Some(current), now) else {
                continue;
            };
            if diff.delta.is_empty() {
                continue;
            }
            tracing::debug!(event_id = %id, fields = ?diff.delta.changed_fields(), "event changed");

            match self.update_event(previous, current, &diff, now, &mut report).await {
                Ok(true) => {
                    report.updated_events += 1;
                    if diff.delta.touches_notification() {
                        let class = self.policy.decide(
                            previous.status,
                            current.status,
                            previous.start,
                            diff.delta.start,
                            now,
                        );
                        if class != NotificationClass::None {
                            notices.push(ChangeNotice {
                                class,
                                previous: previous.clone(),
                                current: current.clone(),
                                observed_at: now,
                            });
                        }
                    }
                }
                Ok(false) => report.deferred_events += 1,
                Err(e) => {
                    tracing::warn!(event_id = %id, error = %e, "event update failed, retrying next cycle");
                    report.failures += 1;
                    report.deferred_events += 1;
                }
            }
        }

        // Cached events no longer upstream.
        let vanished: Vec<String> = cached
            .keys()
            .filter(|id| !upstream_ids.contains(*id))
            .cloned()
            .collect();
        for id in &vanished {
            match self.remove_vanished(id, &mut report).await {
                Ok(true) => report.vanished_events += 1,
                Ok(false) => report.deferred_events += 1,
                Err(e) => {
                    tracing::warn!(event_id = %id, error = %e, "vanished event cleanup failed");
                    report.failures += 1;
                    report.deferred_events += 1;
                }
            }
        }

        // Events seen for the first time.
        let new_events: Vec<Event> = fresh
            .into_iter()
            .filter(|(id, _)| !cached.contains_key(id))
            .map(|(_, event)| event)
            .collect();
        let inserted = new_events.len();
        match with_conn(&self.pool, move |conn| {
            new_events
                .iter()
                .try_for_each(|e| launchsync_ledger::upsert_event(conn, e))
        })
        .await
        {
            Ok(()) => report.new_events += inserted,
            Err(e) => {
                tracing::error!(error = %e, "failed to insert new events");
                report.failures += 1;
            }
        }

        let destinations = match self.allocate(&upstream_ids, now, &mut report).await {
            Ok(destinations) => destinations,
            Err(e) => {
                tracing::error!(error = %e, "allocation pass failed");
                report.failures += 1;
                return report;
            }
        };

        for notice in &notices {
            let delivered = self.notifier.dispatch_change(notice, &destinations, now).await;
            report.notifications.merge(delivered);
        }

        report
    }

    async fn mirror_ops(&self, ops: Vec<(CalendarMirror, MirrorAction)>) -> Vec<MirrorResult> {
        let limit = self.settings.call_timeout;
        stream::iter(ops)
            .map(|(mirror, action)| async move {
                let calendar = &self.caps.calendar;
                let (op, result) = match &action {
                    MirrorAction::Update(patch) => (
                        MirrorOp::Update,
                        bounded(
                            limit,
                            calendar.update(mirror.destination_id, &mirror.entry_id, patch),
                        )
                        .await,
                    ),
                    _ => (
                        MirrorOp::Delete,
                        bounded(limit, calendar.delete(mirror.destination_id, &mirror.entry_id))
                            .await,
                    ),
                };
                MirrorResult { mirror, op, result }
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await
    }

    /// Applies a change to every mirror of the event, then writes the cache.
    ///
    /// Returns `false` when a transient failure deferred the cache write.
    async fn update_event(
        &self,
        previous: &Event,
        current: &Event,
        diff: &EventDiff,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<bool, ReconcileError> {
        let event_id = current.id.clone();
        let mirrors = with_conn(&self.pool, move |conn| {
            launchsync_ledger::mirrors_for_event(conn, &event_id)
        })
        .await?;

        let action = if !diff.mirror_relevant {
            MirrorAction::Delete
        } else if diff.delta.touches_mirror() {
            plan_mirror_action(previous, &diff.delta, now, &self.settings.mirror)
        } else {
            MirrorAction::Skip
        };

        let ops: Vec<_> = match action {
            MirrorAction::Skip => Vec::new(),
            action => mirrors.into_iter().map(|m| (m, action.clone())).collect(),
        };

        let mut deferred = false;
        for MirrorResult { mirror, op, result } in self.mirror_ops(ops).await {
            let (destination_id, event_id) = (mirror.destination_id, mirror.event_id.clone());
            match (op, result) {
                (MirrorOp::Update, Ok(())) => report.mirrors_updated += 1,
                (MirrorOp::Delete, Ok(())) => {
                    self.drop_mirror(destination_id, event_id).await?;
                    report.mirrors_deleted += 1;
                }
                (_, Err(e)) if e.class == ErrorClass::NotFound => {
                    tracing::debug!(destination_id, event_id = %event_id, "calendar entry already gone");
                    self.drop_mirror(destination_id, event_id).await?;
                    report.mirrors_deleted += 1;
                }
                (_, Err(e)) if e.class == ErrorClass::PermanentForbidden => {
                    self.self_heal(destination_id, &e, report).await?;
                }
                (_, Err(e)) => {
                    tracing::warn!(
                        destination_id,
                        event_id = %event_id,
                        class = %e.class,
                        error = %e,
                        "mirror operation failed"
                    );
                    report.failures += 1;
                    deferred |= e.class == ErrorClass::Transient;
                }
            }
        }

        if deferred {
            return Ok(false);
        }
        let event = current.clone();
        with_conn(&self.pool, move |conn| launchsync_ledger::upsert_event(conn, &event)).await?;
        Ok(true)
    }

    /// Deletes all mirrors of a vanished event, then evicts it from the
    /// cache. Returns `false` when a delete must be retried next cycle.
    async fn remove_vanished(
        &self,
        event_id: &str,
        report: &mut CycleReport,
    ) -> Result<bool, ReconcileError> {
        let id = event_id.to_string();
        let mirrors = with_conn(&self.pool, move |conn| {
            launchsync_ledger::mirrors_for_event(conn, &id)
        })
        .await?;

        let ops = mirrors.into_iter().map(|m| (m, MirrorAction::Delete)).collect();
        let mut blocked = false;
        for MirrorResult { mirror, result, .. } in self.mirror_ops(ops).await {
            let destination_id = mirror.destination_id;
            match result {
                Ok(()) => {
                    self.drop_mirror(destination_id, mirror.event_id).await?;
                    report.mirrors_deleted += 1;
                }
                Err(e) if e.class == ErrorClass::NotFound => {
                    self.drop_mirror(destination_id, mirror.event_id).await?;
                    report.mirrors_deleted += 1;
                }
                Err(e) if e.class == ErrorClass::PermanentForbidden => {
                    self.self_heal(destination_id, &e, report).await?;
                }
                Err(e) => {
                    tracing::warn!(
                        destination_id,
                        event_id,
                        class = %e.class,
                        error = %e,
                        "failed to delete mirror of vanished event"
                    );
                    report.failures += 1;
                    blocked = true;
                }
            }
        }

        if blocked {
            return Ok(false);
        }
        let id = event_id.to_string();
        with_conn(&self.pool, move |conn| launchsync_ledger::remove_event(conn, &id)).await?;
        tracing::debug!(event_id, "vanished event removed from cache");
        Ok(true)
    }

    /// Brings every destination's mirrors in line with its target set.
    /// Returns the destinations as read after self-healing.
    ///
    /// Only events still reported upstream compete for slots. Cached events
    /// outside `upstream_ids` are vanished ones awaiting a retried delete;
    /// their mirrors are left to [`Self::remove_vanished`].
    async fn allocate(
        &self,
        upstream_ids: &BTreeSet<String>,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<Vec<Destination>, ReconcileError> {
        let destinations = self.caps.destinations.list_destinations().await?;
        let (mut events, mirrors) = with_conn(&self.pool, |conn| {
            Ok((
                launchsync_ledger::list_events(conn)?,
                launchsync_ledger::list_mirrors(conn)?,
            ))
        })
        .await?;
        events.retain(|e| upstream_ids.contains(&e.id));

        let mut held: HashMap<i64, Vec<String>> = HashMap::new();
        for mirror in mirrors {
            if upstream_ids.contains(&mirror.event_id) {
                held.entry(mirror.destination_id)
                    .or_default()
                    .push(mirror.event_id);
            }
        }

        let work: Vec<(i64, AllocationPlan)> = destinations
            .iter()
            .filter_map(|d| {
                let previous = held.get(&d.id).map(Vec::as_slice).unwrap_or_default();
                if !d.mirrors_enabled() && previous.is_empty() {
                    return None;
                }
                let target = target_set(d, &events, now);
                let plan = plan_allocation(previous.iter().map(String::as_str), &target);
                (!plan.is_noop()).then_some((d.id, plan))
            })
            .collect();
        if work.is_empty() {
            return Ok(destinations);
        }

        let events: Arc<HashMap<String, Event>> =
            Arc::new(events.into_iter().map(|e| (e.id.clone(), e)).collect());
        let reports: Vec<CycleReport> = stream::iter(work)
            .map(|(destination_id, plan)| {
                let events = Arc::clone(&events);
                async move {
                    let mut local = CycleReport::default();
                    if let Err(e) = self
                        .apply_plan(destination_id, plan, &events, now, &mut local)
                        .await
                    {
                        tracing::warn!(destination_id, error = %e, "allocation failed for destination");
                        local.failures += 1;
                    }
                    local
                }
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut disabled = false;
        for local in reports {
            report.mirrors_created += local.mirrors_created;
            report.mirrors_deleted += local.mirrors_deleted;
            report.destinations_disabled += local.destinations_disabled;
            report.failures += local.failures;
            disabled |= local.destinations_disabled > 0;
        }

        if disabled {
            return self.caps.destinations.list_destinations().await;
        }
        Ok(destinations)
    }

    /// Creates then deletes for one destination, sequentially. Stops at the
    /// first permanent rejection.
    async fn apply_plan(
        &self,
        destination_id: i64,
        plan: AllocationPlan,
        events: &HashMap<String, Event>,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<(), ReconcileError> {
        let limit = self.settings.call_timeout;

        for event_id in &plan.create {
            let Some(event) = events.get(event_id) else {
                continue;
            };
            let draft = CalendarEntryDraft::from_event(event, now, self.settings.mirror.live_buffer);
            match bounded(limit, self.caps.calendar.create(destination_id, &draft)).await {
                Ok(entry_id) => {
                    let mirror = CalendarMirror {
                        destination_id,
                        event_id: event_id.clone(),
                        entry_id,
                        created_at: now,
                    };
                    with_conn(&self.pool, move |conn| {
                        launchsync_ledger::record_mirror(conn, &mirror)
                    })
                    .await?;
                    report.mirrors_created += 1;
                }
                Err(e) if e.is_forbidden() || e.is_not_found() => {
                    self.self_heal(destination_id, &e, report).await?;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        destination_id,
                        event_id = %event_id,
                        class = %e.class,
                        error = %e,
                        "calendar create failed"
                    );
                    report.failures += 1;
                }
            }
        }

        for event_id in plan.delete {
            let lookup = event_id.clone();
            let Some(mirror) = with_conn(&self.pool, move |conn| {
                launchsync_ledger::get_mirror(conn, destination_id, &lookup)
            })
            .await?
            else {
                continue;
            };
            match bounded(limit, self.caps.calendar.delete(destination_id, &mirror.entry_id)).await {
                Ok(()) => {
                    self.drop_mirror(destination_id, event_id).await?;
                    report.mirrors_deleted += 1;
                }
                Err(e) if e.is_not_found() => {
                    self.drop_mirror(destination_id, event_id).await?;
                    report.mirrors_deleted += 1;
                }
                Err(e) if e.is_forbidden() => {
                    self.self_heal(destination_id, &e, report).await?;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        destination_id,
                        event_id = %event_id,
                        class = %e.class,
                        error = %e,
                        "calendar delete failed"
                    );
                    report.failures += 1;
                }
            }
        }

        Ok(())
    }

    async fn drop_mirror(&self, destination_id: i64, event_id: String) -> Result<(), ReconcileError> {
        with_conn(&self.pool, move |conn| {
            launchsync_ledger::remove_mirror(conn, destination_id, &event_id)
        })
        .await?;
        Ok(())
    }

    /// The destination rejected us permanently: disable its quota and forget
    /// its mirrors so no further calls are made for it.
    async fn self_heal(
        &self,
        destination_id: i64,
        cause: &ExternalError,
        report: &mut CycleReport,
    ) -> Result<(), ReconcileError> {
        tracing::warn!(
            destination_id,
            class = %cause.class,
            error = %cause,
            "destination rejected calendar access, disabling mirroring"
        );
        if self.caps.destinations.disable_quota(destination_id).await? {
            report.destinations_disabled += 1;
        }
        let dropped = with_conn(&self.pool, move |conn| {
            launchsync_ledger::remove_mirrors_for_destination(conn, destination_id)
        })
        .await?;
        tracing::debug!(destination_id, dropped, "dropped mirror records of disabled destination");
        Ok(())
    }
}
