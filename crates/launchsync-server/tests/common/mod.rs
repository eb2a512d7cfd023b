//! Shared fixtures for the server integration tests: a file-backed pool and
//! in-memory fakes of the external capabilities.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use launchsync_db::{open_database, DbPool, PoolSettings};
use launchsync_engine::TransitionPolicy;
use launchsync_server::{
    CalendarService, Capabilities, CountdownScanner, DeliveryTransport, DestinationStore,
    FeedSource, Notifier, ReconcileSettings, Reconciler, SqliteDestinationStore,
};
use launchsync_types::{
    CalendarEntryDraft, CalendarMirror, CalendarPatch, Destination, Event, EventStatus,
    ExternalError, FeedSnapshot, Notification, Provider, StatusToggles,
};
use tempfile::TempDir;
use tokio::sync::Notify;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
}

/// A pooled database in a temporary directory. Pooled `:memory:`
/// connections would each see their own empty database.
pub fn test_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("launchsync.db");
    let pool = open_database(path, PoolSettings::default()).expect("database should open");
    (dir, pool)
}

pub fn launch(id: &str, start: DateTime<Utc>) -> Event {
    Event {
        id: id.to_string(),
        provider_id: Some(121),
        name: format!("Falcon 9 | {id}"),
        status: Some(EventStatus::Go),
        description: None,
        url: Some(format!("https://stream.example/{id}")),
        image_url: None,
        start,
        end: start + chrono::Duration::hours(1),
        slug: format!("falcon-9-{id}"),
        live: false,
        has_secondary_resource: false,
    }
}

pub fn provider() -> Provider {
    Provider {
        id: 121,
        name: "SpaceX".to_string(),
        logo_url: None,
    }
}

pub fn snapshot(events: &[Event]) -> FeedSnapshot {
    FeedSnapshot {
        events: events.iter().map(|e| (e.id.clone(), e.clone())).collect(),
        providers: [(121, provider())].into_iter().collect(),
    }
}

/// A destination mirroring up to `quota` events, without notifications.
pub fn calendar_destination(id: i64, quota: u32) -> Destination {
    let mut destination = Destination::new(id);
    destination.calendar.quota = quota;
    destination
}

/// A destination subscribed to every status and T-0 change of launches.
pub fn subscriber(id: i64) -> Destination {
    let mut destination = Destination::new(id);
    destination.notifications.endpoint = Some(endpoint(id));
    destination.notifications.launches = true;
    destination.notifications.t0_change = true;
    destination.notifications.status = StatusToggles::all();
    destination
}

pub fn endpoint(id: i64) -> String {
    format!("https://hooks.example/{id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalendarCall {
    Create { destination_id: i64, event_id: String },
    Update { destination_id: i64, entry_id: String, patch: CalendarPatch },
    Delete { destination_id: i64, entry_id: String },
}

pub struct FakeFeed {
    snapshot: Mutex<Result<FeedSnapshot, ExternalError>>,
    fetches: Mutex<usize>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(Ok(FeedSnapshot::default())),
            fetches: Mutex::new(0),
            gate: Mutex::new(None),
        }
    }

    pub fn serve(&self, events: &[Event]) {
        *self.snapshot.lock().unwrap() = Ok(snapshot(events));
    }

    pub fn fail(&self, err: ExternalError) {
        *self.snapshot.lock().unwrap() = Err(err);
    }

    /// Makes every fetch wait until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl FeedSource for FakeFeed {
    async fn fetch(&self) -> Result<FeedSnapshot, ExternalError> {
        *self.fetches.lock().unwrap() += 1;
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let snapshot = self.snapshot.lock().unwrap().clone();
        snapshot
    }
}

#[derive(Default)]
struct CalendarState {
    next_id: usize,
    entries: HashMap<String, (i64, CalendarEntryDraft)>,
    calls: Vec<CalendarCall>,
    failures: HashMap<(i64, Op), ExternalError>,
}

/// In-memory calendar with scripted per-(destination, operation) failures.
#[derive(Default)]
pub struct FakeCalendar {
    state: Mutex<CalendarState>,
}

impl FakeCalendar {
    pub fn fail(&self, destination_id: i64, op: Op, err: ExternalError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((destination_id, op), err);
    }

    pub fn heal(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn calls(&self) -> Vec<CalendarCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn entry(&self, entry_id: &str) -> Option<CalendarEntryDraft> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(entry_id)
            .map(|(_, draft)| draft.clone())
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }
}

#[async_trait]
impl CalendarService for FakeCalendar {
    async fn create(
        &self,
        destination_id: i64,
        draft: &CalendarEntryDraft,
    ) -> Result<String, ExternalError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CalendarCall::Create {
            destination_id,
            event_id: draft.event_id.clone(),
        });
        if let Some(err) = state.failures.get(&(destination_id, Op::Create)) {
            return Err(err.clone());
        }
        state.next_id += 1;
        let entry_id = format!("entry-{}", state.next_id);
        state
            .entries
            .insert(entry_id.clone(), (destination_id, draft.clone()));
        Ok(entry_id)
    }

    async fn update(
        &self,
        destination_id: i64,
        entry_id: &str,
        patch: &CalendarPatch,
    ) -> Result<(), ExternalError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CalendarCall::Update {
            destination_id,
            entry_id: entry_id.to_string(),
            patch: patch.clone(),
        });
        if let Some(err) = state.failures.get(&(destination_id, Op::Update)) {
            return Err(err.clone());
        }
        match state.entries.get_mut(entry_id) {
            Some((_, draft)) => {
                if let Some(name) = &patch.name {
                    draft.name = name.clone();
                }
                if let Some(start) = patch.start {
                    draft.start = start;
                }
                if let Some(end) = patch.end {
                    draft.end = end;
                }
                draft.started |= patch.start_now;
                Ok(())
            }
            None => Err(ExternalError::not_found(format!("no entry {entry_id}"))),
        }
    }

    async fn delete(&self, destination_id: i64, entry_id: &str) -> Result<(), ExternalError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CalendarCall::Delete {
            destination_id,
            entry_id: entry_id.to_string(),
        });
        if let Some(err) = state.failures.get(&(destination_id, Op::Delete)) {
            return Err(err.clone());
        }
        match state.entries.remove(entry_id) {
            Some(_) => Ok(()),
            None => Err(ExternalError::not_found(format!("no entry {entry_id}"))),
        }
    }
}

/// Records every delivery; endpoints can be scripted to fail.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Notification)>>,
    failures: Mutex<HashMap<String, ExternalError>>,
}

impl RecordingTransport {
    pub fn fail(&self, endpoint: &str, err: ExternalError) {
        self.failures
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), err);
    }

    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    async fn send(&self, endpoint: &str, notification: &Notification) -> Result<(), ExternalError> {
        if let Some(err) = self.failures.lock().unwrap().get(endpoint) {
            return Err(err.clone());
        }
        self.sent
            .lock()
            .unwrap()
            .push((endpoint.to_string(), notification.clone()));
        Ok(())
    }
}

/// A reconciler and countdown scanner wired to fakes over a fresh database.
pub struct Harness {
    _dir: TempDir,
    pub pool: DbPool,
    pub feed: Arc<FakeFeed>,
    pub calendar: Arc<FakeCalendar>,
    pub transport: Arc<RecordingTransport>,
    pub notifier: Arc<Notifier>,
    pub reconciler: Arc<Reconciler>,
    pub scanner: Arc<CountdownScanner>,
}

impl Harness {
    pub fn new() -> Self {
        let (dir, pool) = test_pool();
        let feed = Arc::new(FakeFeed::new());
        let calendar = Arc::new(FakeCalendar::default());
        let transport = Arc::new(RecordingTransport::default());
        let destinations: Arc<dyn DestinationStore> =
            Arc::new(SqliteDestinationStore::new(pool.clone()));
        let settings = ReconcileSettings {
            call_timeout: Duration::from_secs(5),
            ..Default::default()
        };

        let notifier = Arc::new(Notifier::new(
            pool.clone(),
            destinations.clone(),
            transport.clone(),
            settings.concurrency,
            settings.call_timeout,
        ));
        let caps = Capabilities {
            feed: feed.clone(),
            destinations: destinations.clone(),
            calendar: calendar.clone(),
            transport: transport.clone(),
        };
        let reconciler = Arc::new(Reconciler::new(
            pool.clone(),
            caps,
            TransitionPolicy::default(),
            settings,
            notifier.clone(),
        ));
        let scanner = Arc::new(CountdownScanner::new(
            destinations,
            notifier.clone(),
            chrono::Duration::minutes(60),
            settings.concurrency,
        ));

        Self {
            _dir: dir,
            pool,
            feed,
            calendar,
            transport,
            notifier,
            reconciler,
            scanner,
        }
    }

    pub fn add_destination(&self, destination: &Destination) {
        let conn = self.pool.get().expect("should get a connection");
        launchsync_ledger::upsert_destination(&conn, destination)
            .expect("should store destination");
    }

    pub fn destination(&self, id: i64) -> Destination {
        let conn = self.pool.get().expect("should get a connection");
        launchsync_ledger::get_destination(&conn, id)
            .expect("should query destination")
            .expect("destination should exist")
    }

    pub fn cache_event(&self, event: &Event) {
        let conn = self.pool.get().expect("should get a connection");
        launchsync_ledger::upsert_event(&conn, event).expect("should cache event");
    }

    pub fn cached(&self, id: &str) -> Option<Event> {
        let conn = self.pool.get().expect("should get a connection");
        launchsync_ledger::get_event(&conn, id).expect("should query event")
    }

    pub fn record_mirror(&self, destination_id: i64, event_id: &str, entry_id: &str) {
        let conn = self.pool.get().expect("should get a connection");
        launchsync_ledger::record_mirror(
            &conn,
            &CalendarMirror {
                destination_id,
                event_id: event_id.to_string(),
                entry_id: entry_id.to_string(),
                created_at: now(),
            },
        )
        .expect("should record mirror");
    }

    pub fn mirrors(&self, destination_id: i64) -> Vec<CalendarMirror> {
        let conn = self.pool.get().expect("should get a connection");
        launchsync_ledger::mirrors_for_destination(&conn, destination_id)
            .expect("should query mirrors")
    }

    pub fn watermark(&self, destination_id: i64) -> Option<DateTime<Utc>> {
        let conn = self.pool.get().expect("should get a connection");
        launchsync_ledger::get_watermark(&conn, destination_id).expect("should query watermark")
    }
}
