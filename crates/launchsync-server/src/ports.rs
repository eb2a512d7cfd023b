//! Capabilities the engine consumes.
//!
//! Each external collaborator sits behind an object-safe async trait so the
//! reconciliation loop can be wired to HTTP adapters in production and to
//! in-memory fakes in tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use launchsync_types::{
    CalendarEntryDraft, CalendarPatch, Destination, ExternalError, FeedSnapshot, Notification,
};

use crate::error::ReconcileError;

/// Upstream event feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetches the current snapshot. An empty snapshot means "no information",
    /// never "everything vanished".
    async fn fetch(&self) -> Result<FeedSnapshot, ExternalError>;
}

/// Read access to destination settings plus the two self-healing writes.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    async fn list_destinations(&self) -> Result<Vec<Destination>, ReconcileError>;

    async fn get_destination(&self, id: i64) -> Result<Option<Destination>, ReconcileError>;

    /// Sets the calendar quota to 0. Returns whether anything changed.
    async fn disable_quota(&self, id: i64) -> Result<bool, ReconcileError>;

    /// Removes the delivery endpoint. Returns whether anything changed.
    async fn clear_endpoint(&self, id: i64) -> Result<bool, ReconcileError>;
}

/// External calendar where mirrors live.
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Creates an entry and returns its external id.
    async fn create(
        &self,
        destination_id: i64,
        draft: &CalendarEntryDraft,
    ) -> Result<String, ExternalError>;

    async fn update(
        &self,
        destination_id: i64,
        entry_id: &str,
        patch: &CalendarPatch,
    ) -> Result<(), ExternalError>;

    async fn delete(&self, destination_id: i64, entry_id: &str) -> Result<(), ExternalError>;
}

/// Outbound notification delivery.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send(&self, endpoint: &str, notification: &Notification)
        -> Result<(), ExternalError>;
}

/// The full capability set, cheap to clone.
#[derive(Clone)]
pub struct Capabilities {
    pub feed: Arc<dyn FeedSource>,
    pub destinations: Arc<dyn DestinationStore>,
    pub calendar: Arc<dyn CalendarService>,
    pub transport: Arc<dyn DeliveryTransport>,
}

/// Runs an external call under `limit`. Running out of time is transient.
pub async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, ExternalError>>,
) -> Result<T, ExternalError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ExternalError::transient(format!(
            "call timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
