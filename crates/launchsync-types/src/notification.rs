//! Structured notification payloads handed to the delivery transport.
//!
//! Rendering into a user-facing message is the transport's concern; the core
//! only decides *what* is sent and to whom.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Event, EventKind, EventStatus, Provider};

/// What triggered a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// The status changed.
    Status,
    /// The scheduled start (T-0) moved.
    TimeChange,
    /// Status and T-0 changed together.
    StatusAndTime,
    /// A configured lead time before start was crossed.
    Countdown { minutes: u32 },
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::TimeChange => "time_change",
            Self::StatusAndTime => "status_and_time",
            Self::Countdown { .. } => "countdown",
        }
    }
}

/// A notification for one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub event_id: String,
    pub event_kind: EventKind,
    pub name: String,
    pub status: Option<EventStatus>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub slug: String,
    pub start: DateTime<Utc>,
    /// Companion trajectory data exists upstream; the transport may render a
    /// link to it.
    #[serde(default)]
    pub has_secondary_resource: bool,
    /// Start before the change, for T-0 change notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_start: Option<DateTime<Utc>>,
    /// Sender identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// The destination's calendar entry for this event, when opted in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_entry_id: Option<String>,
}

impl Notification {
    pub fn for_event(kind: NotificationKind, event: &Event) -> Self {
        Self {
            kind,
            event_id: event.id.clone(),
            event_kind: event.kind(),
            name: event.name.clone(),
            status: event.status,
            url: event.url.clone(),
            image_url: event.image_url.clone(),
            slug: event.slug.clone(),
            start: event.start,
            has_secondary_resource: event.has_secondary_resource,
            previous_start: None,
            provider: None,
            mirror_entry_id: None,
        }
    }

    pub fn with_previous_start(mut self, previous_start: DateTime<Utc>) -> Self {
        self.previous_start = Some(previous_start);
        self
    }

    pub fn with_provider(mut self, provider: Option<Provider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_mirror_entry(mut self, entry_id: Option<String>) -> Self {
        self.mirror_entry_id = entry_id;
        self
    }
}
