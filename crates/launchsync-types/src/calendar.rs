//! Calendar mirror records and the payloads sent to the calendar service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Event;

/// The durable record of an event mirrored into one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarMirror {
    pub destination_id: i64,
    pub event_id: String,
    /// Entry id assigned by the external calendar service.
    pub entry_id: String,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to create a calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntryDraft {
    pub event_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Entry location; `None` renders as a "no stream yet" placeholder.
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Create the entry in the started state.
    pub started: bool,
}

impl CalendarEntryDraft {
    /// Builds a draft from a cached event.
    ///
    /// A live event already began, so its entry starts at `now + live_buffer`
    /// instead of the upstream start.
    pub fn from_event(event: &Event, now: DateTime<Utc>, live_buffer: chrono::Duration) -> Self {
        let start = if event.live {
            now + live_buffer
        } else {
            event.start
        };
        Self {
            event_id: event.id.clone(),
            name: event.name.clone(),
            description: event.description.clone(),
            url: event.url.clone(),
            image_url: event.image_url.clone(),
            start,
            end: event.end.max(start),
            started: event.live,
        }
    }
}

/// A sparse update of an existing calendar entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Move the entry into the started state.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub start_now: bool,
}

impl CalendarPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.url.is_none()
            && self.image_url.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && !self.start_now
    }
}
