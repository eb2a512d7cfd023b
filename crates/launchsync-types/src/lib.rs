//! Shared types, error definitions, and constants for launchsync.
//!
//! This crate provides the data model used across all launchsync crates:
//! the tracked [`Event`] with its [`EventStatus`], the per-subscriber
//! [`Destination`] settings, calendar mirror drafts and patches, the
//! structured [`Notification`] payload, and the typed [`ExternalError`]
//! produced by adapters of external services.
//!
//! No crate in the workspace depends on anything *except* `launchsync-types`
//! for cross-cutting type definitions. This keeps the dependency graph clean
//! and prevents circular dependencies.

mod calendar;
mod destination;
mod error;
mod notification;

pub use calendar::{CalendarEntryDraft, CalendarMirror, CalendarPatch};
pub use destination::{
    CalendarSettings, Destination, FilterMode, NotificationSettings, ProviderFilter,
    StatusToggles, MAX_COUNTDOWN_LEADS,
};
pub use error::{DataInconsistency, ErrorClass, ExternalError};
pub use notification::{Notification, NotificationKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Launch status codes as reported by the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum EventStatus {
    /// Go for launch.
    Go = 1,
    /// To be determined.
    Tbd = 2,
    /// Launch successful.
    Success = 3,
    /// Launch failure.
    Failure = 4,
    /// On hold.
    Hold = 5,
    /// Launch in flight.
    InFlight = 6,
    /// Launch was a partial failure.
    PartialFailure = 7,
    /// To be confirmed.
    Tbc = 8,
}

impl EventStatus {
    /// Every status, in code order.
    pub const ALL: [EventStatus; 8] = [
        Self::Go,
        Self::Tbd,
        Self::Success,
        Self::Failure,
        Self::Hold,
        Self::InFlight,
        Self::PartialFailure,
        Self::Tbc,
    ];

    /// Returns the numeric code for this status.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to convert a numeric code to an `EventStatus`.
    ///
    /// Returns `None` if the code does not correspond to a known status.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Go),
            2 => Some(Self::Tbd),
            3 => Some(Self::Success),
            4 => Some(Self::Failure),
            5 => Some(Self::Hold),
            6 => Some(Self::InFlight),
            7 => Some(Self::PartialFailure),
            8 => Some(Self::Tbc),
            _ => None,
        }
    }

    /// Returns the display label for this status.
    pub fn label(self) -> &'static str {
        match self {
            Self::Go => "Go for Launch",
            Self::Tbd => "To Be Determined",
            Self::Success => "Launch Successful",
            Self::Failure => "Launch Failure",
            Self::Hold => "On Hold",
            Self::InFlight => "Launch in Flight",
            Self::PartialFailure => "Launch was a Partial Failure",
            Self::Tbc => "To Be Confirmed",
        }
    }

    /// End states never transition onward.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::PartialFailure)
    }

    /// The notification toggle bucket this status belongs to.
    pub fn bucket(self) -> StatusBucket {
        match self {
            Self::Go => StatusBucket::Go,
            Self::Tbd => StatusBucket::Tbd,
            Self::Tbc => StatusBucket::Tbc,
            Self::InFlight => StatusBucket::Liftoff,
            Self::Hold => StatusBucket::Hold,
            Self::Success | Self::Failure | Self::PartialFailure => StatusBucket::EndStatus,
        }
    }
}

impl From<EventStatus> for u8 {
    fn from(status: EventStatus) -> Self {
        status.as_u8()
    }
}

impl TryFrom<u8> for EventStatus {
    type Error = DataInconsistency;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_u8(code).ok_or(DataInconsistency::UnknownStatus(code))
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Groups of statuses that destinations toggle notifications for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBucket {
    Go,
    Tbd,
    Tbc,
    Liftoff,
    Hold,
    EndStatus,
}

/// Category of a tracked event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A launch; identified by a non-numeric (UUID) id.
    Launch,
    /// Any other happening (docking, EVA, press event); numeric id.
    Event,
}

impl EventKind {
    /// Derives the kind from an upstream id.
    pub fn from_id(id: &str) -> Self {
        if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
            Self::Event
        } else {
            Self::Launch
        }
    }
}

/// A tracked timed entity as last seen upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Upstream id, stable across polls.
    pub id: String,
    /// Launch provider (agency) id, if any.
    #[serde(default)]
    pub provider_id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Status; `None` for non-launch happenings.
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub description: Option<String>,
    /// Stream or landing page URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Path segment used for external deep-links.
    pub slug: String,
    /// Whether the webcast is live right now.
    #[serde(default)]
    pub live: bool,
    /// Whether a companion data page (e.g. trajectory) exists.
    #[serde(default)]
    pub has_secondary_resource: bool,
}

impl Event {
    /// The category of this event, derived from its id.
    pub fn kind(&self) -> EventKind {
        EventKind::from_id(&self.id)
    }

    /// Whether the event has reached an end-state status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(EventStatus::is_terminal)
    }

    /// An event is worth mirroring while it has not ended and is not terminal.
    pub fn is_mirror_relevant(&self, now: DateTime<Utc>) -> bool {
        self.end > now && !self.is_terminal()
    }

    /// Checks the record invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DataInconsistency`] when the id is empty or the window is
    /// inverted (`start > end`).
    pub fn validate(&self) -> Result<(), DataInconsistency> {
        if self.id.trim().is_empty() {
            return Err(DataInconsistency::MissingId);
        }
        if self.start > self.end {
            return Err(DataInconsistency::InvertedWindow {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// A launch provider (agency).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
}

/// One successful poll of the upstream feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    /// Events keyed by id.
    #[serde(default)]
    pub events: BTreeMap<String, Event>,
    /// Providers referenced by the events, keyed by id.
    #[serde(default)]
    pub providers: BTreeMap<i64, Provider>,
}

impl FeedSnapshot {
    /// An empty snapshot carries no information and must not be read as
    /// "every event vanished".
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
