//! Status transition policy.
//!
//! Maps a status change and an optional T-0 change to the class of
//! notification that should go out. The table is indexed by status code
//! (rows old, columns new).

use chrono::{DateTime, Duration, Utc};
use launchsync_types::EventStatus;
use serde::{Deserialize, Serialize};

/// Default lookahead window for T-0 changes.
pub const DEFAULT_WINDOW_DAYS: i64 = 28;

/// Which notification a change warrants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationClass {
    None,
    StatusOnly,
    TimeOnly,
    Both,
}

impl NotificationClass {
    pub fn includes_status(self) -> bool {
        matches!(self, Self::StatusOnly | Self::Both)
    }

    pub fn includes_time(self) -> bool {
        matches!(self, Self::TimeOnly | Self::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::StatusOnly => "status_only",
            Self::TimeOnly => "time_only",
            Self::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    N,
    S,
    T,
    B,
}

use Cell::{B, N, S, T};

// Go, TBD, Success, Failure, Hold, InFlight, Partial, TBC
const TABLE: [[Cell; 8]; 8] = [
    [T, B, S, S, S, S, S, B], // Go
    [B, N, S, S, S, S, S, B], // TBD
    [N, N, N, N, N, N, N, N], // Success
    [N, N, N, N, N, N, N, N], // Failure
    [B, B, S, S, N, S, S, B], // Hold
    [N, N, S, S, N, N, S, N], // InFlight
    [N, N, N, N, N, N, N, N], // Partial failure
    [B, B, S, S, S, S, S, T], // TBC
];

fn cell(old: EventStatus, new: EventStatus) -> Cell {
    TABLE[usize::from(old.as_u8() - 1)][usize::from(new.as_u8() - 1)]
}

/// The table-driven transition policy with its T-0 lookahead window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPolicy {
    window: Duration,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self::new(Duration::days(DEFAULT_WINDOW_DAYS))
    }
}

impl TransitionPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decides the notification class for one observed change.
    ///
    /// `new_start` is `None` when the start did not change. A T-0 change is
    /// in window when `now < new_start <= now + window`.
    pub fn decide(
        &self,
        old_status: Option<EventStatus>,
        new_status: Option<EventStatus>,
        old_start: DateTime<Utc>,
        new_start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> NotificationClass {
        let moved = new_start.filter(|start| *start != old_start);
        if old_status == new_status && moved.is_none() {
            return NotificationClass::None;
        }
        let in_window = moved.is_some_and(|start| now < start && start <= now + self.window);

        let (Some(old), Some(new)) = (old_status, new_status) else {
            return if in_window {
                NotificationClass::TimeOnly
            } else {
                NotificationClass::None
            };
        };

        match (cell(old, new), in_window) {
            (N, _) => NotificationClass::None,
            (S, _) | (B, false) => NotificationClass::StatusOnly,
            (B, true) => NotificationClass::Both,
            (T, true) => NotificationClass::TimeOnly,
            (T, false) => NotificationClass::None,
        }
    }
}
