//! Translating an event delta into an update of one calendar entry.

use chrono::{DateTime, Duration, Utc};
use launchsync_types::{CalendarPatch, Event};

use crate::diff::EventDelta;

/// Timing rules for entries of events that are live or about to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorSettings {
    /// Offset from `now` used as the start of an entry that begins now.
    pub live_buffer: Duration,
    /// A started entry whose event slips further than this is recreated.
    pub live_slip_threshold: Duration,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            live_buffer: Duration::seconds(60),
            live_slip_threshold: Duration::hours(1),
        }
    }
}

/// What to do with an existing calendar entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorAction {
    Update(CalendarPatch),
    /// Drop the entry; allocation recreates it when appropriate.
    Delete,
    /// Nothing the entry shows has changed.
    Skip,
}

/// Plans the update of one mirror of `cached` given the observed delta.
///
/// `cached` is the record before the delta is applied.
pub fn plan_mirror_action(
    cached: &Event,
    delta: &EventDelta,
    now: DateTime<Utc>,
    settings: &MirrorSettings,
) -> MirrorAction {
    if delta.live == Some(false) {
        return MirrorAction::Delete;
    }

    let mut patch = CalendarPatch {
        name: delta.name.clone(),
        description: delta.description.clone(),
        url: delta.url.clone(),
        image_url: delta.image_url.clone(),
        start: delta.start,
        end: delta.end,
        start_now: false,
    };
    let begins_now = now + settings.live_buffer;

    if delta.live == Some(true) {
        patch.start = Some(begins_now);
        patch.start_now = true;
    } else if let Some(new_start) = delta.start {
        let entry_started = cached.live || cached.start <= now;
        if new_start < begins_now {
            patch.start = None;
            patch.start_now = cached.start > now;
        } else if entry_started {
            if new_start > now + settings.live_slip_threshold {
                return MirrorAction::Delete;
            }
            patch.start = None;
        }
    }

    if patch.start_now || patch.start.is_some() {
        let start = patch.start.unwrap_or(begins_now);
        let end = patch.end.unwrap_or(cached.end);
        if end < start {
            patch.end = Some(start);
        }
    }

    if patch.is_empty() {
        MirrorAction::Skip
    } else {
        MirrorAction::Update(patch)
    }
}
