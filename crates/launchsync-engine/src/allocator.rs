//! Quota allocator.
//!
//! Recomputed from scratch every cycle: the target set depends only on the
//! destination's settings, the cached events and `now`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use launchsync_types::{Destination, Event};
use serde::Serialize;

/// Picks the events `destination` should mirror, earliest start first.
///
/// Ties on start break by id so consecutive cycles agree on the same set.
/// Returns an empty set when mirroring is disabled.
pub fn target_set<'a>(
    destination: &Destination,
    events: impl IntoIterator<Item = &'a Event>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let quota = destination.calendar.quota as usize;
    if quota == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<&Event> = events
        .into_iter()
        .filter(|event| event.is_mirror_relevant(now) && destination.admits_for_calendar(event))
        .collect();
    candidates.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
    candidates
        .into_iter()
        .take(quota)
        .map(|event| event.id.clone())
        .collect()
}

/// Minimal operations that turn the current mirror set into the target set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllocationPlan {
    /// In target order, so the earliest events are created first.
    pub create: Vec<String>,
    /// Sorted by id.
    pub delete: Vec<String>,
    pub keep: Vec<String>,
}

impl AllocationPlan {
    pub fn is_noop(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}

pub fn plan_allocation<'a>(
    previous: impl IntoIterator<Item = &'a str>,
    target: &[String],
) -> AllocationPlan {
    let previous: BTreeSet<&str> = previous.into_iter().collect();
    let wanted: BTreeSet<&str> = target.iter().map(String::as_str).collect();

    let mut plan = AllocationPlan::default();
    for id in target {
        if previous.contains(id.as_str()) {
            plan.keep.push(id.clone());
        } else {
            plan.create.push(id.clone());
        }
    }
    plan.delete = previous
        .difference(&wanted)
        .map(|id| (*id).to_string())
        .collect();
    plan
}
