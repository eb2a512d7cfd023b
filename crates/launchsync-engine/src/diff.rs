//! Diff engine.

use chrono::{DateTime, Utc};
use launchsync_types::{Event, EventStatus};
use serde::Serialize;

/// How an event id relates to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// Present upstream, absent from the cache.
    New,
    /// Cached, absent upstream.
    Vanished,
    /// Present in both.
    Present,
}

/// Sparse field delta. A slot is `Some` only when the field changed; for
/// nullable fields the inner `Option` carries the new value, so a field
/// cleared upstream is `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Option<EventStatus>>,
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_secondary_resource: Option<bool>,
}

fn changed<T: PartialEq + Clone>(old: &T, new: &T) -> Option<T> {
    (old != new).then(|| new.clone())
}

impl EventDelta {
    /// Compares two records of the same event field by field.
    pub fn between(old: &Event, new: &Event) -> Self {
        Self {
            provider_id: changed(&old.provider_id, &new.provider_id),
            name: changed(&old.name, &new.name),
            status: changed(&old.status, &new.status),
            description: changed(&old.description, &new.description),
            url: changed(&old.url, &new.url),
            image_url: changed(&old.image_url, &new.image_url),
            start: changed(&old.start, &new.start),
            end: changed(&old.end, &new.end),
            slug: changed(&old.slug, &new.slug),
            live: changed(&old.live, &new.live),
            has_secondary_resource: changed(
                &old.has_secondary_resource,
                &new.has_secondary_resource,
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Names of the changed fields, in declaration order.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let slots = [
            ("provider_id", self.provider_id.is_some()),
            ("name", self.name.is_some()),
            ("status", self.status.is_some()),
            ("description", self.description.is_some()),
            ("url", self.url.is_some()),
            ("image_url", self.image_url.is_some()),
            ("start", self.start.is_some()),
            ("end", self.end.is_some()),
            ("slug", self.slug.is_some()),
            ("live", self.live.is_some()),
            ("has_secondary_resource", self.has_secondary_resource.is_some()),
        ];
        slots
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }

    /// Whether any field represented in a calendar entry changed.
    pub fn touches_mirror(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.url.is_some()
            || self.image_url.is_some()
            || self.start.is_some()
            || self.end.is_some()
            || self.live.is_some()
    }

    /// Whether the change can produce a change notification.
    pub fn touches_notification(&self) -> bool {
        self.status.is_some() || self.start.is_some()
    }

    /// Folds the delta into `event`.
    pub fn apply_to(&self, event: &mut Event) {
        if let Some(v) = &self.provider_id {
            event.provider_id = *v;
        }
        if let Some(v) = &self.name {
            event.name.clone_from(v);
        }
        if let Some(v) = &self.status {
            event.status = *v;
        }
        if let Some(v) = &self.description {
            event.description.clone_from(v);
        }
        if let Some(v) = &self.url {
            event.url.clone_from(v);
        }
        if let Some(v) = &self.image_url {
            event.image_url.clone_from(v);
        }
        if let Some(v) = self.start {
            event.start = v;
        }
        if let Some(v) = self.end {
            event.end = v;
        }
        if let Some(v) = &self.slug {
            event.slug.clone_from(v);
        }
        if let Some(v) = self.live {
            event.live = v;
        }
        if let Some(v) = self.has_secondary_resource {
            event.has_secondary_resource = v;
        }
    }
}

/// The outcome of comparing one event id across cache and feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDiff {
    pub kind: DiffKind,
    /// Empty for new and vanished events.
    pub delta: EventDelta,
    /// The status moved from non-terminal (or none) to terminal.
    pub became_terminal: bool,
    /// Evaluated on the fresh record; always false for a vanished event.
    pub mirror_relevant: bool,
}

/// Compares the cached and fresh records of one event id.
///
/// Returns `None` when neither side exists.
pub fn diff_events(
    cached: Option<&Event>,
    fresh: Option<&Event>,
    now: DateTime<Utc>,
) -> Option<EventDiff> {
    match (cached, fresh) {
        (None, None) => None,
        (None, Some(fresh)) => Some(EventDiff {
            kind: DiffKind::New,
            delta: EventDelta::default(),
            became_terminal: false,
            mirror_relevant: fresh.is_mirror_relevant(now),
        }),
        (Some(_), None) => Some(EventDiff {
            kind: DiffKind::Vanished,
            delta: EventDelta::default(),
            became_terminal: false,
            mirror_relevant: false,
        }),
        (Some(cached), Some(fresh)) => Some(EventDiff {
            kind: DiffKind::Present,
            delta: EventDelta::between(cached, fresh),
            became_terminal: !cached.is_terminal() && fresh.is_terminal(),
            mirror_relevant: fresh.is_mirror_relevant(now),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).unwrap()
    }

    fn event() -> Event {
        let start = now() + Duration::days(2);
        Event {
            id: "a1b2".to_string(),
            provider_id: Some(121),
            name: "Falcon 9 | Starlink 12-4".to_string(),
            status: Some(EventStatus::Tbd),
            description: None,
            url: Some("https://stream.example/a1b2".to_string()),
            image_url: None,
            start,
            end: start + Duration::hours(1),
            slug: "falcon-9-starlink-12-4".to_string(),
            live: false,
            has_secondary_resource: false,
        }
    }

    #[test]
    fn identical_records_have_empty_delta() {
        let diff = diff_events(Some(&event()), Some(&event()), now()).unwrap();
        assert_eq!(diff.kind, DiffKind::Present);
        assert!(diff.delta.is_empty());
        assert!(!diff.became_terminal);
        assert!(diff.mirror_relevant);
    }

    #[test]
    fn cleared_nullable_field_is_a_change() {
        let mut fresh = event();
        fresh.url = None;
        let diff = diff_events(Some(&event()), Some(&fresh), now()).unwrap();
        assert_eq!(diff.delta.url, Some(None));
        assert_eq!(diff.delta.changed_fields(), vec!["url"]);
        assert!(diff.delta.touches_mirror());
        assert!(!diff.delta.touches_notification());
    }

    #[test]
    fn absent_in_both_is_not_a_change() {
        let diff = diff_events(Some(&event()), Some(&event()), now()).unwrap();
        assert_eq!(diff.delta.description, None);
        assert_eq!(diff.delta.image_url, None);
    }

    #[test]
    fn terminal_transition_is_flagged() {
        let mut fresh = event();
        fresh.status = Some(EventStatus::Success);
        let diff = diff_events(Some(&event()), Some(&fresh), now()).unwrap();
        assert!(diff.became_terminal);
        assert!(!diff.mirror_relevant);
        assert!(!diff.delta.touches_mirror());

        let again = diff_events(Some(&fresh), Some(&fresh), now()).unwrap();
        assert!(!again.became_terminal, "already terminal is not a transition");
    }

    #[test]
    fn new_and_vanished() {
        let new = diff_events(None, Some(&event()), now()).unwrap();
        assert_eq!(new.kind, DiffKind::New);
        assert!(new.mirror_relevant);

        let gone = diff_events(Some(&event()), None, now()).unwrap();
        assert_eq!(gone.kind, DiffKind::Vanished);
        assert!(!gone.mirror_relevant);

        assert!(diff_events(None, None, now()).is_none());
    }

    #[test]
    fn applying_delta_converges() {
        let cached = event();
        let mut fresh = event();
        fresh.name = "Falcon 9 | Starlink 12-5".to_string();
        fresh.status = Some(EventStatus::Go);
        fresh.start += Duration::minutes(30);
        fresh.end += Duration::minutes(30);
        fresh.live = true;

        let first = diff_events(Some(&cached), Some(&fresh), now()).unwrap();
        let mut updated = cached.clone();
        first.delta.apply_to(&mut updated);
        assert_eq!(updated, fresh);

        let second = diff_events(Some(&updated), Some(&fresh), now()).unwrap();
        assert!(second.delta.is_empty());
    }
}
