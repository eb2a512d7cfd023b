//! Per-subscriber destination settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{Event, EventKind, EventStatus, StatusBucket};

/// Upper bound on configured countdown lead times per destination.
pub const MAX_COUNTDOWN_LEADS: usize = 64;

/// An independent subscriber: quota, filters, notification toggles and
/// delivery endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: i64,
    #[serde(default)]
    pub calendar: CalendarSettings,
    #[serde(default)]
    pub provider_filter: ProviderFilter,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl Destination {
    /// Creates a destination with everything disabled.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            calendar: CalendarSettings::default(),
            provider_filter: ProviderFilter::default(),
            notifications: NotificationSettings::default(),
        }
    }

    /// Whether mirroring is enabled at all.
    pub fn mirrors_enabled(&self) -> bool {
        self.calendar.quota > 0
    }

    /// Whether the event may occupy one of this destination's calendar slots.
    ///
    /// Does not look at mirror relevance or quota; those belong to the
    /// allocator.
    pub fn admits_for_calendar(&self, event: &Event) -> bool {
        if !self.provider_filter.admits(event.provider_id) {
            return false;
        }
        if self.calendar.hide_if_no_url && event.url.is_none() {
            return false;
        }
        match event.kind() {
            EventKind::Launch => self.calendar.include_launches,
            EventKind::Event => self.calendar.include_events,
        }
    }

    /// Whether change and countdown notifications can reach this destination
    /// for the given event at all.
    pub fn admits_for_notifications(&self, event: &Event) -> bool {
        self.notifications.endpoint.is_some() && self.provider_filter.admits(event.provider_id)
    }

    /// Whether this destination wants status notifications for `status`.
    pub fn wants_status(&self, status: Option<EventStatus>) -> bool {
        status.is_some_and(|s| self.notifications.status.enabled(s.bucket()))
    }

    /// Whether this destination wants T-0 change notifications for `kind`.
    pub fn wants_time_change(&self, kind: EventKind) -> bool {
        self.notifications.t0_change && self.notifications.wants_kind(kind)
    }
}

/// Calendar mirroring settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSettings {
    /// Maximum number of concurrently mirrored events. 0 disables mirroring.
    pub quota: u32,
    pub include_launches: bool,
    pub include_events: bool,
    /// Skip events without a stream URL.
    pub hide_if_no_url: bool,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            quota: 0,
            include_launches: true,
            include_events: true,
            hide_if_no_url: false,
        }
    }
}

/// Whether the provider set lists the only admitted providers or the
/// rejected ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Include,
    #[default]
    Exclude,
}

impl FilterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "include" => Some(Self::Include),
            "exclude" => Some(Self::Exclude),
            _ => None,
        }
    }
}

/// Provider (agency) include/exclude filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFilter {
    pub mode: FilterMode,
    pub providers: BTreeSet<i64>,
}

impl ProviderFilter {
    pub fn include(providers: impl IntoIterator<Item = i64>) -> Self {
        Self {
            mode: FilterMode::Include,
            providers: providers.into_iter().collect(),
        }
    }

    pub fn exclude(providers: impl IntoIterator<Item = i64>) -> Self {
        Self {
            mode: FilterMode::Exclude,
            providers: providers.into_iter().collect(),
        }
    }

    /// Events without a provider pass an exclude filter and fail an include
    /// filter.
    pub fn admits(&self, provider_id: Option<i64>) -> bool {
        match (self.mode, provider_id) {
            (FilterMode::Exclude, None) => true,
            (FilterMode::Exclude, Some(id)) => !self.providers.contains(&id),
            (FilterMode::Include, None) => false,
            (FilterMode::Include, Some(id)) => self.providers.contains(&id),
        }
    }
}

/// Per status bucket notification toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusToggles {
    pub go: bool,
    pub tbd: bool,
    pub tbc: bool,
    pub liftoff: bool,
    pub hold: bool,
    pub end_status: bool,
}

impl StatusToggles {
    pub fn all() -> Self {
        Self {
            go: true,
            tbd: true,
            tbc: true,
            liftoff: true,
            hold: true,
            end_status: true,
        }
    }

    pub fn enabled(&self, bucket: StatusBucket) -> bool {
        match bucket {
            StatusBucket::Go => self.go,
            StatusBucket::Tbd => self.tbd,
            StatusBucket::Tbc => self.tbc,
            StatusBucket::Liftoff => self.liftoff,
            StatusBucket::Hold => self.hold,
            StatusBucket::EndStatus => self.end_status,
        }
    }
}

/// Notification delivery settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Delivery endpoint; `None` disables every notification.
    pub endpoint: Option<String>,
    /// Launch notifications (T-0 changes and countdowns).
    pub launches: bool,
    /// Non-launch event notifications (T-0 changes and countdowns).
    pub events: bool,
    pub t0_change: bool,
    pub status: StatusToggles,
    /// Attach the destination's calendar entry id to messages.
    pub include_mirror_link: bool,
    /// Countdown lead times in minutes, ascending and unique.
    pub countdown_minutes: Vec<u32>,
}

impl NotificationSettings {
    pub fn wants_kind(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Launch => self.launches,
            EventKind::Event => self.events,
        }
    }

    /// Sorts, deduplicates and truncates the lead times to
    /// [`MAX_COUNTDOWN_LEADS`] entries.
    pub fn normalize_countdowns(&mut self) {
        self.countdown_minutes.sort_unstable();
        self.countdown_minutes.dedup();
        self.countdown_minutes.truncate(MAX_COUNTDOWN_LEADS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn launch(provider_id: Option<i64>, url: Option<&str>) -> Event {
        let start = Utc.with_ymd_and_hms(2030, 3, 1, 0, 0, 0).unwrap();
        Event {
            id: "6f1c1a52-launch".to_string(),
            provider_id,
            name: "Electron".to_string(),
            status: Some(EventStatus::Go),
            description: None,
            url: url.map(str::to_string),
            image_url: None,
            start,
            end: start,
            slug: "electron".to_string(),
            live: false,
            has_secondary_resource: false,
        }
    }

    #[test]
    fn exclude_filter_admits_unlisted_and_providerless() {
        let filter = ProviderFilter::exclude([44]);
        assert!(filter.admits(Some(121)));
        assert!(filter.admits(None));
        assert!(!filter.admits(Some(44)));
    }

    #[test]
    fn include_filter_admits_only_listed() {
        let filter = ProviderFilter::include([44]);
        assert!(filter.admits(Some(44)));
        assert!(!filter.admits(Some(121)));
        assert!(!filter.admits(None));
    }

    #[test]
    fn hide_if_no_url_rejects_streamless_events() {
        let mut dest = Destination::new(1);
        dest.calendar.quota = 5;
        assert!(dest.admits_for_calendar(&launch(None, None)));
        dest.calendar.hide_if_no_url = true;
        assert!(!dest.admits_for_calendar(&launch(None, None)));
        assert!(dest.admits_for_calendar(&launch(None, Some("https://stream"))));
    }

    #[test]
    fn category_flags_gate_calendar() {
        let mut dest = Destination::new(1);
        dest.calendar.include_launches = false;
        assert!(!dest.admits_for_calendar(&launch(None, None)));
    }

    #[test]
    fn countdowns_normalize() {
        let mut settings = NotificationSettings {
            countdown_minutes: (0..100).rev().chain([5, 5]).collect(),
            ..Default::default()
        };
        settings.normalize_countdowns();
        assert_eq!(settings.countdown_minutes.len(), MAX_COUNTDOWN_LEADS);
        assert_eq!(settings.countdown_minutes[0], 0);
        assert!(settings.countdown_minutes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn status_wishes_follow_buckets() {
        let mut dest = Destination::new(1);
        dest.notifications.status.go = true;
        assert!(dest.wants_status(Some(EventStatus::Go)));
        assert!(!dest.wants_status(Some(EventStatus::Hold)));
        assert!(!dest.wants_status(None));
    }
}
