//! Countdown window selection.
//!
//! A scan covers the instants `(lower, now]`. An event with lead time `L`
//! is due when its start falls in `(lower + L, now + L]`, i.e. when the
//! instant `start - L` was crossed during the window. Consecutive scans share
//! their boundary, so each crossing lands in exactly one window.

use chrono::{DateTime, Duration, Utc};
use launchsync_types::{Destination, Event, EventStatus};

/// One countdown notification that is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownHit<'a> {
    pub event: &'a Event,
    pub minutes: u32,
}

/// Lower bound of the next scan window.
///
/// Returns `None` when the destination has no watermark yet: the first scan
/// only initializes the cursor and never catches up on past crossings. The
/// bound is clamped to `now - max_lookback` so a long outage does not flood
/// the destination.
pub fn scan_lower_bound(
    watermark: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_lookback: Duration,
) -> Option<DateTime<Utc>> {
    watermark.map(|at| at.max(now - max_lookback))
}

/// Every (event, lead time) pair that became due for `destination` in the
/// window `(lower, now]`.
///
/// Events on hold never count down. Provider filter and the launch/event
/// toggles apply; the endpoint is not checked here.
pub fn due_countdowns<'a>(
    destination: &Destination,
    events: impl IntoIterator<Item = &'a Event>,
    lower: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<CountdownHit<'a>> {
    let leads = &destination.notifications.countdown_minutes;
    if leads.is_empty() || lower >= now {
        return Vec::new();
    }

    let mut hits = Vec::new();
    for event in events {
        if event.status == Some(EventStatus::Hold)
            || !destination.provider_filter.admits(event.provider_id)
            || !destination.notifications.wants_kind(event.kind())
        {
            continue;
        }
        for &minutes in leads {
            let lead = Duration::minutes(i64::from(minutes));
            if lower + lead < event.start && event.start <= now + lead {
                hits.push(CountdownHit { event, minutes });
            }
        }
    }
    hits
}
