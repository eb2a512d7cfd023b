//! Property-based tests for the engine invariants.
//!
//! These tests use proptest to verify invariants hold across randomly
//! generated events, destinations and clocks.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use launchsync_engine::{
    diff_events, due_countdowns, plan_allocation, target_set, NotificationClass,
    TransitionPolicy,
};
use launchsync_types::{Destination, Event, EventStatus, ProviderFilter};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

fn arb_status() -> impl Strategy<Value = Option<EventStatus>> {
    prop::option::of(prop::sample::select(EventStatus::ALL.to_vec()))
}

/// Generates an event id: launches are hex strings, events purely numeric.
fn arb_id() -> impl Strategy<Value = String> {
    prop_oneof!["[a-f0-9]{6}", "[1-9][0-9]{0,3}"]
}

fn arb_event() -> impl Strategy<Value = Event> {
    (
        arb_id(),
        prop::option::of(1i64..6),
        arb_status(),
        prop::option::of("[a-z]{1,8}"),
        -120i64..600, // start offset, minutes
        0i64..240,    // duration, minutes
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(id, provider_id, status, url, offset, duration, live, secondary)| {
                let start = base() + Duration::minutes(offset);
                Event {
                    slug: format!("slug-{id}"),
                    name: format!("Mission {id}"),
                    id,
                    provider_id,
                    status,
                    description: None,
                    url: url.map(|u| format!("https://stream.example/{u}")),
                    image_url: None,
                    start,
                    end: start + Duration::minutes(duration),
                    live,
                    has_secondary_resource: secondary,
                }
            },
        )
}

fn arb_destination() -> impl Strategy<Value = Destination> {
    (
        0u32..6,
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        prop::collection::btree_set(1i64..6, 0..3),
    )
        .prop_map(
            |(quota, launches, events, hide, include_mode, providers)| {
                let mut dest = Destination::new(1);
                dest.calendar.quota = quota;
                dest.calendar.include_launches = launches;
                dest.calendar.include_events = events;
                dest.calendar.hide_if_no_url = hide;
                dest.provider_filter = if include_mode {
                    ProviderFilter::include(providers)
                } else {
                    ProviderFilter::exclude(providers)
                };
                dest
            },
        )
}

/// Events with unique ids.
fn arb_events() -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec(arb_event(), 0..12).prop_map(|events| {
        let mut seen = std::collections::BTreeSet::new();
        events
            .into_iter()
            .filter(|e| seen.insert(e.id.clone()))
            .collect()
    })
}

proptest! {
    #[test]
    fn diff_is_idempotent_after_apply(cached in arb_event(), mut fresh in arb_event()) {
        fresh.id.clone_from(&cached.id);
        let first = diff_events(Some(&cached), Some(&fresh), base()).unwrap();

        let mut updated = cached.clone();
        first.delta.apply_to(&mut updated);
        prop_assert_eq!(&updated, &fresh);

        let second = diff_events(Some(&updated), Some(&fresh), base()).unwrap();
        prop_assert!(second.delta.is_empty());
    }

    #[test]
    fn unchanged_status_and_start_never_notifies(
        status in arb_status(),
        offset in -1000i64..100_000,
    ) {
        let start = base() + Duration::minutes(offset);
        let policy = TransitionPolicy::default();
        prop_assert_eq!(
            policy.decide(status, status, start, Some(start), base()),
            NotificationClass::None
        );
    }

    #[test]
    fn terminal_status_is_absorbing(
        old in prop::sample::select(vec![
            EventStatus::Success,
            EventStatus::Failure,
            EventStatus::PartialFailure,
        ]),
        new in prop::sample::select(EventStatus::ALL.to_vec()),
        old_offset in -1000i64..100_000,
        new_offset in prop::option::of(-1000i64..100_000),
    ) {
        let policy = TransitionPolicy::default();
        let old_start = base() + Duration::minutes(old_offset);
        let new_start = new_offset.map(|m| base() + Duration::minutes(m));
        prop_assert_eq!(
            policy.decide(Some(old), Some(new), old_start, new_start, base()),
            NotificationClass::None
        );
    }

    #[test]
    fn allocation_is_deterministic(dest in arb_destination(), events in arb_events()) {
        let first = target_set(&dest, &events, base());
        let mut reversed = events.clone();
        reversed.reverse();
        let second = target_set(&dest, &reversed, base());
        prop_assert_eq!(&first, &second);
        prop_assert!(first.len() <= dest.calendar.quota as usize);
    }

    #[test]
    fn later_event_never_reorders_target(
        dest in arb_destination(),
        events in arb_events(),
        mut extra in arb_event(),
    ) {
        let before = target_set(&dest, &events, base());
        let latest = events.iter().map(|e| e.start).max().unwrap_or_else(base);
        extra.id = "zzzzzzzz".to_string();
        extra.start = latest + Duration::minutes(1);
        extra.end = extra.start + Duration::minutes(30);

        let mut grown = events.clone();
        grown.push(extra);
        let after = target_set(&dest, &grown, base());

        let kept = before.len().min(after.len());
        prop_assert_eq!(&before[..kept], &after[..kept]);
        if after.len() > before.len() {
            prop_assert_eq!(after.last().map(String::as_str), Some("zzzzzzzz"));
        }
    }

    #[test]
    fn plan_reaches_target(
        previous in prop::collection::btree_set("[a-e]", 0..5),
        target in prop::collection::btree_set("[a-e]", 0..5),
    ) {
        let target: Vec<String> = target.into_iter().collect();
        let plan = plan_allocation(previous.iter().map(String::as_str), &target);

        let mut result: std::collections::BTreeSet<String> = previous.clone();
        for id in &plan.delete {
            prop_assert!(result.remove(id));
        }
        for id in &plan.create {
            prop_assert!(result.insert(id.clone()));
        }
        let expected: std::collections::BTreeSet<String> = target.into_iter().collect();
        prop_assert_eq!(result, expected);
    }

    #[test]
    fn consecutive_scans_fire_each_crossing_at_most_once(
        events in arb_events(),
        leads in prop::collection::btree_set(0u32..90, 1..4),
        steps in prop::collection::vec(1i64..10, 1..40),
    ) {
        let mut dest = Destination::new(1);
        dest.notifications.endpoint = Some("https://hooks.example/1".to_string());
        dest.notifications.launches = true;
        dest.notifications.events = true;
        dest.notifications.countdown_minutes = leads.into_iter().collect();

        let mut seen = std::collections::BTreeSet::new();
        let mut lower = base() - Duration::minutes(180);
        for step in steps {
            let now = lower + Duration::minutes(step);
            for hit in due_countdowns(&dest, &events, lower, now) {
                prop_assert!(
                    seen.insert((hit.event.id.clone(), hit.minutes)),
                    "fired twice: {} at {}",
                    hit.event.id,
                    hit.minutes
                );
            }
            lower = now;
        }
    }
}
