//! Durable ledgers for the reconciliation engine.
//!
//! Every function here takes a plain [`rusqlite::Connection`] and performs
//! one small, idempotent unit of work; callers decide the transaction and
//! threading model. The tables are created by `launchsync-db` migrations.
//!
//! | Store | Table(s) | Purpose |
//! |-------|----------|---------|
//! | Event cache | `events` | last-known attributes per event id |
//! | Providers | `providers` | agency names and logos for notifications |
//! | Destination registry | `destinations`, `destination_providers`, `countdown_leads` | per-subscriber settings plus the self-healing write-backs |
//! | Mirror ledger | `calendar_mirrors` | (destination, event) -> external entry id |
//! | Watermark ledger | `notification_watermarks` | monotonic countdown cursor |
//! | Sent registry | `sent_notifications` | at-most-once delivery keys |

mod destinations;
mod error;
mod events;
mod mirrors;
mod providers;
mod sent;
mod time;
mod watermarks;

pub use destinations::{
    clear_endpoint, disable_quota, get_destination, list_destinations, upsert_destination,
};
pub use error::LedgerError;
pub use events::{get_event, list_events, remove_event, upsert_event};
pub use mirrors::{
    get_mirror, list_mirrors, mirrors_for_destination, mirrors_for_event, record_mirror,
    remove_mirror, remove_mirrors_for_destination,
};
pub use providers::{get_provider, upsert_provider};
pub use sent::{mark_sent, prune_sent_before, was_sent, SentKey};
pub use time::{format_ts, parse_ts};
pub use watermarks::{advance_watermark, get_watermark};
