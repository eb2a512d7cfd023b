//! Pure decision logic for launchsync.
//!
//! Nothing in this crate performs I/O or reads the clock: every function
//! takes `now` explicitly, so the reconciliation loop and the tests drive
//! time. The modules are:
//!
//! - [`diff`]: field-level delta between a cached event and its fresh copy.
//! - [`policy`]: the status transition table deciding the notification class.
//! - [`allocator`]: per-destination target set under quota, plus the
//!   create/delete plan against the current mirrors.
//! - [`mirror`]: how a delta translates into an update of one calendar entry.
//! - [`countdown`]: which lead-time crossings are due in a scan window.

pub mod allocator;
pub mod countdown;
pub mod diff;
pub mod mirror;
pub mod policy;

pub use allocator::{plan_allocation, target_set, AllocationPlan};
pub use countdown::{due_countdowns, scan_lower_bound, CountdownHit};
pub use diff::{diff_events, DiffKind, EventDelta, EventDiff};
pub use mirror::{plan_mirror_action, MirrorAction, MirrorSettings};
pub use policy::{NotificationClass, TransitionPolicy, DEFAULT_WINDOW_DAYS};
