//! Outbound notification port (driven/secondary port)
//!
//! Fire-and-forget broadcasts consumed by UI collaborators. The sync
//! engine never waits for listeners, so the trait is synchronous;
//! adapters that need async delivery spawn their own tasks.

use chrono::{DateTime, Utc};

use crate::domain::action::ActionKind;

/// Port trait for sync-engine broadcasts
///
/// ## Implementation Notes
///
/// - Calls must return quickly and must not fail the caller; adapters
///   swallow delivery errors.
/// - `local_events_changed` fires once per batch, not once per record.
pub trait ISyncNotifier: Send + Sync {
    /// A sync cycle started
    fn sync_started(&self, is_full_sync: bool);

    /// A sync cycle finished
    fn sync_completed(&self, timestamp: DateTime<Utc>, duration_ms: u64);

    /// Remote-origin applies changed local records
    fn local_events_changed(&self, action: ActionKind, count: usize);
}

/// Notifier that drops every broadcast
///
/// Useful for tests and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl ISyncNotifier for NullNotifier {
    fn sync_started(&self, _is_full_sync: bool) {}
    fn sync_completed(&self, _timestamp: DateTime<Utc>, _duration_ms: u64) {}
    fn local_events_changed(&self, _action: ActionKind, _count: usize) {}
}
