//! Conflict pairing
//!
//! A local action and a remote action on the same entity conflict when
//! their timestamps fall within the race window of each other. Pairing is
//! one-to-one: each action joins at most one pair, earliest candidates
//! first.

use chrono::Duration;
use tracing::debug;

use daybook_core::domain::action::{ActionOrigin, SyncAction};

/// Pairs unsynchronized local/remote actions inside the race window
///
/// `actions` may contain any mix of origins and synchronization states;
/// only unsynchronized ones participate. Returns `(local, remote)` pairs.
pub fn pair_conflicts(actions: &[SyncAction], window_secs: i64) -> Vec<(SyncAction, SyncAction)> {
    let window = Duration::seconds(window_secs);

    let locals: Vec<&SyncAction> = actions
        .iter()
        .filter(|a| !a.is_synchronized() && a.origin() == ActionOrigin::Local)
        .collect();
    let mut remotes: Vec<Option<&SyncAction>> = actions
        .iter()
        .filter(|a| !a.is_synchronized() && a.origin() == ActionOrigin::Remote)
        .map(Some)
        .collect();

    let mut pairs = Vec::new();
    for local in locals {
        let candidate = remotes.iter_mut().find(|slot| {
            slot.is_some_and(|remote| {
                remote.entity_id() == local.entity_id()
                    && (local.timestamp() - remote.timestamp()).abs() <= window
            })
        });
        if let Some(slot) = candidate {
            let remote = slot.take().expect("candidate slot is occupied");
            debug!(
                entity = %local.entity_id(),
                local_at = %local.timestamp(),
                remote_at = %remote.timestamp(),
                "Paired concurrent local/remote actions"
            );
            pairs.push((local.clone(), remote.clone()));
        }
    }
    pairs
}
