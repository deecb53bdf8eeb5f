//! Conflict resolution
//!
//! Picks a strategy for each paired conflict and reduces it to a
//! resolution outcome. Resolution is pure: the sync engine applies the
//! winning action through its normal applier path, so there is exactly
//! one code path that writes to either store.
//!
//! `Merge` is declared in the strategy enum but has no resolution logic;
//! a merge-tagged conflict is routed to the manual queue so nothing is
//! silently dropped.

use tracing::{info, warn};

use daybook_core::domain::action::SyncAction;
use daybook_core::domain::conflict::{ResolutionStrategy, SyncConflict};

use crate::pairing::pair_conflicts;

/// What the engine should do with a resolved conflict
#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
    /// Apply `winner`, discard `loser`
    Decided {
        /// The action to apply
        winner: SyncAction,
        /// The action to drop from the queue
        loser: SyncAction,
    },
    /// Park the conflict for operator review; both actions leave the queue
    Queued(SyncConflict),
}

/// Pairs and resolves conflicts for one sync cycle
pub struct ConflictResolver {
    window_secs: i64,
}

impl ConflictResolver {
    /// Creates a resolver with the given race window
    pub fn new(window_secs: i64) -> Self {
        Self { window_secs }
    }

    /// Picks the automatic strategy for a local/remote pair
    ///
    /// The newer mutation wins; ties go to the remote side, which keeps
    /// the engine convergent when both sides claim the same instant.
    pub fn select_strategy(local: &SyncAction, remote: &SyncAction) -> ResolutionStrategy {
        if local.timestamp() > remote.timestamp() {
            ResolutionStrategy::LocalWins
        } else {
            ResolutionStrategy::RemoteWins
        }
    }

    /// Pairs the given actions and resolves every conflict found
    pub fn resolve_all(&self, actions: &[SyncAction]) -> Vec<ResolutionOutcome> {
        pair_conflicts(actions, self.window_secs)
            .into_iter()
            .map(|(local, remote)| {
                let strategy = Self::select_strategy(&local, &remote);
                self.resolve(SyncConflict::new(local, remote, strategy))
            })
            .collect()
    }

    /// Reduces one conflict to an outcome according to its strategy
    pub fn resolve(&self, conflict: SyncConflict) -> ResolutionOutcome {
        let strategy = conflict.strategy();
        match strategy {
            ResolutionStrategy::LocalWins => {
                let (local, remote) = conflict.into_actions();
                info!(
                    entity = %local.entity_id(),
                    "Conflict resolved: local edit wins"
                );
                ResolutionOutcome::Decided {
                    winner: local,
                    loser: remote,
                }
            }
            ResolutionStrategy::RemoteWins => {
                let (local, remote) = conflict.into_actions();
                info!(
                    entity = %remote.entity_id(),
                    "Conflict resolved: remote edit wins"
                );
                ResolutionOutcome::Decided {
                    winner: remote,
                    loser: local,
                }
            }
            ResolutionStrategy::Merge => {
                // No merge implementation; park for the operator.
                warn!(
                    conflict = %conflict.id(),
                    "Merge strategy has no resolution logic; queuing for manual review"
                );
                ResolutionOutcome::Queued(conflict)
            }
            ResolutionStrategy::Manual => ResolutionOutcome::Queued(conflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use daybook_core::domain::action::{ActionKind, ActionOrigin};
    use daybook_core::domain::newtypes::{EntityId, EventId};

    fn action(origin: ActionOrigin, entity: EntityId, offset_secs: i64) -> SyncAction {
        let mut action = SyncAction::new(origin, ActionKind::Update, entity, None, None);
        action.set_timestamp(Utc::now() + Duration::seconds(offset_secs));
        action
    }

    #[test]
    fn test_newer_local_wins() {
        let entity: EntityId = EventId::new().into();
        let local = action(ActionOrigin::Local, entity, 10);
        let remote = action(ActionOrigin::Remote, entity, 0);
        assert_eq!(
            ConflictResolver::select_strategy(&local, &remote),
            ResolutionStrategy::LocalWins
        );
    }

    #[test]
    fn test_newer_remote_wins() {
        let entity: EntityId = EventId::new().into();
        let local = action(ActionOrigin::Local, entity, 0);
        let remote = action(ActionOrigin::Remote, entity, 10);
        assert_eq!(
            ConflictResolver::select_strategy(&local, &remote),
            ResolutionStrategy::RemoteWins
        );
    }

    #[test]
    fn test_tie_goes_remote() {
        let entity: EntityId = EventId::new().into();
        let stamp = Utc::now();
        let mut local = action(ActionOrigin::Local, entity, 0);
        let mut remote = action(ActionOrigin::Remote, entity, 0);
        local.set_timestamp(stamp);
        remote.set_timestamp(stamp);
        assert_eq!(
            ConflictResolver::select_strategy(&local, &remote),
            ResolutionStrategy::RemoteWins
        );
    }

    #[test]
    fn test_resolve_all_decides_paired_actions() {
        let entity: EntityId = EventId::new().into();
        let local = action(ActionOrigin::Local, entity, 30);
        let remote = action(ActionOrigin::Remote, entity, 0);

        let resolver = ConflictResolver::new(60);
        let outcomes = resolver.resolve_all(&[local.clone(), remote.clone()]);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            ResolutionOutcome::Decided { winner, loser } => {
                assert_eq!(winner.id(), local.id());
                assert_eq!(loser.id(), remote.id());
            }
            ResolutionOutcome::Queued(_) => panic!("expected a decided outcome"),
        }
    }

    #[test]
    fn test_merge_routes_to_manual_queue() {
        let entity: EntityId = EventId::new().into();
        let local = action(ActionOrigin::Local, entity, 0);
        let remote = action(ActionOrigin::Remote, entity, 1);
        let conflict = SyncConflict::new(local, remote, ResolutionStrategy::Merge);

        let resolver = ConflictResolver::new(60);
        assert!(matches!(
            resolver.resolve(conflict),
            ResolutionOutcome::Queued(_)
        ));
    }

    #[test]
    fn test_manual_is_never_auto_applied() {
        let entity: EntityId = EventId::new().into();
        let local = action(ActionOrigin::Local, entity, 0);
        let remote = action(ActionOrigin::Remote, entity, 1);
        let conflict = SyncConflict::new(local, remote, ResolutionStrategy::Manual);

        let resolver = ConflictResolver::new(60);
        assert!(matches!(
            resolver.resolve(conflict),
            ResolutionOutcome::Queued(_)
        ));
    }
}
