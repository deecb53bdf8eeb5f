//! Conflict domain entities
//!
//! A conflict pairs a local-origin action with a remote-origin action on
//! the same entity that happened inside the race window. Most conflicts
//! are resolved automatically by timestamp; manual conflicts persist in a
//! separate queue for operator review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::action::SyncAction;

/// How a conflict should be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The local action wins; the remote one is discarded
    LocalWins,
    /// The remote action wins; the local one is discarded
    RemoteWins,
    /// Merge both sides; declared but intentionally unimplemented
    Merge,
    /// Requires operator intervention via the manual queue
    Manual,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionStrategy::LocalWins => "local-wins",
            ResolutionStrategy::RemoteWins => "remote-wins",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

/// A paired local/remote conflict on one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Unique identifier for this conflict
    id: Uuid,
    /// The local-origin action
    local: SyncAction,
    /// The remote-origin action
    remote: SyncAction,
    /// The chosen resolution strategy
    strategy: ResolutionStrategy,
    /// When the pairing was detected
    detected_at: DateTime<Utc>,
}

impl SyncConflict {
    /// Creates a conflict from a paired local/remote action
    pub fn new(local: SyncAction, remote: SyncAction, strategy: ResolutionStrategy) -> Self {
        Self {
            id: Uuid::new_v4(),
            local,
            remote,
            strategy,
            detected_at: Utc::now(),
        }
    }

    /// Returns the conflict id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the local-origin action
    pub fn local(&self) -> &SyncAction {
        &self.local
    }

    /// Returns the remote-origin action
    pub fn remote(&self) -> &SyncAction {
        &self.remote
    }

    /// Returns the chosen strategy
    pub fn strategy(&self) -> ResolutionStrategy {
        self.strategy
    }

    /// Returns when the pairing was detected
    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Consumes the conflict, returning both actions
    pub fn into_actions(self) -> (SyncAction, SyncAction) {
        (self.local, self.remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::{ActionKind, ActionOrigin};
    use crate::domain::newtypes::EventId;

    #[test]
    fn test_strategy_display() {
        assert_eq!(ResolutionStrategy::LocalWins.to_string(), "local-wins");
        assert_eq!(ResolutionStrategy::RemoteWins.to_string(), "remote-wins");
        assert_eq!(ResolutionStrategy::Merge.to_string(), "merge");
        assert_eq!(ResolutionStrategy::Manual.to_string(), "manual");
    }

    #[test]
    fn test_conflict_holds_both_actions() {
        let entity: crate::domain::newtypes::EntityId = EventId::new().into();
        let local = SyncAction::new(ActionOrigin::Local, ActionKind::Update, entity, None, None);
        let remote = SyncAction::new(ActionOrigin::Remote, ActionKind::Update, entity, None, None);

        let conflict = SyncConflict::new(local.clone(), remote.clone(), ResolutionStrategy::LocalWins);
        assert_eq!(conflict.local().id(), local.id());
        assert_eq!(conflict.remote().id(), remote.id());
        assert_eq!(conflict.strategy(), ResolutionStrategy::LocalWins);
    }

    #[test]
    fn test_serde_roundtrip() {
        let entity: crate::domain::newtypes::EntityId = EventId::new().into();
        let local = SyncAction::new(ActionOrigin::Local, ActionKind::Update, entity, None, None);
        let remote = SyncAction::new(ActionOrigin::Remote, ActionKind::Update, entity, None, None);
        let conflict = SyncConflict::new(local, remote, ResolutionStrategy::Manual);

        let json = serde_json::to_string(&conflict).unwrap();
        let parsed: SyncConflict = serde_json::from_str(&json).unwrap();
        assert_eq!(conflict, parsed);
    }
}
