//! Manual conflict queue
//!
//! Conflicts the resolver cannot decide automatically persist here until
//! an operator reviews them. The queue survives restarts through the
//! state repository; the engine never auto-applies anything it holds.

use tracing::info;
use uuid::Uuid;

use daybook_core::domain::conflict::SyncConflict;
use daybook_core::ports::event_store::StateRepository;

use crate::ConflictError;

/// Persistent queue of conflicts awaiting operator review
#[derive(Debug, Default)]
pub struct ManualConflictQueue {
    conflicts: Vec<SyncConflict>,
}

impl ManualConflictQueue {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the queue from the state repository
    pub async fn load(repo: &StateRepository) -> anyhow::Result<Self> {
        Ok(Self {
            conflicts: repo.load_conflicts().await?,
        })
    }

    /// Persists the queue to the state repository
    pub async fn persist(&self, repo: &StateRepository) -> Result<(), ConflictError> {
        repo.save_conflicts(&self.conflicts)
            .await
            .map_err(|e| ConflictError::PersistFailed(e.to_string()))
    }

    /// Parks a conflict for review
    pub fn push(&mut self, conflict: SyncConflict) {
        info!(
            conflict = %conflict.id(),
            entity = %conflict.local().entity_id(),
            strategy = %conflict.strategy(),
            "Conflict queued for manual review"
        );
        self.conflicts.push(conflict);
    }

    /// Lists the queued conflicts, oldest first
    pub fn list(&self) -> &[SyncConflict] {
        &self.conflicts
    }

    /// Removes and returns a conflict once the operator resolved it
    pub fn take(&mut self, id: Uuid) -> Result<SyncConflict, ConflictError> {
        let pos = self
            .conflicts
            .iter()
            .position(|c| c.id() == id)
            .ok_or(ConflictError::UnknownConflict(id))?;
        Ok(self.conflicts.remove(pos))
    }

    /// Number of queued conflicts
    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    /// Returns true if nothing awaits review
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::domain::action::{ActionKind, ActionOrigin, SyncAction};
    use daybook_core::domain::conflict::ResolutionStrategy;
    use daybook_core::domain::newtypes::{EntityId, EventId};

    fn conflict() -> SyncConflict {
        let entity: EntityId = EventId::new().into();
        let local = SyncAction::new(ActionOrigin::Local, ActionKind::Update, entity, None, None);
        let remote = SyncAction::new(ActionOrigin::Remote, ActionKind::Update, entity, None, None);
        SyncConflict::new(local, remote, ResolutionStrategy::Manual)
    }

    #[test]
    fn test_push_and_list() {
        let mut queue = ManualConflictQueue::new();
        assert!(queue.is_empty());
        queue.push(conflict());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_take_known_conflict() {
        let mut queue = ManualConflictQueue::new();
        let parked = conflict();
        let id = parked.id();
        queue.push(parked);

        let taken = queue.take(id).unwrap();
        assert_eq!(taken.id(), id);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_unknown_conflict_fails() {
        let mut queue = ManualConflictQueue::new();
        assert!(matches!(
            queue.take(Uuid::new_v4()),
            Err(ConflictError::UnknownConflict(_))
        ));
    }
}
