//! Action queue
//!
//! Ordered list of pending and processed synchronization intents. The
//! queue itself is append-only plus compaction: actions are recorded by
//! local mutations or the change detector, marked by the applier, and
//! removed once synchronized or once their retry budget is exhausted.
//!
//! Single-flight per entity is enforced by the cycle controller, not by
//! locking here.

use chrono::{DateTime, Utc};
use tracing::warn;

use daybook_core::domain::action::{
    ActionKind, ActionOrigin, ActionPayload, SyncAction, MAX_ACTION_RETRIES,
};
use daybook_core::domain::newtypes::{ActionId, EntityId};

/// The ordered synchronization action log
#[derive(Debug, Clone, Default)]
pub struct ActionQueue {
    actions: Vec<SyncAction>,
    last_changed: Option<DateTime<Utc>>,
}

impl ActionQueue {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a queue from persisted actions
    pub fn from_actions(actions: Vec<SyncAction>) -> Self {
        Self {
            actions,
            last_changed: None,
        }
    }

    /// Appends a new action built from its parts, returning its id
    pub fn record(
        &mut self,
        origin: ActionOrigin,
        kind: ActionKind,
        entity_id: EntityId,
        payload: Option<ActionPayload>,
        previous: Option<ActionPayload>,
    ) -> ActionId {
        let action = SyncAction::new(origin, kind, entity_id, payload, previous);
        let id = action.id();
        self.push(action);
        id
    }

    /// Appends a pre-built action (used by the change detector)
    pub fn push(&mut self, action: SyncAction) {
        self.actions.push(action);
        self.mark_changed();
    }

    /// Returns clones of the unsynchronized actions of one origin, in order
    pub fn drain_pending(&self, origin: ActionOrigin) -> Vec<SyncAction> {
        self.actions
            .iter()
            .filter(|a| !a.is_synchronized() && a.origin() == origin)
            .cloned()
            .collect()
    }

    /// Returns clones of all unsynchronized actions, in order
    pub fn pending(&self) -> Vec<SyncAction> {
        self.actions
            .iter()
            .filter(|a| !a.is_synchronized())
            .cloned()
            .collect()
    }

    /// Marks an action applied
    pub fn mark_synchronized(&mut self, id: ActionId) {
        if let Some(action) = self.actions.iter_mut().find(|a| a.id() == id) {
            action.mark_synchronized();
            self.mark_changed();
        }
    }

    /// Records a failed apply attempt; evicts the action once the retry
    /// budget is exhausted. Returns true if the action was evicted.
    pub fn record_failure(&mut self, id: ActionId) -> bool {
        let Some(pos) = self.actions.iter().position(|a| a.id() == id) else {
            return false;
        };
        self.actions[pos].record_failure();
        self.mark_changed();
        if self.actions[pos].retries_exhausted() {
            let action = self.actions.remove(pos);
            warn!(
                action_id = %action.id(),
                entity = %action.entity_id(),
                kind = %action.kind(),
                retries = MAX_ACTION_RETRIES,
                "Dropping action after exhausted retries"
            );
            return true;
        }
        false
    }

    /// Removes an action outright (used when a conflict pairing consumes it)
    pub fn remove(&mut self, id: ActionId) -> Option<SyncAction> {
        let pos = self.actions.iter().position(|a| a.id() == id)?;
        self.mark_changed();
        Some(self.actions.remove(pos))
    }

    /// Drops every synchronized action
    pub fn remove_synchronized(&mut self) -> usize {
        let before = self.actions.len();
        self.actions.retain(|a| !a.is_synchronized());
        let removed = before - self.actions.len();
        if removed > 0 {
            self.mark_changed();
        }
        removed
    }

    /// Number of unsynchronized actions of one origin
    pub fn pending_count(&self, origin: ActionOrigin) -> usize {
        self.actions
            .iter()
            .filter(|a| !a.is_synchronized() && a.origin() == origin)
            .count()
    }

    /// Total number of actions held (synchronized included)
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if the queue holds no actions
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// When the queue contents last changed in this process
    ///
    /// Used by the integrity auditor's queue-stability gate.
    pub fn last_changed(&self) -> Option<DateTime<Utc>> {
        self.last_changed
    }

    /// Returns all actions for persistence
    pub fn actions(&self) -> &[SyncAction] {
        &self.actions
    }

    fn mark_changed(&mut self) {
        self.last_changed = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::domain::newtypes::EventId;

    fn entity() -> EntityId {
        EventId::new().into()
    }

    fn queue_with_one(origin: ActionOrigin) -> (ActionQueue, ActionId) {
        let mut queue = ActionQueue::new();
        let id = queue.record(origin, ActionKind::Create, entity(), None, None);
        (queue, id)
    }

    #[test]
    fn test_record_and_drain() {
        let (queue, _) = queue_with_one(ActionOrigin::Local);
        assert_eq!(queue.drain_pending(ActionOrigin::Local).len(), 1);
        assert!(queue.drain_pending(ActionOrigin::Remote).is_empty());
    }

    #[test]
    fn test_mark_synchronized_removes_from_pending() {
        let (mut queue, id) = queue_with_one(ActionOrigin::Local);
        queue.mark_synchronized(id);
        assert!(queue.drain_pending(ActionOrigin::Local).is_empty());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.remove_synchronized(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_retry_cap_evicts_on_third_failure() {
        let (mut queue, id) = queue_with_one(ActionOrigin::Local);
        assert!(!queue.record_failure(id));
        assert!(!queue.record_failure(id));
        assert!(queue.record_failure(id));
        assert!(queue.is_empty());
        // A fourth failure finds nothing to retry
        assert!(!queue.record_failure(id));
    }

    #[test]
    fn test_remove_returns_action() {
        let (mut queue, id) = queue_with_one(ActionOrigin::Remote);
        let action = queue.remove(id).unwrap();
        assert_eq!(action.id(), id);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_last_changed_tracks_mutations() {
        let mut queue = ActionQueue::new();
        assert!(queue.last_changed().is_none());
        queue.record(ActionOrigin::Local, ActionKind::Update, entity(), None, None);
        assert!(queue.last_changed().is_some());
    }

    #[test]
    fn test_pending_preserves_order() {
        let mut queue = ActionQueue::new();
        let first = queue.record(ActionOrigin::Local, ActionKind::Create, entity(), None, None);
        let second = queue.record(ActionOrigin::Local, ActionKind::Update, entity(), None, None);
        let pending = queue.drain_pending(ActionOrigin::Local);
        assert_eq!(pending[0].id(), first);
        assert_eq!(pending[1].id(), second);
    }
}
