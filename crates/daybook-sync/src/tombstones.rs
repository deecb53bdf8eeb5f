//! Tombstone set
//!
//! Bounded set of recently-deleted external ids. A stale remote fetch
//! window can still return an event the user already deleted locally; the
//! tombstone set suppresses its resurrection. Every deletion records both
//! the raw and the locally-prefixed spelling of the id, since remote
//! echoes may use either.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use daybook_core::domain::newtypes::ExternalId;

/// FIFO-bounded set of deleted external ids
#[derive(Debug, Clone)]
pub struct TombstoneSet {
    order: VecDeque<ExternalId>,
    members: HashSet<ExternalId>,
    cap: usize,
}

impl TombstoneSet {
    /// Creates an empty set evicting oldest entries beyond `cap`
    pub fn new(cap: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            cap: cap.max(1),
        }
    }

    /// Records a deletion under both spellings of the id
    pub fn insert(&mut self, id: &ExternalId) {
        self.insert_one(id.normalized());
        self.insert_one(id.prefixed());
    }

    fn insert_one(&mut self, id: ExternalId) {
        if self.members.contains(&id) {
            return;
        }
        while self.order.len() >= self.cap {
            if let Some(evicted) = self.order.pop_front() {
                debug!(id = %evicted, "Tombstone evicted (cap reached)");
                self.members.remove(&evicted);
            }
        }
        self.order.push_back(id.clone());
        self.members.insert(id);
    }

    /// Returns true if the id (either spelling) has been deleted
    pub fn contains(&self, id: &ExternalId) -> bool {
        self.members.contains(&id.normalized()) || self.members.contains(&id.prefixed())
    }

    /// Number of tombstones currently held
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no tombstones are held
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Serializes to raw id strings, oldest first
    pub fn to_raw(&self) -> Vec<String> {
        self.order.iter().map(|id| id.as_str().to_string()).collect()
    }

    /// Restores from raw id strings, oldest first
    ///
    /// Invalid (empty) ids are skipped; the cap applies as usual.
    pub fn from_raw(cap: usize, raw: &[String]) -> Self {
        let mut set = Self::new(cap);
        for id in raw {
            if let Ok(parsed) = ExternalId::new(id.clone()) {
                set.insert_one(parsed);
            }
        }
        set
    }
}
