//! Edit leases
//!
//! A lease is a time-boxed local claim on an entity. While a lease is
//! active, remote-origin writes to the same entity are suppressed (they
//! stay queued and are re-evaluated after expiry), so a remote update
//! racing a local edit in flight cannot clobber it. Leases are the only
//! cross-cycle synchronization primitive in the engine.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use daybook_core::domain::newtypes::EntityId;

/// Per-entity time-boxed edit leases
#[derive(Debug, Clone)]
pub struct EditLeaseManager {
    leases: HashMap<EntityId, DateTime<Utc>>,
    ttl: Duration,
}

impl EditLeaseManager {
    /// Creates a manager granting leases of `ttl_secs` seconds
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            leases: HashMap::new(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Grants (or renews) a lease for the entity
    pub fn begin_edit(&mut self, entity: EntityId) {
        self.begin_edit_at(entity, Utc::now());
    }

    /// Grants (or renews) a lease anchored at `now`
    pub fn begin_edit_at(&mut self, entity: EntityId, now: DateTime<Utc>) {
        let expiry = now + self.ttl;
        debug!(%entity, %expiry, "Edit lease granted");
        self.leases.insert(entity, expiry);
    }

    /// Returns true if a live lease suppresses remote writes to the entity
    pub fn is_active(&self, entity: EntityId) -> bool {
        self.is_active_at(entity, Utc::now())
    }

    /// Returns true if the lease is live as of `now`
    pub fn is_active_at(&self, entity: EntityId, now: DateTime<Utc>) -> bool {
        match self.leases.get(&entity) {
            Some(expiry) => now < *expiry,
            None => false,
        }
    }

    /// Releases the lease explicitly (the local edit has been applied)
    pub fn clear(&mut self, entity: EntityId) {
        self.leases.remove(&entity);
    }

    /// Drops every expired lease
    pub fn purge_expired(&mut self) {
        self.purge_expired_at(Utc::now());
    }

    /// Drops every lease expired as of `now`
    pub fn purge_expired_at(&mut self, now: DateTime<Utc>) {
        self.leases.retain(|_, expiry| now < *expiry);
    }

    /// Number of leases currently held (live or not yet purged)
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    /// Returns true if no leases are held
    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::domain::newtypes::EventId;

    fn entity() -> EntityId {
        EventId::new().into()
    }

    #[test]
    fn test_fresh_lease_is_active() {
        let mut leases = EditLeaseManager::new(30);
        let e = entity();
        let now = Utc::now();
        leases.begin_edit_at(e, now);
        assert!(leases.is_active_at(e, now + Duration::seconds(10)));
    }

    #[test]
    fn test_lease_expires() {
        let mut leases = EditLeaseManager::new(30);
        let e = entity();
        let now = Utc::now();
        leases.begin_edit_at(e, now);
        assert!(!leases.is_active_at(e, now + Duration::seconds(31)));
    }

    #[test]
    fn test_unleased_entity_is_inactive() {
        let leases = EditLeaseManager::new(30);
        assert!(!leases.is_active_at(entity(), Utc::now()));
    }

    #[test]
    fn test_renewal_extends_expiry() {
        let mut leases = EditLeaseManager::new(30);
        let e = entity();
        let now = Utc::now();
        leases.begin_edit_at(e, now);
        leases.begin_edit_at(e, now + Duration::seconds(20));
        assert!(leases.is_active_at(e, now + Duration::seconds(45)));
    }

    #[test]
    fn test_clear_releases_immediately() {
        let mut leases = EditLeaseManager::new(30);
        let e = entity();
        let now = Utc::now();
        leases.begin_edit_at(e, now);
        leases.clear(e);
        assert!(!leases.is_active_at(e, now));
    }

    #[test]
    fn test_purge_drops_only_expired() {
        let mut leases = EditLeaseManager::new(30);
        let old = entity();
        let fresh = entity();
        let now = Utc::now();
        leases.begin_edit_at(old, now - Duration::seconds(60));
        leases.begin_edit_at(fresh, now);
        leases.purge_expired_at(now);
        assert_eq!(leases.len(), 1);
        assert!(leases.is_active_at(fresh, now));
    }
}
