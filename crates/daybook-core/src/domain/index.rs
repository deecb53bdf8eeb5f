//! In-memory event index
//!
//! Hash-map lookup from both local id and (normalized) external id to the
//! current event record. The index is derived, non-authoritative state:
//! always rebuildable from the persistent store, kept current between
//! rebuilds only through matched [`EventIndex::upsert`] /
//! [`EventIndex::remove`] calls that must bracket every store mutation.
//!
//! The index is never partially updated: either a full rebuild or a
//! matched insert+delete pair, never a single-sided leak. Tests assert
//! that incremental maintenance matches a from-scratch rebuild.

use std::collections::HashMap;

use super::event::EventRecord;
use super::newtypes::{EventId, ExternalId};

/// Dual-keyed lookup over the current event records
#[derive(Debug, Clone, Default)]
pub struct EventIndex {
    by_id: HashMap<EventId, EventRecord>,
    by_external: HashMap<ExternalId, EventId>,
}

impl EventIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards all entries and rebuilds from the full record set
    pub fn rebuild(&mut self, records: &[EventRecord]) {
        self.by_id.clear();
        self.by_external.clear();
        for record in records {
            self.upsert(record);
        }
    }

    /// Inserts or replaces a single record
    ///
    /// Clears the previous external-id mapping first so a changed or
    /// removed external id never leaves a dangling entry.
    pub fn upsert(&mut self, record: &EventRecord) {
        if let Some(old) = self.by_id.get(&record.id()) {
            if let Some(old_ext) = old.external_id() {
                let key = old_ext.normalized();
                // Duplicate records can share an external id; only drop a
                // mapping this record actually owns.
                if self.by_external.get(&key) == Some(&record.id()) {
                    self.by_external.remove(&key);
                }
            }
        }
        if let Some(ext) = record.external_id() {
            self.by_external.insert(ext.normalized(), record.id());
        }
        self.by_id.insert(record.id(), record.clone());
    }

    /// Removes a single record, clearing both mappings
    pub fn remove(&mut self, id: EventId) -> Option<EventRecord> {
        let record = self.by_id.remove(&id)?;
        if let Some(ext) = record.external_id() {
            let key = ext.normalized();
            if self.by_external.get(&key) == Some(&id) {
                self.by_external.remove(&key);
            }
        }
        Some(record)
    }

    /// Looks up a record by local id
    pub fn get(&self, id: EventId) -> Option<&EventRecord> {
        self.by_id.get(&id)
    }

    /// Looks up a record by external id (either spelling)
    pub fn get_by_external(&self, external_id: &ExternalId) -> Option<&EventRecord> {
        let local_id = self.by_external.get(&external_id.normalized())?;
        self.by_id.get(local_id)
    }

    /// Iterates over all indexed records
    pub fn records(&self) -> impl Iterator<Item = &EventRecord> {
        self.by_id.values()
    }

    /// Returns the number of indexed records
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true if the index is empty
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Returns true if any indexed record has been synced at least once
    pub fn has_synced_records(&self) -> bool {
        self.by_id.values().any(|r| r.external_id().is_some())
    }

    /// Checks both maps against what a rebuild from `records` would hold
    ///
    /// Used by the integrity auditor and by tests; returns the local ids
    /// whose entries drifted.
    pub fn drift_from(&self, records: &[EventRecord]) -> Vec<EventId> {
        let mut fresh = EventIndex::new();
        fresh.rebuild(records);

        let mut drifted = Vec::new();
        for record in records {
            if self.by_id.get(&record.id()) != Some(record) {
                drifted.push(record.id());
                continue;
            }
            if let Some(ext) = record.external_id() {
                if self.by_external.get(&ext.normalized()) != Some(&record.id()) {
                    drifted.push(record.id());
                }
            }
        }
        for id in self.by_id.keys() {
            if fresh.by_id.get(id).is_none() {
                drifted.push(*id);
            }
        }
        drifted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::domain::newtypes::CalendarId;

    fn event(title: &str) -> EventRecord {
        let start = Utc::now();
        EventRecord::new(title, "", start, start + Duration::hours(1)).unwrap()
    }

    fn synced_event(title: &str, external: &str) -> EventRecord {
        let mut record = event(title);
        record.set_remote_identity(
            ExternalId::new(external.to_string()).unwrap(),
            CalendarId::new("primary".to_string()).unwrap(),
        );
        record
    }

    #[test]
    fn test_upsert_and_get() {
        let mut index = EventIndex::new();
        let record = event("Standup");
        index.upsert(&record);
        assert_eq!(index.get(record.id()), Some(&record));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_external_lookup_normalizes() {
        let mut index = EventIndex::new();
        let record = synced_event("Standup", "evt_1");
        index.upsert(&record);

        let raw = ExternalId::new("evt_1".to_string()).unwrap();
        let prefixed = ExternalId::new("daybook-evt_1".to_string()).unwrap();
        assert_eq!(index.get_by_external(&raw), Some(&record));
        assert_eq!(index.get_by_external(&prefixed), Some(&record));
    }

    #[test]
    fn test_remove_clears_both_maps() {
        let mut index = EventIndex::new();
        let record = synced_event("Standup", "evt_1");
        index.upsert(&record);
        index.remove(record.id());

        assert!(index.get(record.id()).is_none());
        let ext = ExternalId::new("evt_1".to_string()).unwrap();
        assert!(index.get_by_external(&ext).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_upsert_changed_external_id_leaves_no_leak() {
        let mut index = EventIndex::new();
        let mut record = synced_event("Standup", "evt_old");
        index.upsert(&record);

        record.set_remote_identity(
            ExternalId::new("evt_new".to_string()).unwrap(),
            CalendarId::new("primary".to_string()).unwrap(),
        );
        index.upsert(&record);

        let old = ExternalId::new("evt_old".to_string()).unwrap();
        let new = ExternalId::new("evt_new".to_string()).unwrap();
        assert!(index.get_by_external(&old).is_none());
        assert_eq!(index.get_by_external(&new), Some(&record));
    }

    #[test]
    fn test_incremental_matches_rebuild() {
        let records = vec![
            synced_event("a", "evt_a"),
            synced_event("b", "evt_b"),
            event("c"),
        ];

        let mut incremental = EventIndex::new();
        for record in &records {
            incremental.upsert(record);
        }

        assert!(incremental.drift_from(&records).is_empty());
    }

    #[test]
    fn test_drift_detected_after_stale_entry() {
        let mut records = vec![synced_event("a", "evt_a")];
        let mut index = EventIndex::new();
        index.rebuild(&records);

        // Mutate the store without telling the index
        records[0].set_title("renamed");
        let drifted = index.drift_from(&records);
        assert_eq!(drifted, vec![records[0].id()]);
    }

    #[test]
    fn test_drift_detects_orphan_index_entry() {
        let records = vec![synced_event("a", "evt_a")];
        let mut index = EventIndex::new();
        index.rebuild(&records);

        // Store lost the record, index still has it
        let drifted = index.drift_from(&[]);
        assert_eq!(drifted, vec![records[0].id()]);
    }

    #[test]
    fn test_has_synced_records() {
        let mut index = EventIndex::new();
        index.upsert(&event("local"));
        assert!(!index.has_synced_records());
        index.upsert(&synced_event("remote", "evt_r"));
        assert!(index.has_synced_records());
    }
}
