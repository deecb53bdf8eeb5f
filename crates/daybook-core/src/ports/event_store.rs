//! Persistent store port (driven/secondary port)
//!
//! The host application persists engine state through an abstract
//! key-value interface: opaque byte values under well-known keys. The
//! typed [`StateRepository`] wrapper owns serialization so the engine
//! crates never touch raw bytes.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, flat files, browser storage) and don't need domain-level
//!   classification.
//! - Each key is serialized independently, so a partial write failure
//!   never corrupts unrelated state.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::action::SyncAction;
use crate::domain::conflict::SyncConflict;
use crate::domain::event::{EventRecord, TaskRecord};
use crate::domain::newtypes::CalendarId;

/// Store key for event records
pub const KEY_EVENTS: &str = "sync/events";
/// Store key for task records
pub const KEY_TASKS: &str = "sync/tasks";
/// Store key for the action log
pub const KEY_ACTIONS: &str = "sync/actions";
/// Store key for the tombstone set
pub const KEY_TOMBSTONES: &str = "sync/tombstones";
/// Store key for sync settings
pub const KEY_SETTINGS: &str = "sync/settings";
/// Store key for manual conflicts awaiting operator review
pub const KEY_CONFLICTS: &str = "sync/conflicts";

// ============================================================================
// IEventStore trait
// ============================================================================

/// Port trait for the host's persistent key-value store
#[async_trait::async_trait]
pub trait IEventStore: Send + Sync {
    /// Reads the value stored under `key`, if any
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any previous value
    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()>;
}

// ============================================================================
// SyncSettings
// ============================================================================

/// Engine state persisted alongside the records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// When the last cycle completed successfully
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Mapping from tag name to the remote calendar it routes events into
    pub tag_calendar_map: HashMap<String, CalendarId>,
    /// Incremental index updates since the auditor's last full scan
    pub index_updates_since_full_scan: u32,
}

// ============================================================================
// StateRepository
// ============================================================================

/// Typed access to engine state on top of the raw key-value port
///
/// One serialized value per key; every load tolerates a missing key by
/// returning the empty default, so a fresh profile needs no migration.
#[derive(Clone)]
pub struct StateRepository {
    store: Arc<dyn IEventStore>,
}

impl StateRepository {
    /// Wraps a key-value store adapter
    pub fn new(store: Arc<dyn IEventStore>) -> Self {
        Self { store }
    }

    async fn load<T: for<'de> Deserialize<'de> + Default>(
        &self,
        key: &str,
    ) -> anyhow::Result<T> {
        match self.store.get(key).await.context("store read failed")? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).with_context(|| format!("corrupt value at {key}"))
            }
            None => Ok(T::default()),
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(value).context("serialize failed")?;
        self.store.put(key, bytes).await.context("store write failed")
    }

    /// Loads all event records
    pub async fn load_events(&self) -> anyhow::Result<Vec<EventRecord>> {
        self.load(KEY_EVENTS).await
    }

    /// Persists all event records
    pub async fn save_events(&self, events: &[EventRecord]) -> anyhow::Result<()> {
        self.save(KEY_EVENTS, &events).await
    }

    /// Loads all task records
    pub async fn load_tasks(&self) -> anyhow::Result<Vec<TaskRecord>> {
        self.load(KEY_TASKS).await
    }

    /// Persists all task records
    pub async fn save_tasks(&self, tasks: &[TaskRecord]) -> anyhow::Result<()> {
        self.save(KEY_TASKS, &tasks).await
    }

    /// Loads the action log
    pub async fn load_actions(&self) -> anyhow::Result<Vec<SyncAction>> {
        self.load(KEY_ACTIONS).await
    }

    /// Persists the action log
    pub async fn save_actions(&self, actions: &[SyncAction]) -> anyhow::Result<()> {
        self.save(KEY_ACTIONS, &actions).await
    }

    /// Loads the serialized tombstone ids (raw strings, ordered oldest first)
    pub async fn load_tombstones(&self) -> anyhow::Result<Vec<String>> {
        self.load(KEY_TOMBSTONES).await
    }

    /// Persists the tombstone ids
    pub async fn save_tombstones(&self, ids: &[String]) -> anyhow::Result<()> {
        self.save(KEY_TOMBSTONES, &ids).await
    }

    /// Loads the manual-review conflicts
    pub async fn load_conflicts(&self) -> anyhow::Result<Vec<SyncConflict>> {
        self.load(KEY_CONFLICTS).await
    }

    /// Persists the manual-review conflicts
    pub async fn save_conflicts(&self, conflicts: &[SyncConflict]) -> anyhow::Result<()> {
        self.save(KEY_CONFLICTS, &conflicts).await
    }

    /// Loads the sync settings
    pub async fn load_settings(&self) -> anyhow::Result<SyncSettings> {
        self.load(KEY_SETTINGS).await
    }

    /// Persists the sync settings
    pub async fn save_settings(&self, settings: &SyncSettings) -> anyhow::Result<()> {
        self.save(KEY_SETTINGS, settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Minimal in-memory store for exercising the typed wrapper
    #[derive(Default)]
    struct MemoryStore {
        values: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait::async_trait]
    impl IEventStore for MemoryStore {
        async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
            self.values.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_missing_keys_load_defaults() {
        let repo = StateRepository::new(Arc::new(MemoryStore::default()));
        assert!(repo.load_events().await.unwrap().is_empty());
        assert!(repo.load_actions().await.unwrap().is_empty());
        assert_eq!(repo.load_settings().await.unwrap(), SyncSettings::default());
    }

    #[tokio::test]
    async fn test_events_roundtrip() {
        let repo = StateRepository::new(Arc::new(MemoryStore::default()));
        let start = Utc::now();
        let event = EventRecord::new("Standup", "", start, start).unwrap();

        repo.save_events(&[event.clone()]).await.unwrap();
        let loaded = repo.load_events().await.unwrap();
        assert_eq!(loaded, vec![event]);
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let repo = StateRepository::new(Arc::new(MemoryStore::default()));
        let mut settings = SyncSettings::default();
        settings.tag_calendar_map.insert(
            "work".to_string(),
            CalendarId::new("cal_work".to_string()).unwrap(),
        );
        settings.index_updates_since_full_scan = 7;

        repo.save_settings(&settings).await.unwrap();
        assert_eq!(repo.load_settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_corrupt_value_is_an_error() {
        let store = Arc::new(MemoryStore::default());
        store
            .put(KEY_EVENTS, b"not json".to_vec())
            .await
            .unwrap();
        let repo = StateRepository::new(store);
        assert!(repo.load_events().await.is_err());
    }
}
