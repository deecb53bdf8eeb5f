//! Engine-owned state
//!
//! One struct owns the records, settings, and derived index, so every
//! store mutation and its index maintenance go through a single place.
//! There are no module-level statics; the cycle controller holds the one
//! instance per process.

use anyhow::Context;
use tracing::debug;

use daybook_core::domain::event::{EventRecord, TaskRecord};
use daybook_core::domain::index::EventIndex;
use daybook_core::domain::newtypes::{EventId, TaskId};
use daybook_core::ports::event_store::{StateRepository, SyncSettings};

/// Records, settings, and the derived index, mutated in lock-step
#[derive(Debug, Default)]
pub struct EngineState {
    events: Vec<EventRecord>,
    tasks: Vec<TaskRecord>,
    /// Persisted engine settings (last sync, tag mapping, audit counters)
    pub settings: SyncSettings,
    index: EventIndex,
}

impl EngineState {
    /// Loads all persisted state and rebuilds the index from it
    pub async fn load(repo: &StateRepository) -> anyhow::Result<Self> {
        let events = repo.load_events().await.context("load events")?;
        let tasks = repo.load_tasks().await.context("load tasks")?;
        let settings = repo.load_settings().await.context("load settings")?;

        let mut index = EventIndex::new();
        index.rebuild(&events);
        debug!(events = events.len(), tasks = tasks.len(), "Engine state loaded");

        Ok(Self {
            events,
            tasks,
            settings,
            index,
        })
    }

    /// Persists records and settings back to the store
    pub async fn persist(&self, repo: &StateRepository) -> anyhow::Result<()> {
        repo.save_events(&self.events).await.context("save events")?;
        repo.save_tasks(&self.tasks).await.context("save tasks")?;
        repo.save_settings(&self.settings)
            .await
            .context("save settings")
    }

    /// Read access to the derived index
    pub fn index(&self) -> &EventIndex {
        &self.index
    }

    /// All event records
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// All task records
    pub fn tasks(&self) -> &[TaskRecord] {
        &self.tasks
    }

    /// Looks up one event record
    pub fn event(&self, id: EventId) -> Option<&EventRecord> {
        self.events.iter().find(|e| e.id() == id)
    }

    /// Looks up one task record
    pub fn task(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    /// Inserts or replaces an event record, maintaining the index
    pub fn upsert_event(&mut self, record: EventRecord) {
        self.index.upsert(&record);
        match self.events.iter_mut().find(|e| e.id() == record.id()) {
            Some(slot) => *slot = record,
            None => self.events.push(record),
        }
        self.note_index_update();
    }

    /// Removes an event record, maintaining the index
    pub fn remove_event(&mut self, id: EventId) -> Option<EventRecord> {
        let pos = self.events.iter().position(|e| e.id() == id)?;
        self.index.remove(id);
        self.note_index_update();
        Some(self.events.remove(pos))
    }

    /// Applies a closure to one event record and reindexes it
    ///
    /// Returns false if the record does not exist. This is the only
    /// mutable access to stored events, so an edit can never bypass the
    /// index.
    pub fn modify_event<F: FnOnce(&mut EventRecord)>(&mut self, id: EventId, f: F) -> bool {
        let Some(record) = self.events.iter_mut().find(|e| e.id() == id) else {
            return false;
        };
        f(record);
        let snapshot = record.clone();
        self.index.upsert(&snapshot);
        self.note_index_update();
        true
    }

    /// Inserts or replaces a task record
    pub fn upsert_task(&mut self, record: TaskRecord) {
        match self.tasks.iter_mut().find(|t| t.id() == record.id()) {
            Some(slot) => *slot = record,
            None => self.tasks.push(record),
        }
    }

    /// Removes a task record
    pub fn remove_task(&mut self, id: TaskId) -> Option<TaskRecord> {
        let pos = self.tasks.iter().position(|t| t.id() == id)?;
        Some(self.tasks.remove(pos))
    }

    /// Rebuilds the index from scratch
    pub fn rebuild_index(&mut self) {
        self.index.rebuild(&self.events);
    }

    /// Split borrow for the integrity auditor: records plus mutable index
    pub fn audit_parts(&mut self) -> (&[EventRecord], &mut EventIndex) {
        (&self.events, &mut self.index)
    }

    fn note_index_update(&mut self) {
        self.settings.index_updates_since_full_scan =
            self.settings.index_updates_since_full_scan.saturating_add(1);
    }
}
