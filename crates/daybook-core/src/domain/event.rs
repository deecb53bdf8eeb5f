//! Event and task domain entities
//!
//! The [`EventRecord`] is the canonical entity of the sync engine: the
//! local persistent store owns it, and during a sync cycle the action
//! applier is its only writer.
//!
//! ## Sync status
//!
//! ```text
//!   LocalOnly ──record──► Pending ──apply──► Synced
//!                            ▲                 │
//!                            └──local edit─────┤
//!                                              ▼
//!                                          Conflict ──resolve──► Synced
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;
use super::newtypes::{CalendarId, EventId, ExternalId, TaskId};

/// Marker prepended to an event title when a sync apply failed in a way
/// that needs the user's attention.
pub const CONFLICT_TITLE_MARKER: &str = "[sync conflict] ";

// ============================================================================
// SyncStatus
// ============================================================================

/// Synchronization status of a local record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Never synced; the remote service knows nothing about this record
    #[default]
    LocalOnly,
    /// A sync action for this record is queued but not yet applied
    Pending,
    /// Local and remote agree as of the last apply
    Synced,
    /// A sync apply failed in a user-visible way; needs attention
    Conflict,
}

impl SyncStatus {
    /// Returns true if the record has ever been seen by the remote service
    pub fn is_remote_known(&self) -> bool {
        matches!(self, SyncStatus::Synced | SyncStatus::Conflict)
    }

    /// Returns true if the record needs user attention
    pub fn needs_attention(&self) -> bool {
        matches!(self, SyncStatus::Conflict)
    }

    /// Returns the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            SyncStatus::LocalOnly => "LocalOnly",
            SyncStatus::Pending => "Pending",
            SyncStatus::Synced => "Synced",
            SyncStatus::Conflict => "Conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::LocalOnly => write!(f, "local-only"),
            SyncStatus::Pending => write!(f, "pending"),
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::Conflict => write!(f, "conflict"),
        }
    }
}

// ============================================================================
// EventRecord
// ============================================================================

/// A calendar event as stored locally
///
/// The description may carry a trailing machine-generated provenance block;
/// see [`crate::domain::annotation`] for how it is parsed and stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Local identifier, assigned at creation
    id: EventId,
    /// Remote-assigned identifier; `None` until the first successful sync
    external_id: Option<ExternalId>,
    /// Remote calendar the event lives in; `None` until the first sync
    calendar_id: Option<CalendarId>,
    /// Event title
    title: String,
    /// Event description, possibly with a trailing provenance block
    description: String,
    /// Start of the event
    start: DateTime<Utc>,
    /// End of the event
    end: DateTime<Utc>,
    /// Whether the event spans whole days rather than a time range
    all_day: bool,
    /// User-assigned tags; may map to remote calendars
    tags: Vec<String>,
    /// Current synchronization status
    sync_status: SyncStatus,
    /// When this record last finished a successful apply
    synchronized_at: Option<DateTime<Utc>>,
    /// When the record was created locally
    created_at: DateTime<Utc>,
    /// When the record was last modified locally
    updated_at: DateTime<Utc>,
}

impl EventRecord {
    /// Creates a new local-only event
    ///
    /// # Errors
    /// Returns [`DomainError::InvertedTimeRange`] if `end < start`.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if end < start {
            return Err(DomainError::InvertedTimeRange(format!(
                "{start} .. {end}"
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: EventId::new(),
            external_id: None,
            calendar_id: None,
            title: title.into(),
            description: description.into(),
            start,
            end,
            all_day: false,
            tags: Vec::new(),
            sync_status: SyncStatus::LocalOnly,
            synchronized_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Creates a record for an event first seen on the remote side
    ///
    /// The caller supplies the local id so the sync action that produced
    /// the record and the record itself share one entity id.
    ///
    /// # Errors
    /// Returns [`DomainError::InvertedTimeRange`] if `end < start`.
    pub fn from_remote(
        id: EventId,
        title: impl Into<String>,
        description: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let mut record = Self::new(title, description, start, end)?;
        record.id = id;
        Ok(record)
    }

    // --- Getters ---

    /// Returns the local id
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Returns the remote-assigned id, if synced
    pub fn external_id(&self) -> Option<&ExternalId> {
        self.external_id.as_ref()
    }

    /// Returns the remote calendar id, if synced
    pub fn calendar_id(&self) -> Option<&CalendarId> {
        self.calendar_id.as_ref()
    }

    /// Returns the title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the description (including any provenance block)
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the start time
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Returns the end time
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns whether the event is all-day
    pub fn is_all_day(&self) -> bool {
        self.all_day
    }

    /// Returns the tags
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the sync status
    pub fn sync_status(&self) -> &SyncStatus {
        &self.sync_status
    }

    /// Returns when the record last finished a successful apply
    pub fn synchronized_at(&self) -> Option<DateTime<Utc>> {
        self.synchronized_at
    }

    /// Returns when the record was created locally
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the record was last modified locally
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // --- Setters ---

    /// Sets the title and bumps `updated_at`
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touch();
    }

    /// Sets the description and bumps `updated_at`
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.touch();
    }

    /// Sets the time range and bumps `updated_at`
    ///
    /// # Errors
    /// Returns [`DomainError::InvertedTimeRange`] if `end < start`.
    pub fn set_times(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if end < start {
            return Err(DomainError::InvertedTimeRange(format!(
                "{start} .. {end}"
            )));
        }
        self.start = start;
        self.end = end;
        self.touch();
        Ok(())
    }

    /// Sets the all-day flag
    pub fn set_all_day(&mut self, all_day: bool) {
        self.all_day = all_day;
        self.touch();
    }

    /// Replaces the tag list and bumps `updated_at`
    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = tags;
        self.touch();
    }

    /// Sets the remote identity (external id + calendar) after an apply
    pub fn set_remote_identity(&mut self, external_id: ExternalId, calendar_id: CalendarId) {
        self.external_id = Some(external_id);
        self.calendar_id = Some(calendar_id);
    }

    /// Clears the remote identity (used during calendar migration)
    pub fn clear_remote_identity(&mut self) {
        self.external_id = None;
        self.calendar_id = None;
    }

    /// Bumps the local modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // --- Status transitions ---

    /// Checks whether a sync-status transition is valid
    ///
    /// Valid transitions:
    /// - LocalOnly -> Pending
    /// - Pending -> Synced, Conflict
    /// - Synced -> Pending, Conflict
    /// - Conflict -> Pending, Synced (after resolution)
    pub fn can_transition_to(&self, target: &SyncStatus) -> bool {
        match (&self.sync_status, target) {
            (SyncStatus::LocalOnly, SyncStatus::Pending) => true,
            (SyncStatus::Pending, SyncStatus::Synced) => true,
            (SyncStatus::Pending, SyncStatus::Conflict) => true,
            (SyncStatus::Synced, SyncStatus::Pending) => true,
            (SyncStatus::Synced, SyncStatus::Conflict) => true,
            (SyncStatus::Conflict, SyncStatus::Pending) => true,
            (SyncStatus::Conflict, SyncStatus::Synced) => true,
            _ => false,
        }
    }

    /// Attempts a sync-status transition
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidStatus`] if the transition is not allowed.
    pub fn transition_to(&mut self, target: SyncStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(&target) {
            return Err(DomainError::InvalidStatus {
                from: self.sync_status.name().to_string(),
                to: target.name().to_string(),
            });
        }
        self.sync_status = target;
        Ok(())
    }

    /// Marks a queued action for this record
    pub fn mark_pending(&mut self) -> Result<(), DomainError> {
        self.transition_to(SyncStatus::Pending)
    }

    /// Marks a completed apply and records the time
    pub fn mark_synced(&mut self) -> Result<(), DomainError> {
        self.transition_to(SyncStatus::Synced)?;
        self.synchronized_at = Some(Utc::now());
        Ok(())
    }

    /// Marks a user-visible sync failure, prefixing the title once
    pub fn mark_conflict(&mut self) -> Result<(), DomainError> {
        self.transition_to(SyncStatus::Conflict)?;
        if !self.title.starts_with(CONFLICT_TITLE_MARKER) {
            self.title = format!("{CONFLICT_TITLE_MARKER}{}", self.title);
        }
        Ok(())
    }
}

// ============================================================================
// TaskRecord
// ============================================================================

/// A task record
///
/// Tasks share the action queue, notifications, and conflict pairing with
/// events, but are local-only: they have no remote calendar representation
/// and the applier completes their actions without remote calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Local identifier
    id: TaskId,
    /// Task title
    title: String,
    /// Optional due date
    due: Option<DateTime<Utc>>,
    /// Whether the task is completed
    completed: bool,
    /// User-assigned tags
    tags: Vec<String>,
    /// When the record was created locally
    created_at: DateTime<Utc>,
    /// When the record was last modified locally
    updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Creates a new task
    pub fn new(title: impl Into<String>, due: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            title: title.into(),
            due,
            completed: false,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the local id
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the due date
    pub fn due(&self) -> Option<DateTime<Utc>> {
        self.due
    }

    /// Returns whether the task is completed
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Returns the tags
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Marks the task completed
    pub fn complete(&mut self) {
        self.completed = true;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_event() -> EventRecord {
        let start = Utc::now();
        EventRecord::new("Standup", "Daily standup", start, start + Duration::minutes(30))
            .unwrap()
    }

    mod sync_status_tests {
        use super::*;

        #[test]
        fn test_default_is_local_only() {
            assert_eq!(SyncStatus::default(), SyncStatus::LocalOnly);
        }

        #[test]
        fn test_is_remote_known() {
            assert!(!SyncStatus::LocalOnly.is_remote_known());
            assert!(!SyncStatus::Pending.is_remote_known());
            assert!(SyncStatus::Synced.is_remote_known());
            assert!(SyncStatus::Conflict.is_remote_known());
        }

        #[test]
        fn test_display() {
            assert_eq!(SyncStatus::LocalOnly.to_string(), "local-only");
            assert_eq!(SyncStatus::Conflict.to_string(), "conflict");
        }
    }

    mod event_record_tests {
        use super::*;

        #[test]
        fn test_new_starts_local_only() {
            let event = sample_event();
            assert_eq!(*event.sync_status(), SyncStatus::LocalOnly);
            assert!(event.external_id().is_none());
            assert!(event.calendar_id().is_none());
        }

        #[test]
        fn test_inverted_range_rejected() {
            let start = Utc::now();
            let result = EventRecord::new("x", "", start, start - Duration::minutes(1));
            assert!(matches!(result, Err(DomainError::InvertedTimeRange(_))));
        }

        #[test]
        fn test_status_flow() {
            let mut event = sample_event();
            event.mark_pending().unwrap();
            assert_eq!(*event.sync_status(), SyncStatus::Pending);
            event.mark_synced().unwrap();
            assert_eq!(*event.sync_status(), SyncStatus::Synced);
            assert!(event.synchronized_at().is_some());
        }

        #[test]
        fn test_cannot_sync_from_local_only() {
            let mut event = sample_event();
            assert!(event.mark_synced().is_err());
        }

        #[test]
        fn test_conflict_marks_title_once() {
            let mut event = sample_event();
            event.mark_pending().unwrap();
            event.mark_conflict().unwrap();
            assert!(event.title().starts_with(CONFLICT_TITLE_MARKER));

            // A second conflict pass must not stack markers
            event.transition_to(SyncStatus::Pending).unwrap();
            event.mark_conflict().unwrap();
            let marker_count = event.title().matches("[sync conflict]").count();
            assert_eq!(marker_count, 1);
        }

        #[test]
        fn test_set_remote_identity() {
            let mut event = sample_event();
            let ext = ExternalId::new("evt_1".to_string()).unwrap();
            let cal = CalendarId::new("primary".to_string()).unwrap();
            event.set_remote_identity(ext.clone(), cal.clone());
            assert_eq!(event.external_id(), Some(&ext));
            assert_eq!(event.calendar_id(), Some(&cal));

            event.clear_remote_identity();
            assert!(event.external_id().is_none());
        }

        #[test]
        fn test_serialization_roundtrip() {
            let event = sample_event();
            let json = serde_json::to_string(&event).unwrap();
            let parsed: EventRecord = serde_json::from_str(&json).unwrap();
            assert_eq!(event, parsed);
        }
    }

    mod task_record_tests {
        use super::*;

        #[test]
        fn test_complete() {
            let mut task = TaskRecord::new("Buy milk", None);
            assert!(!task.is_completed());
            task.complete();
            assert!(task.is_completed());
        }

        #[test]
        fn test_serialization_roundtrip() {
            let task = TaskRecord::new("Buy milk", Some(Utc::now()));
            let json = serde_json::to_string(&task).unwrap();
            let parsed: TaskRecord = serde_json::from_str(&json).unwrap();
            assert_eq!(task, parsed);
        }
    }
}
