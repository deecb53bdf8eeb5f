//! Sync action model
//!
//! A [`SyncAction`] is an ordered synchronization intent: something that
//! happened on one side (local or remote) and must be applied to the
//! other. Actions are created by local mutations or by the change
//! detector, mutated only by the applier, and removed once synchronized
//! or once their retry budget is exhausted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::event::{EventRecord, TaskRecord};
use super::newtypes::{ActionId, CalendarId, EntityId, ExternalId};

/// Maximum apply attempts before an action is dropped from the queue
pub const MAX_ACTION_RETRIES: u32 = 3;

// ============================================================================
// ActionKind / ActionOrigin
// ============================================================================

/// What the action does to the opposite store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Create the entity on the opposite side
    Create,
    /// Update the entity on the opposite side
    Update,
    /// Delete the entity on the opposite side
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Create => write!(f, "create"),
            ActionKind::Update => write!(f, "update"),
            ActionKind::Delete => write!(f, "delete"),
        }
    }
}

/// Which side produced the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOrigin {
    /// A local mutation; the applier pushes it to the remote service
    Local,
    /// Detected in a remote fetch; the applier writes it into the local store
    Remote,
}

impl ActionOrigin {
    /// Returns the opposite origin
    pub fn opposite(self) -> Self {
        match self {
            ActionOrigin::Local => ActionOrigin::Remote,
            ActionOrigin::Remote => ActionOrigin::Local,
        }
    }
}

impl fmt::Display for ActionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOrigin::Local => write!(f, "local"),
            ActionOrigin::Remote => write!(f, "remote"),
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Snapshot of an event's syncable fields at the time the action was recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Event title
    pub title: String,
    /// Event description (annotations included as stored)
    pub description: String,
    /// Start of the event
    pub start: DateTime<Utc>,
    /// End of the event
    pub end: DateTime<Utc>,
    /// Whether the event spans whole days
    pub all_day: bool,
    /// Tags at snapshot time; drive calendar resolution
    pub tags: Vec<String>,
    /// Explicit calendar at snapshot time, if any
    pub calendar_id: Option<CalendarId>,
    /// External id at snapshot time, if any
    pub external_id: Option<ExternalId>,
}

impl EventPayload {
    /// Builds a payload snapshot from a local record
    pub fn from_record(record: &EventRecord) -> Self {
        Self {
            title: record.title().to_string(),
            description: record.description().to_string(),
            start: record.start(),
            end: record.end(),
            all_day: record.is_all_day(),
            tags: record.tags().to_vec(),
            calendar_id: record.calendar_id().cloned(),
            external_id: record.external_id().cloned(),
        }
    }
}

/// Snapshot of a task's fields at the time the action was recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Task title
    pub title: String,
    /// Optional due date
    pub due: Option<DateTime<Utc>>,
    /// Whether the task is completed
    pub completed: bool,
    /// Tags at snapshot time
    pub tags: Vec<String>,
}

impl TaskPayload {
    /// Builds a payload snapshot from a local record
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            title: record.title().to_string(),
            due: record.due(),
            completed: record.is_completed(),
            tags: record.tags().to_vec(),
        }
    }
}

/// Closed tagged union of per-entity-kind payloads
///
/// Replaces the untyped payloads the queue would otherwise carry; the
/// variant set is closed so payload shape cannot drift silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
    /// An event snapshot
    Event(EventPayload),
    /// A task snapshot
    Task(TaskPayload),
}

impl ActionPayload {
    /// Returns the event payload, if this is an event action
    pub fn as_event(&self) -> Option<&EventPayload> {
        match self {
            ActionPayload::Event(p) => Some(p),
            ActionPayload::Task(_) => None,
        }
    }

    /// Returns the task payload, if this is a task action
    pub fn as_task(&self) -> Option<&TaskPayload> {
        match self {
            ActionPayload::Task(p) => Some(p),
            ActionPayload::Event(_) => None,
        }
    }
}

// ============================================================================
// SyncAction
// ============================================================================

/// A pending or processed synchronization intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAction {
    /// Unique identifier for this action
    id: ActionId,
    /// What to do on the opposite side
    kind: ActionKind,
    /// The entity the action concerns
    entity_id: EntityId,
    /// When the underlying mutation happened
    timestamp: DateTime<Utc>,
    /// Which side produced the action
    origin: ActionOrigin,
    /// Entity snapshot at mutation time (`None` only for deletes where no
    /// snapshot survived)
    payload: Option<ActionPayload>,
    /// Snapshot before the mutation, when known
    previous: Option<ActionPayload>,
    /// Whether the applier has successfully applied this action
    synchronized: bool,
    /// When the apply completed
    synchronized_at: Option<DateTime<Utc>>,
    /// Number of failed apply attempts
    retry_count: u32,
}

impl SyncAction {
    /// Creates a new unsynchronized action stamped with the current time
    pub fn new(
        origin: ActionOrigin,
        kind: ActionKind,
        entity_id: EntityId,
        payload: Option<ActionPayload>,
        previous: Option<ActionPayload>,
    ) -> Self {
        Self {
            id: ActionId::new(),
            kind,
            entity_id,
            timestamp: Utc::now(),
            origin,
            payload,
            previous,
            synchronized: false,
            synchronized_at: None,
            retry_count: 0,
        }
    }

    // --- Getters ---

    /// Returns the action id
    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Returns the action kind
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Returns the entity id
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Returns when the underlying mutation happened
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the origin side
    pub fn origin(&self) -> ActionOrigin {
        self.origin
    }

    /// Returns the payload snapshot
    pub fn payload(&self) -> Option<&ActionPayload> {
        self.payload.as_ref()
    }

    /// Returns the pre-mutation snapshot
    pub fn previous(&self) -> Option<&ActionPayload> {
        self.previous.as_ref()
    }

    /// Returns whether the action has been applied
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Returns when the apply completed
    pub fn synchronized_at(&self) -> Option<DateTime<Utc>> {
        self.synchronized_at
    }

    /// Returns the failed-attempt count
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns true if the retry budget is exhausted
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= MAX_ACTION_RETRIES
    }

    // --- Applier-owned mutations ---

    /// Marks the action applied and records the time
    pub fn mark_synchronized(&mut self) {
        self.synchronized = true;
        self.synchronized_at = Some(Utc::now());
    }

    /// Records a failed apply attempt
    pub fn record_failure(&mut self) {
        self.retry_count += 1;
    }

    /// Overrides the mutation timestamp (used by the change detector when
    /// the remote service reports its own modification time)
    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = timestamp;
    }
}
