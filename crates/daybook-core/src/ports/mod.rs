//! Port definitions (hexagonal architecture)
//!
//! Traits the host application implements so the engine can reach the
//! outside world: the remote calendar service, the persistent store, and
//! the UI notification bus.

pub mod calendar_service;
pub mod event_store;
pub mod notification;

pub use calendar_service::{
    Calendar, CalendarError, ICalendarService, RemoteEvent, RemoteEventDraft, RemoteEventPatch,
};
pub use event_store::{IEventStore, StateRepository, SyncSettings};
pub use notification::{ISyncNotifier, NullNotifier};
