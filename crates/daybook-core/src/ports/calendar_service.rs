//! Remote calendar service port (driven/secondary port)
//!
//! This module defines the functional contract of the remote calendar
//! service. The wire protocol behind it is out of scope; the host
//! application provides the adapter.
//!
//! ## Design Notes
//!
//! - Uses a typed [`CalendarError`] instead of `anyhow` because callers
//!   must branch on specific failures: the applier converts `NotFound`
//!   into a recreate, and the fetcher aborts the whole cycle on
//!   `AuthRequired`/`Transport`.
//! - `RemoteEvent` is a port-level DTO, not a domain entity; the change
//!   detector maps it against local `EventRecord`s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::newtypes::{CalendarId, ExternalId};

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by calendar service adapters
///
/// `NotFound` is distinguished because updates against a vanished remote
/// event are recoverable (the applier recreates the event).
#[derive(Debug, Error)]
pub enum CalendarError {
    /// The referenced remote event does not exist
    #[error("Remote event not found: {0}")]
    NotFound(ExternalId),

    /// The user is not signed in or the token has been revoked
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// Network-level failure talking to the service
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service rejected the request payload
    #[error("Rejected by remote service: {0}")]
    Rejected(String),
}

impl CalendarError {
    /// Returns true if the failure means the whole sync cycle must abort
    ///
    /// An aborting failure can mask an empty-but-valid result, so the
    /// engine never infers deletions from it.
    pub fn aborts_cycle(&self) -> bool {
        matches!(self, CalendarError::AuthRequired(_) | CalendarError::Transport(_))
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// A calendar known to the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    /// Remote identifier of the calendar
    pub id: CalendarId,
    /// Display name
    pub name: String,
    /// Whether this is the account's primary calendar
    pub primary: bool,
}

/// An event as returned by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEvent {
    /// Remote identifier of the event
    pub id: ExternalId,
    /// Calendar the event was fetched from
    pub calendar_id: CalendarId,
    /// Event title
    pub title: String,
    /// Event description (may carry provenance annotations)
    pub description: String,
    /// Start of the event
    pub start: DateTime<Utc>,
    /// End of the event
    pub end: DateTime<Utc>,
    /// Whether the event spans whole days
    pub all_day: bool,
    /// Remote-reported last modification time, when available
    pub updated: Option<DateTime<Utc>>,
}

/// Payload for creating a remote event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEventDraft {
    /// Event title
    pub title: String,
    /// Event description
    pub description: String,
    /// Start of the event
    pub start: DateTime<Utc>,
    /// End of the event
    pub end: DateTime<Utc>,
    /// Whether the event spans whole days
    pub all_day: bool,
}

/// Partial field patch for updating a remote event
///
/// `None` fields are left untouched by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteEventPatch {
    /// New title, if changed
    pub title: Option<String>,
    /// New description, if changed
    pub description: Option<String>,
    /// New start, if changed
    pub start: Option<DateTime<Utc>>,
    /// New end, if changed
    pub end: Option<DateTime<Utc>>,
    /// New all-day flag, if changed
    pub all_day: Option<bool>,
}

impl RemoteEventPatch {
    /// Returns true if the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.all_day.is_none()
    }

    /// Reduces the patch to title + description only
    ///
    /// Used as the last-resort apply when a full patch keeps failing.
    pub fn minimal(&self) -> Self {
        Self {
            title: self.title.clone(),
            description: self.description.clone(),
            ..Self::default()
        }
    }
}

// ============================================================================
// ICalendarService trait
// ============================================================================

/// Port trait for the remote calendar service
///
/// ## Implementation Notes
///
/// - Adapters own authentication-token refresh; `is_signed_in` reflects
///   whether calls can be expected to succeed.
/// - `update_event` must fail with [`CalendarError::NotFound`] when the
///   event no longer exists, never with a generic transport error.
/// - All calls are non-blocking for the rest of the process; the cycle
///   controller awaits them sequentially.
#[async_trait::async_trait]
pub trait ICalendarService: Send + Sync {
    /// Returns whether a signed-in session is available
    async fn is_signed_in(&self) -> bool;

    /// Returns a fresh access token for the signed-in session
    ///
    /// The engine never inspects the token; it exists so hosts can share
    /// one authenticated session between the sync engine and other
    /// calendar consumers.
    async fn access_token(&self) -> Result<String, CalendarError>;

    /// Lists every calendar visible to the account
    async fn list_calendars(&self) -> Result<Vec<Calendar>, CalendarError>;

    /// Fetches all events of one calendar inside a time range
    async fn fetch_events(
        &self,
        calendar_id: &CalendarId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>, CalendarError>;

    /// Creates an event, returning the id the service assigned
    async fn create_event(
        &self,
        draft: &RemoteEventDraft,
        calendar_id: &CalendarId,
    ) -> Result<ExternalId, CalendarError>;

    /// Applies a partial patch to an existing event
    async fn update_event(
        &self,
        external_id: &ExternalId,
        patch: &RemoteEventPatch,
    ) -> Result<(), CalendarError>;

    /// Deletes an event
    async fn delete_event(&self, external_id: &ExternalId) -> Result<(), CalendarError>;

    /// Returns the calendar used when nothing else resolves one
    async fn default_calendar_id(&self) -> Result<CalendarId, CalendarError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborts_cycle_classification() {
        let ext = ExternalId::new("evt_1".to_string()).unwrap();
        assert!(CalendarError::AuthRequired("token expired".into()).aborts_cycle());
        assert!(CalendarError::Transport("connection reset".into()).aborts_cycle());
        assert!(!CalendarError::NotFound(ext).aborts_cycle());
        assert!(!CalendarError::Rejected("bad field".into()).aborts_cycle());
    }

    #[test]
    fn test_patch_minimal_keeps_only_text_fields() {
        let patch = RemoteEventPatch {
            title: Some("t".into()),
            description: Some("d".into()),
            start: Some(Utc::now()),
            end: Some(Utc::now()),
            all_day: Some(true),
        };
        let minimal = patch.minimal();
        assert_eq!(minimal.title.as_deref(), Some("t"));
        assert_eq!(minimal.description.as_deref(), Some("d"));
        assert!(minimal.start.is_none());
        assert!(minimal.end.is_none());
        assert!(minimal.all_day.is_none());
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(RemoteEventPatch::default().is_empty());
        let patch = RemoteEventPatch {
            title: Some("t".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
