//! Daybook Conflict - Conflict pairing and resolution
//!
//! Pairs concurrent local/remote actions on the same entity into
//! [`SyncConflict`](daybook_core::domain::conflict::SyncConflict)s,
//! picks a resolution strategy, and keeps manual conflicts in a
//! persistent queue for operator review.
//!
//! ## Modules
//!
//! - [`pairing`] - Race-window pairing of unsynchronized actions
//! - [`resolver`] - Strategy selection and resolution outcomes
//! - [`queue`] - Manual-review conflict queue

pub mod pairing;
pub mod queue;
pub mod resolver;

use thiserror::Error;

/// Errors that can occur during conflict handling
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The referenced conflict is not in the manual queue
    #[error("Unknown conflict: {0}")]
    UnknownConflict(uuid::Uuid),

    /// Persisting the manual queue failed
    #[error("Failed to persist manual conflicts: {0}")]
    PersistFailed(String),
}
