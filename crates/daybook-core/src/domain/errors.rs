//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and invalid sync-status transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid external id format
    #[error("Invalid external id: {0}")]
    InvalidExternalId(String),

    /// Invalid calendar id format
    #[error("Invalid calendar id: {0}")]
    InvalidCalendarId(String),

    /// Invalid sync-status transition attempt
    #[error("Invalid sync status transition from {from} to {to}")]
    InvalidStatus {
        /// The current status
        from: String,
        /// The attempted target status
        to: String,
    },

    /// Event time range is inverted (end before start)
    #[error("Event ends before it starts: {0}")]
    InvertedTimeRange(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
