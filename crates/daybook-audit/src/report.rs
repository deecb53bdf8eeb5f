//! Audit issue taxonomy and health reporting

use std::fmt;

use serde::{Deserialize, Serialize};

use daybook_core::domain::newtypes::EventId;

/// A single detected index inconsistency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditIssue {
    /// The store holds a record the index does not know
    MissingIndexEntry {
        /// The affected record
        event_id: EventId,
    },
    /// The index entry no longer matches the stored record
    StaleIndexEntry {
        /// The affected record
        event_id: EventId,
    },
    /// The index holds an entry with no backing record
    OrphanIndexEntry {
        /// The dangling id
        event_id: EventId,
    },
}

impl AuditIssue {
    /// The record the issue concerns
    pub fn event_id(&self) -> EventId {
        match self {
            AuditIssue::MissingIndexEntry { event_id }
            | AuditIssue::StaleIndexEntry { event_id }
            | AuditIssue::OrphanIndexEntry { event_id } => *event_id,
        }
    }
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditIssue::MissingIndexEntry { event_id } => {
                write!(f, "missing index entry for {event_id}")
            }
            AuditIssue::StaleIndexEntry { event_id } => {
                write!(f, "stale index entry for {event_id}")
            }
            AuditIssue::OrphanIndexEntry { event_id } => {
                write!(f, "orphan index entry for {event_id}")
            }
        }
    }
}

/// Summary of one auditor invocation
#[derive(Debug, Clone, PartialEq)]
pub struct AuditReport {
    /// Which scan mode ran
    pub mode: crate::auditor::ScanMode,
    /// Number of records examined this invocation
    pub examined: usize,
    /// Issues found (and repaired) this invocation
    pub issues: Vec<AuditIssue>,
    /// True when a full scan finished its final batch
    pub completed_full_scan: bool,
}

impl AuditReport {
    /// Health score from 0 (drifted badly) to 100 (clean)
    pub fn health_score(&self) -> u8 {
        let penalty = (self.issues.len() as u32).saturating_mul(10).min(100);
        (100 - penalty) as u8
    }
}
