//! Daybook Audit - Background integrity auditing
//!
//! Time-boxed consistency scans that repair event-index drift without
//! disturbing an active sync cycle. Repairs are silent: the auditor fixes
//! the derived index in place and never emits propagation events.
//!
//! ## Modules
//!
//! - [`auditor`] - Gating, batched full scans, and quick scans
//! - [`report`] - Issue taxonomy and the 0-100 health score

pub mod auditor;
pub mod report;

pub use auditor::{AuditGate, IntegrityAuditor, ScanMode};
pub use report::{AuditIssue, AuditReport};
