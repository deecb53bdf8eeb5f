//! Integrity auditor
//!
//! Background, time-boxed consistency scan over the event index. Runs
//! only when the engine is quiet: no sync cycle in progress, the user
//! idle, enough spacing since the last audit, and a stable action queue.
//!
//! Two modes:
//! - **Full scan** - examines every record in resumable batches (bounded
//!   by entity count and wall-clock budget per invocation). Runs on first
//!   start and after enough incremental index updates have accumulated.
//! - **Quick scan** - restricted to the records visible in the host's
//!   current UI time window.
//!
//! Both modes repair drift in place and report a health score; neither
//! emits propagation events.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use daybook_core::config::LimitConfig;
use daybook_core::domain::event::EventRecord;
use daybook_core::domain::index::EventIndex;
use daybook_core::domain::newtypes::EventId;

use crate::report::{AuditIssue, AuditReport};

/// Which scan variant an invocation ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Resumable batched scan over every record
    Full,
    /// Scan limited to the visible UI time window
    Quick,
}

/// Engine quiescence signals the auditor gates on
#[derive(Debug, Clone, Copy)]
pub struct AuditGate {
    /// Whether a sync cycle is currently running
    pub cycle_in_progress: bool,
    /// Last observed user activity
    pub last_user_activity: DateTime<Utc>,
    /// When the action queue last changed (None: never in this process)
    pub queue_last_changed: Option<DateTime<Utc>>,
}

/// Background index-consistency scanner
pub struct IntegrityAuditor {
    idle: Duration,
    spacing: Duration,
    queue_stable: Duration,
    batch_size: usize,
    batch_budget: std::time::Duration,
    full_scan_after_updates: u32,
    last_audit: Option<DateTime<Utc>>,
    /// Resume position of an in-progress full scan
    cursor: usize,
    /// A full scan is owed (first start, or threshold reached mid-scan)
    full_scan_pending: bool,
}

impl IntegrityAuditor {
    /// Creates an auditor with the configured limits; the first run is a
    /// full scan
    pub fn new(limits: &LimitConfig) -> Self {
        Self {
            idle: Duration::seconds(limits.audit_idle_secs),
            spacing: Duration::seconds(limits.audit_spacing_secs),
            queue_stable: Duration::seconds(limits.audit_queue_stable_secs),
            batch_size: limits.audit_batch_size.max(1),
            batch_budget: std::time::Duration::from_millis(limits.audit_batch_budget_ms),
            full_scan_after_updates: limits.full_scan_after_updates,
            last_audit: None,
            cursor: 0,
            full_scan_pending: true,
        }
    }

    /// Returns true if all quiescence gates pass as of `now`
    pub fn should_run(&self, gate: &AuditGate, now: DateTime<Utc>) -> bool {
        if gate.cycle_in_progress {
            return false;
        }
        if now.signed_duration_since(gate.last_user_activity) < self.idle {
            return false;
        }
        if let Some(last) = self.last_audit {
            if now.signed_duration_since(last) < self.spacing {
                return false;
            }
        }
        if let Some(changed) = gate.queue_last_changed {
            if now.signed_duration_since(changed) < self.queue_stable {
                return false;
            }
        }
        true
    }

    /// Runs one audit invocation, repairing drift in place
    ///
    /// `updates_since_full` is the number of incremental index updates
    /// since the last completed full scan; crossing the configured
    /// threshold forces full mode.
    pub fn run(
        &mut self,
        records: &[EventRecord],
        index: &mut EventIndex,
        visible_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
        updates_since_full: u32,
        now: DateTime<Utc>,
    ) -> AuditReport {
        self.last_audit = Some(now);

        if updates_since_full >= self.full_scan_after_updates {
            self.full_scan_pending = true;
        }

        if self.full_scan_pending || self.cursor > 0 {
            self.run_full(records, index)
        } else {
            self.run_quick(records, index, visible_window)
        }
    }

    /// One resumable batch of the full scan
    fn run_full(&mut self, records: &[EventRecord], index: &mut EventIndex) -> AuditReport {
        let started = Instant::now();
        let mut issues = Vec::new();
        let mut examined = 0usize;

        while self.cursor < records.len() {
            if examined >= self.batch_size || started.elapsed() >= self.batch_budget {
                break;
            }
            let record = &records[self.cursor];
            if let Some(issue) = verify_and_repair(record, index) {
                issues.push(issue);
            }
            self.cursor += 1;
            examined += 1;
        }

        let completed = self.cursor >= records.len();
        if completed {
            // Final batch also sweeps index entries with no backing record.
            let known: HashSet<EventId> = records.iter().map(|r| r.id()).collect();
            let orphans: Vec<EventId> = index
                .records()
                .map(|r| r.id())
                .filter(|id| !known.contains(id))
                .collect();
            for id in orphans {
                index.remove(id);
                issues.push(AuditIssue::OrphanIndexEntry { event_id: id });
            }
            self.cursor = 0;
            self.full_scan_pending = false;
            info!(
                examined,
                issues = issues.len(),
                "Full integrity scan completed"
            );
        } else {
            debug!(
                cursor = self.cursor,
                examined, "Full integrity scan batch suspended"
            );
        }

        AuditReport {
            mode: ScanMode::Full,
            examined,
            issues,
            completed_full_scan: completed,
        }
    }

    /// Quick scan over the visible UI time window
    fn run_quick(
        &mut self,
        records: &[EventRecord],
        index: &mut EventIndex,
        visible_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> AuditReport {
        let mut issues = Vec::new();
        let mut examined = 0usize;

        if let Some((start, end)) = visible_window {
            for record in records {
                if record.start() < start || record.start() >= end {
                    continue;
                }
                examined += 1;
                if let Some(issue) = verify_and_repair(record, index) {
                    issues.push(issue);
                }
            }
        }

        debug!(examined, issues = issues.len(), "Quick integrity scan done");
        AuditReport {
            mode: ScanMode::Quick,
            examined,
            issues,
            completed_full_scan: false,
        }
    }
}

/// Checks one record's index entry, repairing it in place when it drifted
fn verify_and_repair(record: &EventRecord, index: &mut EventIndex) -> Option<AuditIssue> {
    match index.get(record.id()) {
        None => {
            index.upsert(record);
            Some(AuditIssue::MissingIndexEntry {
                event_id: record.id(),
            })
        }
        Some(indexed) if indexed != record => {
            index.upsert(record);
            Some(AuditIssue::StaleIndexEntry {
                event_id: record.id(),
            })
        }
        Some(_) => {
            // The by-id entry matches; make sure the external mapping does too.
            if let Some(ext) = record.external_id() {
                if index
                    .get_by_external(ext)
                    .map(|r| r.id())
                    != Some(record.id())
                {
                    index.upsert(record);
                    return Some(AuditIssue::StaleIndexEntry {
                        event_id: record.id(),
                    });
                }
            }
            None
        }
    }
}
