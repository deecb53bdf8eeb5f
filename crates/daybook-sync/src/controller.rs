//! Sync cycle controller
//!
//! The orchestrator. One instance per process owns the engine state, the
//! action queue, and all guards as explicit fields; nothing lives in
//! module statics. A boolean cycle-in-progress flag gives mutual
//! exclusion across the whole cycle, and cycles are throttled to a
//! minimum spacing regardless of trigger source.
//!
//! ## Cycle stages
//!
//! fetch → apply-local → apply-remote → resolve-conflicts → cleanup →
//! dedup, awaited sequentially so no two stages interleave. The cleanup
//! stage always runs, even when an earlier stage aborted the cycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use daybook_audit::{AuditGate, AuditReport, IntegrityAuditor};
use daybook_conflict::queue::ManualConflictQueue;
use daybook_conflict::resolver::{ConflictResolver, ResolutionOutcome};
use daybook_core::config::SyncConfig;
use daybook_core::domain::action::{
    ActionKind, ActionOrigin, ActionPayload, EventPayload, SyncAction, TaskPayload,
};
use daybook_core::domain::event::{EventRecord, TaskRecord};
use daybook_core::domain::newtypes::{ActionId, EntityId, EventId, TaskId};
use daybook_core::ports::calendar_service::ICalendarService;
use daybook_core::ports::event_store::{IEventStore, StateRepository};
use daybook_core::ports::notification::ISyncNotifier;

use crate::applier::{ActionApplier, ApplyOutcome};
use crate::dedup::collapse_duplicates;
use crate::detector::ChangeDetector;
use crate::fetcher::{presumed_partial, RemoteFetcher, SyncWindow};
use crate::leases::EditLeaseManager;
use crate::queue::ActionQueue;
use crate::state::EngineState;
use crate::tombstones::TombstoneSet;
use crate::touched::RecentlyTouchedSet;
use crate::SyncError;

// ============================================================================
// SyncOutcome
// ============================================================================

/// Summary of one sync cycle
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Abort reason, if the cycle aborted before applying anything
    pub aborted: Option<String>,
    /// Remote events returned by the fetch
    pub fetched: usize,
    /// Local actions pushed to the remote service
    pub pushed: u32,
    /// Remote actions written into the local store
    pub pulled: u32,
    /// Local records removed because the remote side deleted them
    pub deleted_local: u32,
    /// Remote events deleted because the local side deleted them
    pub deleted_remote: u32,
    /// Remote writes suppressed by an active edit lease
    pub suppressed: u32,
    /// Conflicts resolved automatically
    pub conflicts_resolved: u32,
    /// Conflicts parked for manual review
    pub conflicts_queued: u32,
    /// Duplicate local records collapsed
    pub deduplicated: usize,
    /// Non-fatal errors encountered during the cycle
    pub errors: Vec<String>,
    /// Wall-clock duration of the cycle in milliseconds
    pub duration_ms: u64,
}

// ============================================================================
// SyncCycleController
// ============================================================================

/// Orchestrates sync cycles and the background integrity check
pub struct SyncCycleController {
    repo: StateRepository,
    notifier: Arc<dyn ISyncNotifier>,
    config: SyncConfig,

    state: EngineState,
    queue: ActionQueue,
    tombstones: TombstoneSet,
    leases: EditLeaseManager,
    touched: RecentlyTouchedSet,

    fetcher: RemoteFetcher,
    detector: ChangeDetector,
    applier: ActionApplier,
    resolver: ConflictResolver,
    manual_conflicts: ManualConflictQueue,
    auditor: IntegrityAuditor,

    cycle_in_progress: bool,
    last_cycle_started: Option<chrono::DateTime<Utc>>,
    last_user_activity: chrono::DateTime<Utc>,
    visible_window: Option<(chrono::DateTime<Utc>, chrono::DateTime<Utc>)>,
    in_flight: HashSet<EntityId>,
}

impl SyncCycleController {
    /// Loads persisted state and wires the engine together
    ///
    /// `author` is the display name stamped into provenance annotations.
    pub async fn new(
        service: Arc<dyn ICalendarService>,
        store: Arc<dyn IEventStore>,
        notifier: Arc<dyn ISyncNotifier>,
        config: SyncConfig,
        author: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let repo = StateRepository::new(store);
        let state = EngineState::load(&repo).await?;
        let queue = ActionQueue::from_actions(repo.load_actions().await?);
        let tombstones =
            TombstoneSet::from_raw(config.limits.tombstone_cap, &repo.load_tombstones().await?);
        let manual_conflicts = ManualConflictQueue::load(&repo).await?;

        let author = author.into();
        info!(
            events = state.events().len(),
            pending = queue.pending().len(),
            "Sync engine initialized"
        );

        Ok(Self {
            fetcher: RemoteFetcher::new(Arc::clone(&service)),
            detector: ChangeDetector::new(&config.detection),
            applier: ActionApplier::new(service, author),
            resolver: ConflictResolver::new(config.detection.conflict_window_secs),
            auditor: IntegrityAuditor::new(&config.limits),
            leases: EditLeaseManager::new(config.detection.edit_lease_secs),
            touched: RecentlyTouchedSet::new(config.detection.touched_ttl_secs),
            manual_conflicts,
            tombstones,
            queue,
            state,
            repo,
            notifier,
            config,
            cycle_in_progress: false,
            last_cycle_started: None,
            last_user_activity: Utc::now(),
            visible_window: None,
            in_flight: HashSet::new(),
        })
    }

    // ========================================================================
    // Host signals
    // ========================================================================

    /// Records user activity (gates the integrity auditor)
    pub fn note_user_activity(&mut self) {
        self.last_user_activity = Utc::now();
    }

    /// Sets the UI time window the quick integrity scan is limited to
    pub fn set_visible_window(
        &mut self,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
    ) {
        self.visible_window = Some((start, end));
    }

    /// Routes events carrying `tag` into `calendar` on their next push
    pub async fn map_tag_to_calendar(
        &mut self,
        tag: impl Into<String>,
        calendar: daybook_core::domain::newtypes::CalendarId,
    ) -> anyhow::Result<()> {
        self.state.settings.tag_calendar_map.insert(tag.into(), calendar);
        self.repo.save_settings(&self.state.settings).await
    }

    // ========================================================================
    // Local mutation intake
    // ========================================================================

    /// Records a locally created event and queues its push
    pub async fn record_local_create(&mut self, mut record: EventRecord) -> anyhow::Result<ActionId> {
        let _ = record.mark_pending();
        let entity: EntityId = record.id().into();
        let payload = ActionPayload::Event(EventPayload::from_record(&record));
        self.state.upsert_event(record);

        let id = self
            .queue
            .record(ActionOrigin::Local, ActionKind::Create, entity, Some(payload), None);
        self.guard_local_edit(entity);
        self.persist_all().await?;
        Ok(id)
    }

    /// Records a local edit and queues its push
    ///
    /// The pre-edit snapshot still in the store becomes the action's
    /// previous payload.
    pub async fn record_local_update(&mut self, mut record: EventRecord) -> anyhow::Result<ActionId> {
        let entity: EntityId = record.id().into();
        let previous = self
            .state
            .event(record.id())
            .map(|r| ActionPayload::Event(EventPayload::from_record(r)));

        let _ = record.mark_pending();
        let payload = ActionPayload::Event(EventPayload::from_record(&record));
        self.state.upsert_event(record);

        let id = self.queue.record(
            ActionOrigin::Local,
            ActionKind::Update,
            entity,
            Some(payload),
            previous,
        );
        self.guard_local_edit(entity);
        self.persist_all().await?;
        Ok(id)
    }

    /// Records a local deletion and queues the remote removal
    pub async fn record_local_delete(&mut self, id: EventId) -> anyhow::Result<Option<ActionId>> {
        let Some(removed) = self.state.remove_event(id) else {
            return Ok(None);
        };
        let entity: EntityId = id.into();
        let previous = ActionPayload::Event(EventPayload::from_record(&removed));

        let action_id = self.queue.record(
            ActionOrigin::Local,
            ActionKind::Delete,
            entity,
            None,
            Some(previous),
        );
        self.guard_local_edit(entity);
        self.persist_all().await?;
        Ok(Some(action_id))
    }

    /// Records a task create or update (tasks never leave the local store)
    pub async fn record_task_upsert(&mut self, record: TaskRecord) -> anyhow::Result<ActionId> {
        let entity: EntityId = record.id().into();
        let previous = self
            .state
            .task(record.id())
            .map(|t| ActionPayload::Task(TaskPayload::from_record(t)));
        let kind = if previous.is_some() {
            ActionKind::Update
        } else {
            ActionKind::Create
        };
        let payload = ActionPayload::Task(TaskPayload::from_record(&record));
        self.state.upsert_task(record);

        let id = self.queue.record(ActionOrigin::Local, kind, entity, Some(payload), previous);
        self.guard_local_edit(entity);
        self.persist_all().await?;
        Ok(id)
    }

    /// Records a task deletion
    pub async fn record_task_delete(&mut self, id: TaskId) -> anyhow::Result<Option<ActionId>> {
        let Some(removed) = self.state.remove_task(id) else {
            return Ok(None);
        };
        let entity: EntityId = id.into();
        let previous = ActionPayload::Task(TaskPayload::from_record(&removed));

        let action_id = self.queue.record(
            ActionOrigin::Local,
            ActionKind::Delete,
            entity,
            None,
            Some(previous),
        );
        self.guard_local_edit(entity);
        self.persist_all().await?;
        Ok(Some(action_id))
    }

    fn guard_local_edit(&mut self, entity: EntityId) {
        self.leases.begin_edit(entity);
        self.touched.note(entity);
        self.note_user_activity();
    }

    // ========================================================================
    // The sync cycle
    // ========================================================================

    /// Runs one full sync cycle
    ///
    /// # Errors
    /// Returns [`SyncError::CycleInProgress`] or [`SyncError::Throttled`]
    /// when the guards reject the trigger. A cycle that aborts mid-flight
    /// still returns `Ok`, with the reason in [`SyncOutcome::aborted`].
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&mut self) -> Result<SyncOutcome, SyncError> {
        let now = Utc::now();
        if self.cycle_in_progress {
            return Err(SyncError::CycleInProgress);
        }
        if let Some(last) = self.last_cycle_started {
            let spacing = Duration::seconds(self.config.timing.min_cycle_spacing_secs as i64);
            let since = now.signed_duration_since(last);
            if since < spacing {
                return Err(SyncError::Throttled((spacing - since).num_seconds().max(1)));
            }
        }

        self.cycle_in_progress = true;
        self.last_cycle_started = Some(now);
        let is_full_sync = self.state.settings.last_synced_at.is_none();
        self.notifier.sync_started(is_full_sync);
        info!(is_full_sync, "Sync cycle started");

        let started = Instant::now();
        let mut outcome = SyncOutcome::default();
        let staged = self.run_stages(&mut outcome).await;

        // Cleanup and dedup always run; persistence and the sync marker
        // only when the cycle was not aborted.
        self.finish_cycle(staged.is_err(), &mut outcome).await;
        self.cycle_in_progress = false;

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        if let Err(reason) = staged {
            warn!(error = %reason, "Sync cycle aborted");
            outcome.aborted = Some(reason.to_string());
        }
        self.notifier.sync_completed(Utc::now(), outcome.duration_ms);
        info!(
            fetched = outcome.fetched,
            pushed = outcome.pushed,
            pulled = outcome.pulled,
            suppressed = outcome.suppressed,
            errors = outcome.errors.len(),
            duration_ms = outcome.duration_ms,
            "Sync cycle completed"
        );
        Ok(outcome)
    }

    async fn run_stages(&mut self, outcome: &mut SyncOutcome) -> Result<(), SyncError> {
        let now = Utc::now();

        // Stage 1: fetch. Any transport/auth failure aborts the cycle;
        // inferring deletions from an error state would destroy local data.
        let window = SyncWindow::select(self.state.settings.last_synced_at, &self.config.windows, now);
        let fetched = self
            .fetcher
            .fetch(&window)
            .await
            .map_err(|e| SyncError::Aborted(format!("remote fetch failed: {e}")))?;

        if presumed_partial(&fetched, self.state.index()) {
            return Err(SyncError::Aborted(
                "zero remote events while synced local records exist".to_string(),
            ));
        }
        outcome.fetched = fetched.len();

        // Stage 2: push local actions first. The fetch snapshot predates
        // these pushes, so detection must see their tombstones and fresh
        // external ids or it would resurrect just-deleted events.
        self.apply_batch(ActionOrigin::Local, outcome).await;

        // Stage 3: change detection feeds remote-origin actions into the queue.
        let detected = self.detector.detect(
            &fetched,
            &window,
            self.state.index(),
            &self.tombstones,
            &self.touched,
            Utc::now(),
        );
        for action in detected {
            self.queue.push(action);
        }

        // Stages 4-5.
        self.apply_batch(ActionOrigin::Remote, outcome).await;
        self.resolve_stage(outcome).await;
        Ok(())
    }

    /// Applies every pending action of one origin, single-flight per entity
    async fn apply_batch(&mut self, origin: ActionOrigin, outcome: &mut SyncOutcome) {
        let pending = self.queue.drain_pending(origin);
        let mut created = 0usize;
        let mut updated = 0usize;
        let mut deleted = 0usize;

        for action in pending {
            let entity = action.entity_id();
            if !self.in_flight.insert(entity) {
                debug!(%entity, "Apply skipped; entity already in flight");
                continue;
            }
            let result = self
                .applier
                .apply(&action, &mut self.state, &mut self.tombstones, &self.leases)
                .await;
            self.in_flight.remove(&entity);

            match result {
                ApplyOutcome::Applied => {
                    self.queue.mark_synchronized(action.id());
                    match origin {
                        ActionOrigin::Local => {
                            // The remote service has not echoed this push
                            // yet; the touch guard keeps this cycle's
                            // detection from misreading its absence in the
                            // fetch snapshot as a deletion.
                            self.touched.note(entity);
                            match action.kind() {
                                ActionKind::Delete => outcome.deleted_remote += 1,
                                _ => outcome.pushed += 1,
                            }
                        }
                        ActionOrigin::Remote => {
                            match action.kind() {
                                ActionKind::Create => created += 1,
                                ActionKind::Update => updated += 1,
                                ActionKind::Delete => {
                                    deleted += 1;
                                    outcome.deleted_local += 1;
                                }
                            }
                            if action.kind() != ActionKind::Delete {
                                outcome.pulled += 1;
                            }
                        }
                    }
                }
                ApplyOutcome::Noop => {
                    self.queue.mark_synchronized(action.id());
                }
                ApplyOutcome::Suppressed => {
                    outcome.suppressed += 1;
                }
                ApplyOutcome::Failed(reason) => {
                    warn!(
                        action = %action.id(),
                        entity = %entity,
                        %reason,
                        "Action apply failed"
                    );
                    outcome.errors.push(reason);
                    self.queue.record_failure(action.id());
                }
            }
        }

        if origin == ActionOrigin::Remote {
            for (kind, count) in [
                (ActionKind::Create, created),
                (ActionKind::Update, updated),
                (ActionKind::Delete, deleted),
            ] {
                if count > 0 {
                    self.notifier.local_events_changed(kind, count);
                }
            }
        }
    }

    /// Pairs leftover concurrent actions and applies the winners
    async fn resolve_stage(&mut self, outcome: &mut SyncOutcome) {
        let resolutions = self.resolver.resolve_all(&self.queue.pending());
        for resolution in resolutions {
            match resolution {
                ResolutionOutcome::Decided { winner, loser } => {
                    self.queue.remove(loser.id());
                    if !winner.is_synchronized() {
                        let entity = winner.entity_id();
                        if self.in_flight.insert(entity) {
                            let result = self
                                .applier
                                .apply(&winner, &mut self.state, &mut self.tombstones, &self.leases)
                                .await;
                            self.in_flight.remove(&entity);
                            match result {
                                ApplyOutcome::Applied | ApplyOutcome::Noop => {
                                    self.queue.mark_synchronized(winner.id());
                                }
                                ApplyOutcome::Suppressed => outcome.suppressed += 1,
                                ApplyOutcome::Failed(reason) => {
                                    outcome.errors.push(reason);
                                    self.queue.record_failure(winner.id());
                                }
                            }
                        }
                    }
                    outcome.conflicts_resolved += 1;
                }
                ResolutionOutcome::Queued(conflict) => {
                    self.queue.remove(conflict.local().id());
                    self.queue.remove(conflict.remote().id());
                    self.manual_conflicts.push(conflict);
                    outcome.conflicts_queued += 1;
                }
            }
        }
    }

    /// Cleanup stage; runs whether or not the cycle aborted
    async fn finish_cycle(&mut self, aborted: bool, outcome: &mut SyncOutcome) {
        self.leases.purge_expired();
        self.touched.purge();

        if aborted {
            // The queue stays untouched so nothing queued is lost.
            return;
        }

        let compacted = self.queue.remove_synchronized();
        debug!(compacted, "Queue compacted");

        outcome.deduplicated = collapse_duplicates(&mut self.state);
        self.state.settings.last_synced_at = Some(Utc::now());

        if let Err(e) = self.persist_all().await {
            warn!(error = %e, "Failed to persist engine state after cycle");
            outcome.errors.push(format!("persist: {e}"));
        }
    }

    async fn persist_all(&self) -> anyhow::Result<()> {
        self.state.persist(&self.repo).await?;
        self.repo.save_actions(self.queue.actions()).await?;
        self.repo.save_tombstones(&self.tombstones.to_raw()).await?;
        self.manual_conflicts
            .persist(&self.repo)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    // ========================================================================
    // Integrity check
    // ========================================================================

    /// Runs the integrity auditor if every quiescence gate passes
    ///
    /// Returns `None` when the gates rejected the run.
    pub async fn run_integrity_check(&mut self) -> Option<AuditReport> {
        let now = Utc::now();
        let gate = AuditGate {
            cycle_in_progress: self.cycle_in_progress,
            last_user_activity: self.last_user_activity,
            queue_last_changed: self.queue.last_changed(),
        };
        if !self.auditor.should_run(&gate, now) {
            return None;
        }

        let updates = self.state.settings.index_updates_since_full_scan;
        let visible = self.visible_window;
        let (records, index) = self.state.audit_parts();
        let report = self.auditor.run(records, index, visible, updates, now);

        if report.completed_full_scan {
            self.state.settings.index_updates_since_full_scan = 0;
            if let Err(e) = self.repo.save_settings(&self.state.settings).await {
                warn!(error = %e, "Failed to persist settings after full scan");
            }
        }
        debug!(
            mode = ?report.mode,
            examined = report.examined,
            issues = report.issues.len(),
            score = report.health_score(),
            "Integrity check ran"
        );
        Some(report)
    }

    // ========================================================================
    // Read access
    // ========================================================================

    /// All local event records
    pub fn events(&self) -> &[EventRecord] {
        self.state.events()
    }

    /// One local event record
    pub fn event(&self, id: EventId) -> Option<&EventRecord> {
        self.state.event(id)
    }

    /// All local task records
    pub fn tasks(&self) -> &[TaskRecord] {
        self.state.tasks()
    }

    /// Unsynchronized actions still queued
    pub fn pending_actions(&self) -> Vec<SyncAction> {
        self.queue.pending()
    }

    /// Conflicts awaiting operator review
    pub fn manual_conflicts(&self) -> &ManualConflictQueue {
        &self.manual_conflicts
    }

    /// Whether a cycle is currently running
    pub fn is_cycle_in_progress(&self) -> bool {
        self.cycle_in_progress
    }
}
