//! Action applier
//!
//! Executes a single [`SyncAction`] against the opposite store: local
//! actions are pushed to the remote calendar, remote actions are written
//! into the local store. Every apply is idempotent per call, so a retried
//! action never creates a second remote event or a duplicate local record.
//!
//! Remote-origin writes consult the edit-lease manager first; a live
//! lease suppresses the write and the action stays queued.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use daybook_core::domain::action::{ActionKind, ActionOrigin, EventPayload, SyncAction};
use daybook_core::domain::annotation::{ensure_created_annotation, refresh_edit_annotation};
use daybook_core::domain::event::EventRecord;
use daybook_core::domain::newtypes::{CalendarId, EntityId, EventId, ExternalId};
use daybook_core::ports::calendar_service::{
    CalendarError, ICalendarService, RemoteEventDraft, RemoteEventPatch,
};
use daybook_core::ports::event_store::SyncSettings;

use crate::leases::EditLeaseManager;
use crate::state::EngineState;
use crate::tombstones::TombstoneSet;

/// Result of applying one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The action was handled; mark it synchronized
    Applied,
    /// The action was handled but nothing changed locally or remotely
    Noop,
    /// An edit lease suppressed the write; leave the action queued
    Suppressed,
    /// The apply failed; record a retry
    Failed(String),
}

/// Applies actions against the opposite store
pub struct ActionApplier {
    service: Arc<dyn ICalendarService>,
    /// Author name stamped into provenance annotations
    author: String,
}

impl ActionApplier {
    /// Creates an applier over the calendar service port
    pub fn new(service: Arc<dyn ICalendarService>, author: impl Into<String>) -> Self {
        Self {
            service,
            author: author.into(),
        }
    }

    /// Applies one action, mutating local state as needed
    pub async fn apply(
        &self,
        action: &SyncAction,
        state: &mut EngineState,
        tombstones: &mut TombstoneSet,
        leases: &EditLeaseManager,
    ) -> ApplyOutcome {
        match action.entity_id() {
            // Tasks have no remote representation; their actions complete
            // locally so the queue and notifications still see them.
            EntityId::Task(_) => {
                debug!(entity = %action.entity_id(), "Task action completes without remote call");
                ApplyOutcome::Noop
            }
            EntityId::Event(event_id) => match action.origin() {
                ActionOrigin::Local => {
                    self.apply_local(action, event_id, state, tombstones).await
                }
                ActionOrigin::Remote => {
                    if leases.is_active(action.entity_id()) {
                        debug!(
                            entity = %action.entity_id(),
                            "Edit lease active; remote write suppressed"
                        );
                        return ApplyOutcome::Suppressed;
                    }
                    self.apply_remote(action, event_id, state, tombstones)
                }
            },
        }
    }

    // ========================================================================
    // Local origin: push to the remote calendar
    // ========================================================================

    async fn apply_local(
        &self,
        action: &SyncAction,
        event_id: EventId,
        state: &mut EngineState,
        tombstones: &mut TombstoneSet,
    ) -> ApplyOutcome {
        match action.kind() {
            ActionKind::Create => self.push_create(action, event_id, state).await,
            ActionKind::Update => self.push_update(action, event_id, state, tombstones).await,
            ActionKind::Delete => self.push_delete(action, event_id, state, tombstones).await,
        }
    }

    async fn push_create(
        &self,
        action: &SyncAction,
        event_id: EventId,
        state: &mut EngineState,
    ) -> ApplyOutcome {
        let Some(payload) = action.payload().and_then(|p| p.as_event()).cloned() else {
            return ApplyOutcome::Failed("create action without event payload".to_string());
        };

        match state.event(event_id) {
            // Guard against double-apply: an external id means the event
            // already exists remotely.
            Some(record) if record.external_id().is_some() => {
                debug!(event = %event_id, "Create skipped; remote event already exists");
                return ApplyOutcome::Noop;
            }
            Some(_) => {}
            None => {
                debug!(event = %event_id, "Create skipped; local record no longer exists");
                return ApplyOutcome::Noop;
            }
        }

        let calendar = match self
            .resolve_calendar(&payload, action.previous().and_then(|p| p.as_event()), &state.settings)
            .await
        {
            Ok(calendar) => calendar,
            Err(e) => return ApplyOutcome::Failed(format!("resolve calendar: {e}")),
        };

        let description = refresh_edit_annotation(&payload.description, &self.author, Utc::now());
        let draft = RemoteEventDraft {
            title: payload.title.clone(),
            description: description.clone(),
            start: payload.start,
            end: payload.end,
            all_day: payload.all_day,
        };

        match self.service.create_event(&draft, &calendar).await {
            Ok(external) => {
                state.modify_event(event_id, |record| {
                    record.set_remote_identity(external.normalized(), calendar.clone());
                    record.set_description(description.clone());
                    settle_synced(record);
                });
                info!(event = %event_id, calendar = %calendar, "Event created remotely");
                ApplyOutcome::Applied
            }
            Err(e) => ApplyOutcome::Failed(format!("remote create: {e}")),
        }
    }

    async fn push_update(
        &self,
        action: &SyncAction,
        event_id: EventId,
        state: &mut EngineState,
        tombstones: &mut TombstoneSet,
    ) -> ApplyOutcome {
        let Some(payload) = action.payload().and_then(|p| p.as_event()).cloned() else {
            return ApplyOutcome::Failed("update action without event payload".to_string());
        };
        let Some(record) = state.event(event_id).cloned() else {
            debug!(event = %event_id, "Update skipped; local record no longer exists");
            return ApplyOutcome::Noop;
        };

        // First-time sync: no external id yet, so the update is a create.
        let Some(external) = record.external_id().cloned() else {
            return self.push_create(action, event_id, state).await;
        };

        let previous = action.previous().and_then(|p| p.as_event());
        let resolved = match self.resolve_calendar(&payload, previous, &state.settings).await {
            Ok(calendar) => calendar,
            Err(e) => return ApplyOutcome::Failed(format!("resolve calendar: {e}")),
        };

        let description = refresh_edit_annotation(&payload.description, &self.author, Utc::now());

        // A tag remap that resolves to a different calendar migrates the
        // event: delete from the old calendar, create fresh in the new one.
        if record.calendar_id() != Some(&resolved) {
            return self
                .migrate_calendar(event_id, &payload, description, &external, resolved, state, tombstones)
                .await;
        }

        let patch = build_patch(&payload, previous, description.clone());
        match self.service.update_event(&external, &patch).await {
            Ok(()) => {
                state.modify_event(event_id, |r| {
                    r.set_description(description.clone());
                    settle_synced(r);
                });
                ApplyOutcome::Applied
            }
            Err(CalendarError::NotFound(_)) => {
                // The remote copy vanished; recreate instead of failing.
                info!(event = %event_id, "Remote event missing on update; recreating");
                self.recreate(event_id, &payload, description, resolved, state, tombstones, &external)
                    .await
            }
            Err(e) => {
                warn!(event = %event_id, error = %e, "Full patch failed; trying minimal patch");
                match self.service.update_event(&external, &patch.minimal()).await {
                    Ok(()) => {
                        state.modify_event(event_id, |r| {
                            r.set_description(description.clone());
                            settle_synced(r);
                        });
                        ApplyOutcome::Applied
                    }
                    Err(e) => {
                        // The edit could not be pushed at all. Keep it, and
                        // make the failure visible instead of dropping it.
                        warn!(event = %event_id, error = %e, "Minimal patch failed; marking conflict");
                        state.modify_event(event_id, |r| {
                            let _ = r.mark_conflict();
                        });
                        ApplyOutcome::Applied
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn migrate_calendar(
        &self,
        event_id: EventId,
        payload: &EventPayload,
        description: String,
        old_external: &ExternalId,
        target: CalendarId,
        state: &mut EngineState,
        tombstones: &mut TombstoneSet,
    ) -> ApplyOutcome {
        info!(
            event = %event_id,
            calendar = %target,
            "Calendar changed; migrating remote event"
        );

        match self.service.delete_event(old_external).await {
            Ok(()) | Err(CalendarError::NotFound(_)) => {}
            Err(e) => return ApplyOutcome::Failed(format!("migration delete: {e}")),
        }

        self.recreate(event_id, payload, description, target, state, tombstones, old_external)
            .await
    }

    /// Creates the remote event fresh and rewrites the local identity
    #[allow(clippy::too_many_arguments)]
    async fn recreate(
        &self,
        event_id: EventId,
        payload: &EventPayload,
        description: String,
        calendar: CalendarId,
        state: &mut EngineState,
        tombstones: &mut TombstoneSet,
        old_external: &ExternalId,
    ) -> ApplyOutcome {
        let draft = RemoteEventDraft {
            title: payload.title.clone(),
            description: description.clone(),
            start: payload.start,
            end: payload.end,
            all_day: payload.all_day,
        };

        match self.service.create_event(&draft, &calendar).await {
            Ok(new_external) => {
                // The old id must stay dead even if a stale fetch echoes it.
                tombstones.insert(old_external);
                state.modify_event(event_id, |record| {
                    record.set_remote_identity(new_external.normalized(), calendar.clone());
                    record.set_description(description.clone());
                    settle_synced(record);
                });
                ApplyOutcome::Applied
            }
            Err(e) => ApplyOutcome::Failed(format!("recreate: {e}")),
        }
    }

    async fn push_delete(
        &self,
        action: &SyncAction,
        event_id: EventId,
        state: &mut EngineState,
        tombstones: &mut TombstoneSet,
    ) -> ApplyOutcome {
        // External id resolution priority: the pre-delete snapshot, then
        // the action payload, then whatever the store still holds.
        let external = action
            .previous()
            .and_then(|p| p.as_event())
            .and_then(|p| p.external_id.clone())
            .or_else(|| {
                action
                    .payload()
                    .and_then(|p| p.as_event())
                    .and_then(|p| p.external_id.clone())
            })
            .or_else(|| state.event(event_id).and_then(|r| r.external_id().cloned()));

        let Some(external) = external else {
            debug!(event = %event_id, "Delete without external id; nothing to remove remotely");
            return ApplyOutcome::Noop;
        };

        match self.service.delete_event(&external).await {
            Ok(()) | Err(CalendarError::NotFound(_)) => {
                tombstones.insert(&external);
                info!(event = %event_id, external = %external, "Remote event deleted");
                ApplyOutcome::Applied
            }
            Err(e) => ApplyOutcome::Failed(format!("remote delete: {e}")),
        }
    }

    // ========================================================================
    // Remote origin: write into the local store
    // ========================================================================

    fn apply_remote(
        &self,
        action: &SyncAction,
        event_id: EventId,
        state: &mut EngineState,
        tombstones: &mut TombstoneSet,
    ) -> ApplyOutcome {
        match action.kind() {
            ActionKind::Create => self.pull_create(action, event_id, state),
            ActionKind::Update => self.pull_update(action, event_id, state),
            ActionKind::Delete => self.pull_delete(event_id, state, tombstones),
        }
    }

    fn pull_create(
        &self,
        action: &SyncAction,
        event_id: EventId,
        state: &mut EngineState,
    ) -> ApplyOutcome {
        let Some(payload) = action.payload().and_then(|p| p.as_event()).cloned() else {
            return ApplyOutcome::Failed("create action without event payload".to_string());
        };
        let Some(external) = payload.external_id.clone() else {
            return ApplyOutcome::Failed("remote create without external id".to_string());
        };
        let Some(calendar) = payload.calendar_id.clone() else {
            return ApplyOutcome::Failed("remote create without calendar id".to_string());
        };

        // Index hit means the event already exists locally; creating again
        // would duplicate it.
        if state.index().get_by_external(&external).is_some() {
            debug!(external = %external, "Remote create already known locally");
            return ApplyOutcome::Noop;
        }

        let description = ensure_created_annotation(&payload.description, &self.author, Utc::now());
        let mut record = match EventRecord::from_remote(
            event_id,
            payload.title.clone(),
            description,
            payload.start,
            payload.end,
        ) {
            Ok(record) => record,
            Err(e) => return ApplyOutcome::Failed(format!("invalid remote event: {e}")),
        };
        record.set_all_day(payload.all_day);
        record.set_remote_identity(external.normalized(), calendar);
        settle_synced(&mut record);

        state.upsert_event(record);
        info!(event = %event_id, "Remote event materialized locally");
        ApplyOutcome::Applied
    }

    fn pull_update(
        &self,
        action: &SyncAction,
        event_id: EventId,
        state: &mut EngineState,
    ) -> ApplyOutcome {
        let Some(payload) = action.payload().and_then(|p| p.as_event()).cloned() else {
            return ApplyOutcome::Failed("update action without event payload".to_string());
        };

        // A record flagged for the user's attention keeps its content until
        // the user acts on it; the remote copy will be re-detected later.
        if state
            .event(event_id)
            .is_some_and(|r| r.sync_status().needs_attention())
        {
            debug!(event = %event_id, "Record in conflict; remote update not applied");
            return ApplyOutcome::Noop;
        }

        let description = ensure_created_annotation(&payload.description, &self.author, Utc::now());
        let changed = state.modify_event(event_id, |record| {
            record.set_title(payload.title.clone());
            record.set_description(description.clone());
            let _ = record.set_times(payload.start, payload.end);
            record.set_all_day(payload.all_day);
            settle_synced(record);
        });

        if changed {
            ApplyOutcome::Applied
        } else {
            debug!(event = %event_id, "Remote update for a record that no longer exists");
            ApplyOutcome::Noop
        }
    }

    fn pull_delete(
        &self,
        event_id: EventId,
        state: &mut EngineState,
        tombstones: &mut TombstoneSet,
    ) -> ApplyOutcome {
        let Some(record) = state.remove_event(event_id) else {
            return ApplyOutcome::Noop;
        };
        if let Some(external) = record.external_id() {
            tombstones.insert(external);
        }
        info!(event = %event_id, "Local record deleted (remote deleted)");
        ApplyOutcome::Applied
    }

    // ========================================================================
    // Calendar resolution
    // ========================================================================

    /// Resolves the target calendar for a push
    ///
    /// Priority: explicit calendar on the payload, then the tag→calendar
    /// mapping, then the account's default calendar. A tag mapping only
    /// overrides an explicit calendar when the tag is newly added.
    async fn resolve_calendar(
        &self,
        payload: &EventPayload,
        previous: Option<&EventPayload>,
        settings: &SyncSettings,
    ) -> Result<CalendarId, CalendarError> {
        let previous_tags: HashSet<&String> = previous
            .map(|p| p.tags.iter().collect())
            .unwrap_or_default();

        if let Some(explicit) = &payload.calendar_id {
            for tag in payload.tags.iter().filter(|t| !previous_tags.contains(t)) {
                if let Some(mapped) = settings.tag_calendar_map.get(tag) {
                    if mapped != explicit {
                        debug!(tag = %tag, calendar = %mapped, "New tag overrides explicit calendar");
                        return Ok(mapped.clone());
                    }
                }
            }
            return Ok(explicit.clone());
        }

        for tag in &payload.tags {
            if let Some(mapped) = settings.tag_calendar_map.get(tag) {
                return Ok(mapped.clone());
            }
        }

        self.service.default_calendar_id().await
    }
}

/// Forces a record into the Synced status along the legal transitions
fn settle_synced(record: &mut EventRecord) {
    let _ = record.mark_pending();
    let _ = record.mark_synced();
}

/// Builds a partial patch: fields that differ from the previous snapshot,
/// plus the refreshed description
fn build_patch(
    payload: &EventPayload,
    previous: Option<&EventPayload>,
    description: String,
) -> RemoteEventPatch {
    let mut patch = RemoteEventPatch {
        description: Some(description),
        ..RemoteEventPatch::default()
    };
    match previous {
        None => {
            patch.title = Some(payload.title.clone());
            patch.start = Some(payload.start);
            patch.end = Some(payload.end);
            patch.all_day = Some(payload.all_day);
        }
        Some(prev) => {
            if payload.title != prev.title {
                patch.title = Some(payload.title.clone());
            }
            if payload.start != prev.start {
                patch.start = Some(payload.start);
            }
            if payload.end != prev.end {
                patch.end = Some(payload.end);
            }
            if payload.all_day != prev.all_day {
                patch.all_day = Some(payload.all_day);
            }
        }
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn payload(title: &str) -> EventPayload {
        let now = Utc::now();
        EventPayload {
            title: title.to_string(),
            description: String::new(),
            start: now,
            end: now + Duration::hours(1),
            all_day: false,
            tags: Vec::new(),
            calendar_id: None,
            external_id: None,
        }
    }

    #[test]
    fn test_build_patch_without_previous_is_full() {
        let patch = build_patch(&payload("t"), None, "d".to_string());
        assert!(patch.title.is_some());
        assert!(patch.start.is_some());
        assert!(patch.end.is_some());
        assert!(patch.all_day.is_some());
        assert_eq!(patch.description.as_deref(), Some("d"));
    }

    #[test]
    fn test_build_patch_diffs_against_previous() {
        let prev = payload("same");
        let mut next = prev.clone();
        next.start = prev.start + Duration::hours(2);

        let patch = build_patch(&next, Some(&prev), "d".to_string());
        assert!(patch.title.is_none());
        assert!(patch.start.is_some());
        assert!(patch.end.is_none());
        assert!(patch.all_day.is_none());
    }

    #[test]
    fn test_settle_synced_from_any_status() {
        let now = Utc::now();
        let mut record = EventRecord::new("a", "", now, now).unwrap();
        settle_synced(&mut record);
        assert_eq!(
            *record.sync_status(),
            daybook_core::domain::event::SyncStatus::Synced
        );
        // Idempotent from Synced
        settle_synced(&mut record);
        assert_eq!(
            *record.sync_status(),
            daybook_core::domain::event::SyncStatus::Synced
        );
    }
}
