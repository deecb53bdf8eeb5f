//! Change detection
//!
//! Diffs a batch of fetched remote events against the event index and
//! emits remote-origin actions for creates, updates, and deletes.
//!
//! Comparison is content-normalized: provenance annotations and
//! separators are stripped and whitespace collapsed before description
//! equality, and timestamp differences within the jitter threshold are
//! ignored, so annotation churn and clock skew never produce spurious
//! updates.
//!
//! Deletion detection is deliberately narrow: only an entity whose own
//! start time falls inside the current fetch window can be considered
//! deleted by its absence, and even then a recent local touch or an
//! existing tombstone suppresses the signal.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use daybook_core::config::DetectionConfig;
use daybook_core::domain::action::{
    ActionKind, ActionOrigin, ActionPayload, EventPayload, SyncAction,
};
use daybook_core::domain::annotation::normalize_for_comparison;
use daybook_core::domain::event::EventRecord;
use daybook_core::domain::index::EventIndex;
use daybook_core::domain::newtypes::{EventId, ExternalId};
use daybook_core::ports::calendar_service::RemoteEvent;

use crate::fetcher::SyncWindow;
use crate::tombstones::TombstoneSet;
use crate::touched::RecentlyTouchedSet;

/// Diffs remote fetch results against the local index
pub struct ChangeDetector {
    time_jitter: Duration,
    deletion_guard_secs: i64,
}

impl ChangeDetector {
    /// Creates a detector with the configured thresholds
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            time_jitter: Duration::seconds(config.time_jitter_secs),
            deletion_guard_secs: config.deletion_touch_guard_secs,
        }
    }

    /// Emits remote-origin actions for every detected difference
    pub fn detect(
        &self,
        fetched: &[RemoteEvent],
        window: &SyncWindow,
        index: &EventIndex,
        tombstones: &TombstoneSet,
        touched: &RecentlyTouchedSet,
        now: DateTime<Utc>,
    ) -> Vec<SyncAction> {
        let mut actions = Vec::new();

        let mut seen: HashSet<ExternalId> = HashSet::with_capacity(fetched.len());
        for remote in fetched {
            let external = remote.id.normalized();
            seen.insert(external.clone());

            if tombstones.contains(&external) {
                debug!(external = %external, "Skipping tombstoned remote event");
                continue;
            }

            match index.get_by_external(&external) {
                None => actions.push(self.create_action(remote, now)),
                Some(record) => {
                    if self.differs(record, remote) {
                        actions.push(self.update_action(record, remote, now));
                    }
                }
            }
        }

        // Deletions: only entities whose own start time is inside the
        // fetch window can be missed for a reason other than windowing.
        for record in index.records() {
            let Some(external) = record.external_id() else {
                continue;
            };
            let external = external.normalized();
            if !window.contains(record.start()) || seen.contains(&external) {
                continue;
            }
            if tombstones.contains(&external) {
                continue;
            }
            if touched.touched_within(record.id().into(), self.deletion_guard_secs, now) {
                debug!(
                    event = %record.id(),
                    "Missing remote event recently touched locally; not a deletion"
                );
                continue;
            }

            let mut action = SyncAction::new(
                ActionOrigin::Remote,
                ActionKind::Delete,
                record.id().into(),
                None,
                Some(ActionPayload::Event(EventPayload::from_record(record))),
            );
            action.set_timestamp(now);
            actions.push(action);
        }

        debug!(actions = actions.len(), "Change detection completed");
        actions
    }

    /// Returns true if the remote copy differs semantically from the local one
    fn differs(&self, record: &EventRecord, remote: &RemoteEvent) -> bool {
        if record.title() != remote.title {
            return true;
        }
        if normalize_for_comparison(record.description())
            != normalize_for_comparison(&remote.description)
        {
            return true;
        }
        self.significant_delta(record.start(), remote.start)
            || self.significant_delta(record.end(), remote.end)
    }

    /// Only deltas beyond the jitter threshold count as real changes
    fn significant_delta(&self, local: DateTime<Utc>, remote: DateTime<Utc>) -> bool {
        let delta = (local - remote).abs();
        delta > self.time_jitter
    }

    fn create_action(&self, remote: &RemoteEvent, now: DateTime<Utc>) -> SyncAction {
        let mut action = SyncAction::new(
            ActionOrigin::Remote,
            ActionKind::Create,
            EventId::new().into(),
            Some(ActionPayload::Event(payload_from_remote(remote))),
            None,
        );
        action.set_timestamp(remote.updated.unwrap_or(now));
        action
    }

    fn update_action(
        &self,
        record: &EventRecord,
        remote: &RemoteEvent,
        now: DateTime<Utc>,
    ) -> SyncAction {
        let mut action = SyncAction::new(
            ActionOrigin::Remote,
            ActionKind::Update,
            record.id().into(),
            Some(ActionPayload::Event(payload_from_remote(remote))),
            Some(ActionPayload::Event(EventPayload::from_record(record))),
        );
        action.set_timestamp(remote.updated.unwrap_or(now));
        action
    }
}

/// Builds an event payload snapshot from a fetched remote event
pub fn payload_from_remote(remote: &RemoteEvent) -> EventPayload {
    EventPayload {
        title: remote.title.clone(),
        description: remote.description.clone(),
        start: remote.start,
        end: remote.end,
        all_day: remote.all_day,
        tags: Vec::new(),
        calendar_id: Some(remote.calendar_id.clone()),
        external_id: Some(remote.id.normalized()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::config::WindowConfig;
    use daybook_core::domain::annotation::{refresh_edit_annotation, Annotation};
    use daybook_core::domain::newtypes::CalendarId;

    fn detector() -> ChangeDetector {
        ChangeDetector::new(&DetectionConfig::default())
    }

    fn window(now: DateTime<Utc>) -> SyncWindow {
        SyncWindow::select(Some(now), &WindowConfig::default(), now)
    }

    fn remote(id: &str, title: &str, start: DateTime<Utc>) -> RemoteEvent {
        RemoteEvent {
            id: ExternalId::new(id.to_string()).unwrap(),
            calendar_id: CalendarId::new("primary".to_string()).unwrap(),
            title: title.to_string(),
            description: String::new(),
            start,
            end: start + Duration::hours(1),
            all_day: false,
            updated: None,
        }
    }

    fn synced_record(id: &str, title: &str, start: DateTime<Utc>) -> EventRecord {
        let mut record =
            EventRecord::new(title, "", start, start + Duration::hours(1)).unwrap();
        record.set_remote_identity(
            ExternalId::new(id.to_string()).unwrap(),
            CalendarId::new("primary".to_string()).unwrap(),
        );
        record
    }

    fn empty_guards() -> (TombstoneSet, RecentlyTouchedSet) {
        (TombstoneSet::new(1000), RecentlyTouchedSet::new(60))
    }

    #[test]
    fn test_unknown_remote_event_creates() {
        let now = Utc::now();
        let (tombstones, touched) = empty_guards();
        let index = EventIndex::new();

        let actions = detector().detect(
            &[remote("evt_1", "New", now)],
            &window(now),
            &index,
            &tombstones,
            &touched,
            now,
        );

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind(), ActionKind::Create);
        assert_eq!(actions[0].origin(), ActionOrigin::Remote);
    }

    #[test]
    fn test_tombstoned_event_never_resurrects() {
        let now = Utc::now();
        let (mut tombstones, touched) = empty_guards();
        tombstones.insert(&ExternalId::new("evt_1".to_string()).unwrap());
        let index = EventIndex::new();

        let actions = detector().detect(
            &[remote("evt_1", "Deleted already", now)],
            &window(now),
            &index,
            &tombstones,
            &touched,
            now,
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_prefixed_remote_id_matches_local_record() {
        let now = Utc::now();
        let (tombstones, touched) = empty_guards();
        let mut index = EventIndex::new();
        index.upsert(&synced_record("evt_1", "Same", now));

        // Remote echoes the locally-prefixed spelling; no create, no update
        let actions = detector().detect(
            &[remote("daybook-evt_1", "Same", now)],
            &window(now),
            &index,
            &tombstones,
            &touched,
            now,
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_title_change_updates() {
        let now = Utc::now();
        let (tombstones, touched) = empty_guards();
        let record = synced_record("evt_1", "Old title", now);
        let mut index = EventIndex::new();
        index.upsert(&record);

        let actions = detector().detect(
            &[remote("evt_1", "New title", now)],
            &window(now),
            &index,
            &tombstones,
            &touched,
            now,
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind(), ActionKind::Update);
        assert_eq!(actions[0].entity_id(), record.id().into());
        assert!(actions[0].previous().is_some());
    }

    #[test]
    fn test_time_jitter_is_ignored() {
        let now = Utc::now();
        let (tombstones, touched) = empty_guards();
        let mut index = EventIndex::new();
        index.upsert(&synced_record("evt_1", "Same", now));

        let mut shifted = remote("evt_1", "Same", now + Duration::seconds(90));
        shifted.end = now + Duration::hours(1) + Duration::seconds(90);

        let actions = detector().detect(
            &[shifted],
            &window(now),
            &index,
            &tombstones,
            &touched,
            now,
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_significant_time_shift_updates() {
        let now = Utc::now();
        let (tombstones, touched) = empty_guards();
        let mut index = EventIndex::new();
        index.upsert(&synced_record("evt_1", "Same", now));

        let actions = detector().detect(
            &[remote("evt_1", "Same", now + Duration::minutes(3))],
            &window(now),
            &index,
            &tombstones,
            &touched,
            now,
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind(), ActionKind::Update);
    }

    #[test]
    fn test_annotation_churn_is_not_a_change() {
        let now = Utc::now();
        let (tombstones, touched) = empty_guards();
        let mut record = synced_record("evt_1", "Meet", now);
        record.set_description("Notes here");
        let mut index = EventIndex::new();
        index.upsert(&record);

        let mut annotated = remote("evt_1", "Meet", now);
        annotated.description = refresh_edit_annotation("Notes here", "bob", now);
        // Sanity: the remote copy really does carry an annotation block
        assert!(Annotation::parse(annotated.description.lines().last().unwrap()).is_some());

        let actions = detector().detect(
            &[annotated],
            &window(now),
            &index,
            &tombstones,
            &touched,
            now,
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_absent_in_window_deletes() {
        let now = Utc::now();
        let (tombstones, touched) = empty_guards();
        let record = synced_record("evt_1", "Gone", now);
        let mut index = EventIndex::new();
        index.upsert(&record);

        let actions = detector().detect(&[], &window(now), &index, &tombstones, &touched, now);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind(), ActionKind::Delete);
        assert_eq!(actions[0].entity_id(), record.id().into());
    }

    #[test]
    fn test_absent_outside_window_is_not_a_deletion() {
        let now = Utc::now();
        let (tombstones, touched) = empty_guards();
        // Starts well outside the rolling window
        let record = synced_record("evt_1", "Far future", now + Duration::days(300));
        let mut index = EventIndex::new();
        index.upsert(&record);

        let actions = detector().detect(&[], &window(now), &index, &tombstones, &touched, now);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_recent_touch_suppresses_deletion() {
        let now = Utc::now();
        let (tombstones, mut touched) = empty_guards();
        let record = synced_record("evt_1", "Just edited", now);
        touched.note_at(record.id().into(), now - Duration::seconds(10));
        let mut index = EventIndex::new();
        index.upsert(&record);

        let actions = detector().detect(&[], &window(now), &index, &tombstones, &touched, now);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_local_only_records_never_deleted_by_absence() {
        let now = Utc::now();
        let (tombstones, touched) = empty_guards();
        let record = EventRecord::new("Local only", "", now, now + Duration::hours(1)).unwrap();
        let mut index = EventIndex::new();
        index.upsert(&record);

        let actions = detector().detect(&[], &window(now), &index, &tombstones, &touched, now);
        assert!(actions.is_empty());
    }
}
