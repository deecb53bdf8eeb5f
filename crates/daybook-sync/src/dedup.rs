//! Deduplication
//!
//! A local create racing its own remote echo can leave two local records
//! claiming the same external id. Once per cycle, after all actions have
//! been applied, the deduplicator collapses each such group to the record
//! that synchronized most recently.

use std::collections::HashMap;

use tracing::info;

use daybook_core::domain::newtypes::{EventId, ExternalId};

use crate::state::EngineState;

/// Collapses local records sharing one external id; returns removals
pub fn collapse_duplicates(state: &mut EngineState) -> usize {
    let mut groups: HashMap<ExternalId, Vec<EventId>> = HashMap::new();
    for record in state.events() {
        if let Some(external) = record.external_id() {
            groups
                .entry(external.normalized())
                .or_default()
                .push(record.id());
        }
    }

    let mut removed = 0usize;
    for (external, ids) in groups {
        if ids.len() < 2 {
            continue;
        }

        // Keep the record that synchronized most recently; break ties on
        // local modification time.
        let keep = ids
            .iter()
            .copied()
            .max_by_key(|id| {
                state
                    .event(*id)
                    .map(|r| (r.synchronized_at(), r.updated_at()))
            })
            .expect("group has members");

        for id in ids {
            if id == keep {
                continue;
            }
            state.remove_event(id);
            removed += 1;
        }
        // The removed duplicate may have owned the external mapping;
        // reindex the keeper so the lookup points at it again.
        state.modify_event(keep, |_| {});
        info!(
            external = %external,
            kept = %keep,
            "Collapsed duplicate records for one external id"
        );
    }
    removed
}
