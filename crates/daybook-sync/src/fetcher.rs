//! Remote fetcher and sync windows
//!
//! Performs time-windowed reads across every known calendar. Window
//! selection: the first run covers everything since the last known sync
//! and extends into the future horizon; steady state uses a rolling
//! window around now. A fetch that fails with an auth or transport error
//! aborts the whole cycle: an empty-but-valid result is indistinguishable
//! from a broken one, and treating it as "no remote events" would cause
//! mass false deletions.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use daybook_core::config::WindowConfig;
use daybook_core::domain::index::EventIndex;
use daybook_core::ports::calendar_service::{CalendarError, ICalendarService, RemoteEvent};

// ============================================================================
// SyncWindow
// ============================================================================

/// The time range queried from the remote service in one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    /// Inclusive lower bound
    pub start: DateTime<Utc>,
    /// Exclusive upper bound
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Selects the window for the next fetch
    ///
    /// First run (no successful sync recorded) covers
    /// `[last_known_sync, now + first_run_horizon]`; without any last
    /// known sync the lower bound falls back to the rolling window.
    /// Steady state covers `[now - rolling, now + rolling]`.
    pub fn select(
        last_synced_at: Option<DateTime<Utc>>,
        config: &WindowConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let rolling = Duration::days(config.rolling_window_days);
        match last_synced_at {
            None => Self {
                start: now - rolling,
                end: now + Duration::days(config.first_run_horizon_days),
            },
            Some(last) if is_first_run(last, now, config) => Self {
                start: last,
                end: now + Duration::days(config.first_run_horizon_days),
            },
            Some(_) => Self {
                start: now - rolling,
                end: now + rolling,
            },
        }
    }

    /// Returns true if `at` falls inside the window
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// A sync older than the rolling window is treated as a fresh start:
/// the incremental window would miss everything that happened since.
fn is_first_run(last: DateTime<Utc>, now: DateTime<Utc>, config: &WindowConfig) -> bool {
    now.signed_duration_since(last) > Duration::days(config.rolling_window_days)
}

// ============================================================================
// RemoteFetcher
// ============================================================================

/// Reads remote events across every known calendar
pub struct RemoteFetcher {
    service: Arc<dyn ICalendarService>,
}

impl RemoteFetcher {
    /// Creates a fetcher over the calendar service port
    pub fn new(service: Arc<dyn ICalendarService>) -> Self {
        Self { service }
    }

    /// Fetches all events in the window, tagged with their calendar id
    ///
    /// # Errors
    /// Propagates [`CalendarError`]; the caller aborts the cycle when
    /// [`CalendarError::aborts_cycle`] holds.
    pub async fn fetch(&self, window: &SyncWindow) -> Result<Vec<RemoteEvent>, CalendarError> {
        if !self.service.is_signed_in().await {
            return Err(CalendarError::AuthRequired(
                "no signed-in calendar session".to_string(),
            ));
        }

        let calendars = self.service.list_calendars().await?;
        debug!(calendars = calendars.len(), "Fetching remote events");

        let mut events = Vec::new();
        for calendar in &calendars {
            let mut batch = self
                .service
                .fetch_events(&calendar.id, window.start, window.end)
                .await?;
            debug!(calendar = %calendar.id, events = batch.len(), "Calendar fetched");
            events.append(&mut batch);
        }

        info!(
            events = events.len(),
            start = %window.start,
            end = %window.end,
            "Remote fetch completed"
        );
        Ok(events)
    }
}

/// Heuristic: zero remote events while the local store holds synced
/// entities is presumed a transient auth/network fault, not true remote
/// emptiness. The cycle must abort instead of inferring mass deletion.
pub fn presumed_partial(events: &[RemoteEvent], index: &EventIndex) -> bool {
    let partial = events.is_empty() && index.has_synced_records();
    if partial {
        warn!(
            local_synced = index.records().filter(|r| r.external_id().is_some()).count(),
            "Remote fetch returned zero events while synced local records exist; aborting cycle"
        );
    }
    partial
}
