//! Daybook Sync - Bidirectional event synchronization engine
//!
//! Reconciles the local store of event records with a remote calendar
//! service, tolerating concurrent edits on both sides, unreliable
//! connectivity, and an API that may silently return partial data.
//!
//! ## Modules
//!
//! - [`controller`] - The sync cycle orchestrator
//! - [`scheduler`] - Tick timers driving the cycle and integrity checks
//! - [`queue`] - The ordered action log
//! - [`fetcher`] - Time-windowed remote reads
//! - [`detector`] - Remote change detection against the event index
//! - [`applier`] - Applies one action against the opposite store
//! - [`dedup`] - Collapses duplicate local records per external id
//! - [`tombstones`], [`leases`], [`touched`] - Resurrection, overwrite and
//!   false-deletion guards
//! - [`state`] - Engine-owned records, settings and index

pub mod applier;
pub mod controller;
pub mod dedup;
pub mod detector;
pub mod fetcher;
pub mod leases;
pub mod queue;
pub mod scheduler;
pub mod state;
pub mod tombstones;
pub mod touched;

use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another cycle is already running
    #[error("Sync cycle already in progress")]
    CycleInProgress,

    /// The previous cycle finished too recently
    #[error("Sync cycle throttled; {0} seconds until the next slot")]
    Throttled(i64),

    /// The remote fetch failed in a way that aborts the whole cycle
    #[error("Cycle aborted: {0}")]
    Aborted(String),

    /// A domain-level error propagated from daybook-core
    #[error("Domain error: {0}")]
    Domain(#[from] daybook_core::domain::errors::DomainError),
}
