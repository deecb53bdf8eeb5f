//! Daybook Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `EventRecord`, `TaskRecord`, `SyncAction`, `SyncConflict`
//! - **Provenance annotations** - structured parsing of machine-generated
//!   "created by / last edited by" trailers in event descriptions
//! - **Port definitions** - Traits for adapters: `ICalendarService`,
//!   `IEventStore`, `ISyncNotifier`
//! - **Configuration** - typed sync settings with YAML loading
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external
//! dependencies. Ports define trait interfaces that the host application
//! implements. The engine crates (`daybook-sync`, `daybook-conflict`,
//! `daybook-audit`) orchestrate domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
