//! Mirroring the remote catalog into the local store.
//!
//! A run pages through the remote source in a fixed order, maps each payload
//! into a [`Launch`](crate::models::Launch), and reconciles it against the
//! store:
//!
//! - unknown id: **added**
//! - known id with a different `last_updated`: **updated** (whole row replaced)
//! - known id with the same `last_updated`: **unchanged** (no write)
//!
//! After every page the run's counters and offset are checkpointed in one
//! statement, so an interrupted run picks up at the next page.

pub mod clock;
mod orchestrator;
pub mod reconcile;

pub use clock::{Clock, SystemClock};
pub use orchestrator::{RefreshOutcome, SyncError, SyncOrchestrator, SyncSettings};
pub use reconcile::{map_to_record, classify, Classification, MappingError, PageTally, Reconciler};
