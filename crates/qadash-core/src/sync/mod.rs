//! Offline-first synchronization
//!
//! Keeps the client usable while the task server is unreachable and
//! reconciles once it comes back.
//!
//! ## Flow
//!
//! 1. A mutation goes through the [`MutationRouter`], which tries the server
//!    first
//! 2. If the server is unreachable, creates are queued in the offline queue
//!    and shown as pending placeholders in the cache
//! 3. The [`SyncCoordinator`] probes reachability (on a schedule or on demand)
//!    and drains the queue, one entry at a time, when the server returns
//! 4. After every drain the cache is refreshed from the server
//!
//! ## Usage
//!
//! ```ignore
//! let sync = Arc::new(SyncCoordinator::new(remote, cache, queue));
//! let router = MutationRouter::new(sync.clone());
//! let scheduler = spawn_scheduler(sync.clone(), SchedulerConfig::default());
//! router.create_task(TaskPayload::new("Login fails")).await?;
//! ```

mod coordinator;
mod router;
mod scheduler;
mod state;

#[cfg(test)]
pub(crate) mod fake;

pub use coordinator::{DrainOutcome, ProbeOutcome, RefreshOutcome, SyncCoordinator, SyncReport};
pub use router::{MutationError, MutationOutcome, MutationReport, MutationResult, MutationRouter};
pub use scheduler::{spawn_scheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle};
pub use state::{
    DrainReport, FailedUpload, Reachability, SyncContext, SyncEvent, SyncPhase,
    SyncStatusSnapshot, Uploaded,
};
