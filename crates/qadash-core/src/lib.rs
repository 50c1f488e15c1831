//! QA Dashboard Core Library
//!
//! This crate provides the offline-first sync subsystem of the QA task
//! dashboard: it keeps the client working against a local cache while the
//! task server is unreachable, queues task creations, and reconciles with the
//! server once connectivity returns.
//!
//! # Architecture
//!
//! - **Remote store**: CRUD client for the task API (`remote`)
//! - **Local cache**: persisted mirror of the last fetched task list plus
//!   pending local-only tasks (`cache`)
//! - **Offline queue**: durable FIFO of creates made while offline (`queue`)
//! - **Sync**: reachability probing, queue draining, mutation routing and the
//!   background scheduler (`sync`)
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open()?;
//!
//! // Create a task; queued offline if the server is unreachable
//! let report = store.router().create_task(TaskPayload::new("Login fails")).await?;
//! println!("{}", report.outcome.notice());
//!
//! // Explicit sync
//! store.sync().sync_now().await;
//! ```
//!
//! # Modules
//!
//! - `store`: Wires everything together from configuration (main entry point)
//! - `models`: Tasks, payloads, patches and identities
//! - `stats`: Dashboard summary over the cached tasks
//! - `storage`: SQLite-backed key-value blobs
//! - `config`: Application configuration

pub mod cache;
pub mod config;
pub mod models;
pub mod queue;
pub mod remote;
pub mod stats;
pub mod storage;
pub mod store;
pub mod sync;

pub use cache::LocalCache;
pub use config::Config;
pub use models::{
    Assignees, OfflineId, Priority, SyncIdentity, Task, TaskFilter, TaskKey, TaskPatch,
    TaskPayload, TaskStatus,
};
pub use queue::{OfflineQueue, QueueEntry};
pub use remote::{HttpRemoteStore, RemoteError, RemoteStore};
pub use stats::TaskStats;
pub use storage::{StorageError, StorageResult};
pub use store::Store;
pub use sync::{
    MutationError, MutationOutcome, MutationRouter, Reachability, SyncCoordinator, SyncEvent,
    SyncPhase,
};
