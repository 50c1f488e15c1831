//! Unified client interface
//!
//! The `Store` wires the sync subsystem together from a [`Config`]:
//! - SQLite key-value stores for the task cache and the offline queue
//! - the HTTP remote store
//! - the sync coordinator and the mutation router on top
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::open()?;
//!
//! // Create (queued offline if the server is down)
//! store.router().create_task(TaskPayload::new("Login fails")).await?;
//!
//! // Read the working copy
//! let tasks = store.sync().tasks(&TaskFilter::default()).await;
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::cache::LocalCache;
use crate::config::Config;
use crate::queue::OfflineQueue;
use crate::remote::{HttpRemoteStore, RemoteStore};
use crate::storage::SqliteBlobStore;
use crate::sync::{
    spawn_scheduler, MutationRouter, SchedulerConfig, SchedulerHandle, SyncCoordinator, SyncEvent,
};

/// Entry point for front ends
pub struct Store<R = HttpRemoteStore> {
    sync: Arc<SyncCoordinator<R>>,
    router: MutationRouter<R>,
    events: Option<mpsc::UnboundedReceiver<SyncEvent>>,
    config: Config,
}

impl Store<HttpRemoteStore> {
    /// Open the store from the default configuration
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the store with a specific configuration
    pub fn open_with_config(config: Config) -> Result<Self> {
        let remote = HttpRemoteStore::from_config(&config)?;
        Self::open_with_remote(config, remote)
    }
}

impl<R: RemoteStore + 'static> Store<R> {
    /// Open the store against any remote implementation
    pub fn open_with_remote(config: Config, remote: R) -> Result<Self> {
        let db_path = config.sqlite_path();
        let cache_store = SqliteBlobStore::open(&db_path)
            .with_context(|| format!("Failed to open task cache at {:?}", db_path))?;
        let queue_store = SqliteBlobStore::open(&db_path)
            .with_context(|| format!("Failed to open offline queue at {:?}", db_path))?;

        let cache = LocalCache::open(Box::new(cache_store));
        let queue = OfflineQueue::open(Box::new(queue_store));

        let mut coordinator = SyncCoordinator::new(Arc::new(remote), cache, queue);
        let events = coordinator.take_events();
        let sync = Arc::new(coordinator);

        Ok(Self {
            router: MutationRouter::new(Arc::clone(&sync)),
            sync,
            events,
            config,
        })
    }

    pub fn sync(&self) -> &Arc<SyncCoordinator<R>> {
        &self.sync
    }

    pub fn router(&self) -> &MutationRouter<R> {
        &self.router
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Take the sync event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.events.take()
    }

    /// Start background probing and refreshing on the configured intervals
    pub fn start_scheduler(&self) -> SchedulerHandle {
        spawn_scheduler(Arc::clone(&self.sync), SchedulerConfig::from(&self.config))
    }
}
