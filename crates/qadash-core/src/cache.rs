//! Local task cache
//!
//! Mirrors the last task list fetched from the server (the *snapshot*) plus a
//! *pending overlay* of tentative local-only tasks created while offline.
//! Both halves are written together as one blob, so a crash between two
//! writes can never leave a mix of old and new tasks on disk.
//!
//! Every mutating call updates memory first and then persists. When the
//! write fails the in-memory state is kept and the `StorageError` is returned
//! for the caller to surface as a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{OfflineId, Task, TaskKey, TaskPatch};
use crate::storage::{load_json, save_json, BlobStore, StorageResult, CACHE_KEY};

/// On-disk shape of the cache blob
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheBlob {
    snapshot: Vec<Task>,
    #[serde(default)]
    pending: Vec<Task>,
}

/// Persisted mirror of the server's task list
pub struct LocalCache {
    snapshot: Vec<Task>,
    pending: Vec<Task>,
    store: Box<dyn BlobStore>,
}

impl LocalCache {
    /// Open the cache, loading any previously persisted blob
    ///
    /// A corrupted blob is logged and treated as empty.
    pub fn open(store: Box<dyn BlobStore>) -> Self {
        let blob = match load_json::<CacheBlob>(store.as_ref(), CACHE_KEY) {
            Ok(Some(blob)) => blob,
            Ok(None) => CacheBlob::default(),
            Err(e) => {
                warn!("Ignoring unreadable task cache: {}", e);
                CacheBlob::default()
            }
        };
        debug!(
            snapshot = blob.snapshot.len(),
            pending = blob.pending.len(),
            "Loaded task cache"
        );
        Self {
            snapshot: blob.snapshot,
            pending: blob.pending,
            store,
        }
    }

    /// Overwrite the snapshot wholesale with a freshly fetched list
    pub fn replace(&mut self, tasks: Vec<Task>) -> StorageResult<()> {
        self.snapshot = tasks;
        self.persist()
    }

    /// The last snapshot fetched from the server (empty if never fetched)
    pub fn read(&self) -> &[Task] {
        &self.snapshot
    }

    /// Snapshot followed by pending local-only tasks, as the view shows them
    pub fn working_copy(&self) -> Vec<Task> {
        self.snapshot
            .iter()
            .chain(self.pending.iter())
            .cloned()
            .collect()
    }

    /// Tentative tasks still waiting for upload
    pub fn pending(&self) -> &[Task] {
        &self.pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Add a tentative local-only task
    pub fn insert_pending(&mut self, task: Task) -> StorageResult<()> {
        self.pending.push(task);
        self.persist()
    }

    /// Drop the placeholder for an upload that the server confirmed
    ///
    /// Returns whether a placeholder was removed.
    pub fn retire_pending(&mut self, offline_id: &OfflineId) -> StorageResult<bool> {
        let before = self.pending.len();
        self.pending.retain(|t| match t.key() {
            TaskKey::Local(ref id) => id != offline_id,
            TaskKey::Remote(_) => true,
        });
        if self.pending.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Look a task up in the working copy
    pub fn find(&self, key: &TaskKey) -> Option<&Task> {
        self.snapshot
            .iter()
            .chain(self.pending.iter())
            .find(|t| t.key() == *key)
    }

    /// Patch a task in place (offline fallback for updates)
    ///
    /// Returns whether the task was found.
    pub fn apply_local_patch(
        &mut self,
        key: &TaskKey,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let Some(task) = self
            .snapshot
            .iter_mut()
            .chain(self.pending.iter_mut())
            .find(|t| t.key() == *key)
        else {
            return Ok(false);
        };
        task.apply_patch(patch, now);
        self.persist()?;
        Ok(true)
    }

    /// Remove a task from the working copy (offline fallback for deletes)
    ///
    /// Returns whether the task was found.
    pub fn remove_local(&mut self, key: &TaskKey) -> StorageResult<bool> {
        let before = self.snapshot.len() + self.pending.len();
        self.snapshot.retain(|t| t.key() != *key);
        self.pending.retain(|t| t.key() != *key);
        if self.snapshot.len() + self.pending.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn persist(&mut self) -> StorageResult<()> {
        let blob = CacheBlobRef {
            snapshot: &self.snapshot,
            pending: &self.pending,
        };
        save_json(self.store.as_mut(), CACHE_KEY, &blob)
    }
}

/// Borrowing twin of `CacheBlob` so persisting does not clone every task
#[derive(Serialize)]
struct CacheBlobRef<'a> {
    snapshot: &'a [Task],
    pending: &'a [Task],
}
