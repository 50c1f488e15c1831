//! Mutation router
//!
//! Every user mutation goes through here, and the server is always tried
//! first. When it cannot be reached:
//! - a create is queued and shown as a pending placeholder
//! - an update, delete or status change of a server task patches the cached
//!   copy only and is reported as local-only (it is never uploaded)
//!
//! Server rejections are surfaced and never queued. Mutations of a local-only
//! task touch its placeholder only: its queued payload is not edited, and
//! deleting it hides the placeholder while the queued create still uploads.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use super::coordinator::{RefreshOutcome, SyncCoordinator};
use super::state::Reachability;
use crate::models::{OfflineId, Task, TaskKey, TaskPatch, TaskPayload, TaskStatus};
use crate::remote::{Created, RemoteError, RemoteStore, StatusChange};

/// Why a mutation was not applied anywhere
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// The server refused the request
    #[error("Rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The input failed validation
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// No such task in the working copy
    #[error("Task not found: {0}")]
    NotFound(TaskKey),
}

/// Where a mutation took effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server created the task
    Created(Created),
    /// The server was unreachable; the create waits in the offline queue
    Queued { offline_id: OfflineId },
    /// The server applied the update or delete
    Synced,
    /// The server applied the status change
    StatusChanged(StatusChange),
    /// The server was unreachable; only the cached copy changed
    LocalOnly,
    /// Applied to a local-only task's placeholder
    Tentative,
}

impl MutationOutcome {
    /// User-facing notice
    pub fn notice(&self) -> String {
        match self {
            MutationOutcome::Created(c) => format!("Task {} created", c.task_id),
            MutationOutcome::Queued { offline_id } => {
                format!("Server unreachable, task saved offline as {}", offline_id)
            }
            MutationOutcome::Synced => "Saved".to_string(),
            MutationOutcome::StatusChanged(change) => {
                format!("Status changed from \"{}\" to \"{}\"", change.old, change.new)
            }
            MutationOutcome::LocalOnly => {
                "Server unreachable, change saved locally only (it will not be uploaded)"
                    .to_string()
            }
            MutationOutcome::Tentative => "Updated offline task".to_string(),
        }
    }

    fn is_server_confirmed(&self) -> bool {
        matches!(
            self,
            MutationOutcome::Synced | MutationOutcome::StatusChanged(_)
        )
    }
}

/// Outcome plus any storage warnings hit on the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReport {
    pub outcome: MutationOutcome,
    pub warnings: Vec<String>,
}

impl MutationReport {
    fn new(outcome: MutationOutcome) -> Self {
        Self {
            outcome,
            warnings: Vec::new(),
        }
    }
}

pub type MutationResult = Result<MutationReport, MutationError>;

fn rejected(status: u16, message: String) -> MutationError {
    MutationError::Rejected { status, message }
}

/// Routes user mutations between the server, the queue and the cache
pub struct MutationRouter<R> {
    sync: Arc<SyncCoordinator<R>>,
}

impl<R> Clone for MutationRouter<R> {
    fn clone(&self) -> Self {
        Self {
            sync: Arc::clone(&self.sync),
        }
    }
}

impl<R: RemoteStore> MutationRouter<R> {
    pub fn new(sync: Arc<SyncCoordinator<R>>) -> Self {
        Self { sync }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator<R>> {
        &self.sync
    }

    /// Create a task, queueing it when the server is unreachable
    pub async fn create_task(&self, payload: TaskPayload) -> MutationResult {
        payload.validate().map_err(MutationError::Invalid)?;

        match self.sync.remote().create_task(&payload).await {
            Ok(created) => {
                info!(task_id = %created.task_id, "Task created");
                if let RefreshOutcome::Failed(e) = self.sync.refresh().await {
                    debug!("Refresh after create failed: {}", e);
                }
                Ok(MutationReport::new(MutationOutcome::Created(created)))
            }
            Err(RemoteError::Unreachable { reason }) => {
                debug!("Create unreachable ({}), queueing offline", reason);
                let now = Utc::now();
                let mut ctx = self.sync.context().await;
                self.sync
                    .set_reachability(&mut ctx, Reachability::Unreachable);

                let (entry, persisted) = ctx.queue.enqueue(payload, now);
                let mut report = MutationReport::new(MutationOutcome::Queued {
                    offline_id: entry.offline_id.clone(),
                });
                if let Err(e) = persisted {
                    report
                        .warnings
                        .push(self.sync.storage_warning("Failed to persist offline queue", e));
                }

                let placeholder = Task::placeholder(entry.offline_id.clone(), &entry.payload, now);
                if let Err(e) = ctx.cache.insert_pending(placeholder) {
                    report
                        .warnings
                        .push(self.sync.storage_warning("Failed to persist task cache", e));
                }
                info!(
                    offline_id = %entry.offline_id,
                    queued = ctx.queue.len(),
                    "Task queued offline"
                );
                Ok(report)
            }
            Err(RemoteError::Http { status, message }) => Err(rejected(status, message)),
        }
    }

    /// Apply a partial update
    pub async fn update_task(&self, key: &TaskKey, patch: TaskPatch) -> MutationResult {
        if patch.is_empty() {
            return Err(MutationError::Invalid("nothing to update".to_string()));
        }
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(MutationError::Invalid("title must not be empty".to_string()));
        }

        let id = match key {
            TaskKey::Local(_) => {
                return self
                    .patch_locally(key, &patch, MutationOutcome::Tentative)
                    .await
            }
            TaskKey::Remote(id) => *id,
        };

        match self.sync.remote().update_task(id, &patch).await {
            Ok(()) => self.patch_locally(key, &patch, MutationOutcome::Synced).await,
            Err(RemoteError::Unreachable { .. }) => {
                self.mark_unreachable().await;
                self.patch_locally(key, &patch, MutationOutcome::LocalOnly)
                    .await
            }
            Err(RemoteError::Http { status, message }) => Err(rejected(status, message)),
        }
    }

    /// Delete a task
    pub async fn delete_task(&self, key: &TaskKey) -> MutationResult {
        let outcome = match key {
            TaskKey::Local(_) => MutationOutcome::Tentative,
            TaskKey::Remote(id) => match self.sync.remote().delete_task(*id).await {
                Ok(()) => MutationOutcome::Synced,
                Err(RemoteError::Unreachable { .. }) => {
                    self.mark_unreachable().await;
                    MutationOutcome::LocalOnly
                }
                Err(RemoteError::Http { status, message }) => {
                    return Err(rejected(status, message))
                }
            },
        };

        let mut ctx = self.sync.context().await;
        let mut report = MutationReport::new(outcome);
        match ctx.cache.remove_local(key) {
            Ok(true) => {}
            Ok(false) if report.outcome.is_server_confirmed() => {}
            Ok(false) => return Err(MutationError::NotFound(key.clone())),
            Err(e) => report
                .warnings
                .push(self.sync.storage_warning("Failed to persist task cache", e)),
        }
        Ok(report)
    }

    /// Set a task's status via the dedicated status endpoint
    pub async fn set_status(&self, key: &TaskKey, status: TaskStatus) -> MutationResult {
        let patch = TaskPatch::status(status);
        let id = match key {
            TaskKey::Local(_) => {
                return self
                    .patch_locally(key, &patch, MutationOutcome::Tentative)
                    .await
            }
            TaskKey::Remote(id) => *id,
        };

        match self.sync.remote().set_status(id, status).await {
            Ok(change) => {
                self.patch_locally(key, &patch, MutationOutcome::StatusChanged(change))
                    .await
            }
            Err(RemoteError::Unreachable { .. }) => {
                self.mark_unreachable().await;
                self.patch_locally(key, &patch, MutationOutcome::LocalOnly)
                    .await
            }
            Err(RemoteError::Http { status, message }) => Err(rejected(status, message)),
        }
    }

    /// Mark a task `Deployed`, or restore the status it had before
    pub async fn toggle_done(&self, key: &TaskKey) -> MutationResult {
        let task = self.existing(key).await?;

        let patch = if task.status.is_done() {
            TaskPatch {
                status: Some(task.previous_status.unwrap_or_default()),
                previous_status: task.previous_status,
                ..TaskPatch::default()
            }
        } else {
            TaskPatch {
                status: Some(TaskStatus::Deployed),
                previous_status: Some(task.status),
                ..TaskPatch::default()
            }
        };
        self.update_task(key, patch).await
    }

    /// Advance a task to the next status, wrapping at the end
    pub async fn cycle_status(&self, key: &TaskKey) -> MutationResult {
        let task = self.existing(key).await?;
        self.set_status(key, task.status.next()).await
    }

    async fn existing(&self, key: &TaskKey) -> Result<Task, MutationError> {
        self.sync
            .find(key)
            .await
            .ok_or_else(|| MutationError::NotFound(key.clone()))
    }

    async fn mark_unreachable(&self) {
        let mut ctx = self.sync.context().await;
        self.sync
            .set_reachability(&mut ctx, Reachability::Unreachable);
    }

    async fn patch_locally(
        &self,
        key: &TaskKey,
        patch: &TaskPatch,
        outcome: MutationOutcome,
    ) -> MutationResult {
        let mut ctx = self.sync.context().await;
        let mut report = MutationReport::new(outcome);
        match ctx.cache.apply_local_patch(key, patch, Utc::now()) {
            Ok(true) => {}
            // The server already has it; the next refresh brings it in
            Ok(false) if report.outcome.is_server_confirmed() => {}
            Ok(false) => return Err(MutationError::NotFound(key.clone())),
            Err(e) => report
                .warnings
                .push(self.sync.storage_warning("Failed to persist task cache", e)),
        }
        Ok(report)
    }
}
