//! Sync coordinator
//!
//! Drives the reachability probe and the offline-queue drain, and keeps the
//! cache reconciled with the server.
//!
//! ## Phases
//!
//! ```text
//!  Idle/Degraded --probe--> Probing --unreachable-----------------> Idle
//!                                   --reachable, nothing to drain--> Idle
//!                                   --reachable, drain due---------> Syncing
//!  Syncing --all uploaded--> Idle
//!  Syncing --some failed---> Degraded
//! ```
//!
//! A drain is due when the queue is non-empty and either reachability just
//! flipped to `Reachable` or the previous drain left entries behind.
//!
//! The context mutex is never held across a network call. Overlapping probes
//! are coalesced, and drain and refresh share one single-flight guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::state::{
    DrainReport, FailedUpload, Reachability, SyncContext, SyncEvent, SyncPhase,
    SyncStatusSnapshot, Uploaded,
};
use crate::cache::LocalCache;
use crate::models::{Task, TaskFilter, TaskKey};
use crate::queue::{OfflineQueue, QueueEntry};
use crate::remote::{HealthReport, RemoteError, RemoteStore};
use crate::stats::TaskStats;
use crate::storage::StorageError;

/// Result of a reachability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable {
        report: HealthReport,
        /// Set when the probe triggered an automatic drain
        drain: Option<DrainOutcome>,
    },
    Unreachable {
        reason: String,
    },
    /// Another probe was already in flight; no request was made
    Coalesced,
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { .. })
    }
}

/// Result of a drain request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed(DrainReport),
    /// Nothing was queued
    Empty,
    /// A drain or refresh was already running
    AlreadyRunning,
}

/// Result of a cache refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed { tasks: usize },
    /// A drain or refresh was already running
    Skipped,
    Failed(RemoteError),
}

/// Result of an explicit user sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub probe: ProbeOutcome,
    pub drain: Option<DrainOutcome>,
    pub refresh: Option<RefreshOutcome>,
}

/// Clears a single-flight flag when dropped
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owner of the shared sync state
pub struct SyncCoordinator<R> {
    remote: Arc<R>,
    ctx: Mutex<SyncContext>,
    probe_in_flight: AtomicBool,
    /// Shared by drain and refresh
    transfer_in_flight: AtomicBool,
    phase_tx: watch::Sender<SyncPhase>,
    phase_rx: watch::Receiver<SyncPhase>,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SyncEvent>>,
    load_warnings: Vec<String>,
}

impl<R: RemoteStore> SyncCoordinator<R> {
    /// Problems found while loading the queue are published as
    /// `StorageWarning` events and kept for [`load_warnings`](Self::load_warnings).
    pub fn new(remote: Arc<R>, cache: LocalCache, mut queue: OfflineQueue) -> Self {
        let (phase_tx, phase_rx) = watch::channel(SyncPhase::Idle);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let load_error = queue.take_load_error();

        let mut coordinator = Self {
            remote,
            ctx: Mutex::new(SyncContext::new(cache, queue)),
            probe_in_flight: AtomicBool::new(false),
            transfer_in_flight: AtomicBool::new(false),
            phase_tx,
            phase_rx,
            event_tx,
            event_rx: Some(event_rx),
            load_warnings: Vec::new(),
        };
        if let Some(err) = load_error {
            let warning = coordinator.storage_warning("Offline queue was not fully loaded", err);
            coordinator.load_warnings.push(warning);
        }
        coordinator
    }

    /// Warnings raised while opening local storage
    pub fn load_warnings(&self) -> &[String] {
        &self.load_warnings
    }

    /// Take the event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Subscribe to phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase_rx.clone()
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub async fn status(&self) -> SyncStatusSnapshot {
        self.ctx.lock().await.snapshot()
    }

    /// Working copy (snapshot plus pending overlay) matching `filter`
    pub async fn tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let ctx = self.ctx.lock().await;
        ctx.cache
            .working_copy()
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect()
    }

    /// Summary of the working copy matching `filter`, as of today (UTC)
    pub async fn stats(&self, filter: &TaskFilter) -> TaskStats {
        let tasks = self.tasks(filter).await;
        TaskStats::compute(&tasks, Utc::now().date_naive())
    }

    pub async fn find(&self, key: &TaskKey) -> Option<Task> {
        self.ctx.lock().await.cache.find(key).cloned()
    }

    /// Queued creates in upload order
    pub async fn queued(&self) -> Vec<QueueEntry> {
        self.ctx.lock().await.queue.list().to_vec()
    }

    pub(crate) async fn context(&self) -> MutexGuard<'_, SyncContext> {
        self.ctx.lock().await
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Log, publish and return a storage failure as a warning string
    pub(crate) fn storage_warning(&self, what: &str, err: StorageError) -> String {
        let message = match err.recovery_suggestion() {
            Some(hint) => format!("{}: {} {}", what, err, hint),
            None => format!("{}: {}", what, err),
        };
        warn!("{}", message);
        self.emit(SyncEvent::StorageWarning(message.clone()));
        message
    }

    pub(crate) fn set_reachability(&self, ctx: &mut SyncContext, reachability: Reachability) {
        if ctx.reachability == reachability {
            return;
        }
        match reachability {
            Reachability::Unreachable => warn!("Server unreachable, working offline"),
            Reachability::Reachable => info!("Server reachable"),
            Reachability::Checking => debug!("Checking server reachability"),
        }
        ctx.reachability = reachability;
        self.emit(SyncEvent::ReachabilityChanged(reachability));
    }

    fn set_phase(&self, ctx: &mut SyncContext, phase: SyncPhase) {
        if ctx.phase == phase {
            return;
        }
        debug!(from = ?ctx.phase, to = ?phase, "Sync phase changed");
        ctx.phase = phase;
        self.phase_tx.send_replace(phase);
        self.emit(SyncEvent::PhaseChanged(phase));
    }

    /// Ask the server for its health report
    ///
    /// Unlike [`probe`](Self::probe) this leaves reachability untouched and
    /// never uploads anything.
    pub async fn check_health(&self) -> Result<HealthReport, RemoteError> {
        self.remote.probe_health().await
    }

    /// Probe the server and drain the queue if the probe makes one due
    pub async fn probe(&self) -> ProbeOutcome {
        let Some(probe_guard) = FlightGuard::try_acquire(&self.probe_in_flight) else {
            debug!("Probe already in flight, coalescing");
            return ProbeOutcome::Coalesced;
        };

        let (prior_reachability, prior_phase) = {
            let mut ctx = self.ctx.lock().await;
            let prior = (ctx.reachability, ctx.phase);
            // A running drain owns the phase
            if matches!(ctx.phase, SyncPhase::Idle | SyncPhase::Degraded) {
                self.set_phase(&mut ctx, SyncPhase::Probing);
            }
            prior
        };

        let result = self.remote.probe_health().await;

        let mut ctx = self.ctx.lock().await;
        ctx.last_probe = Some(Utc::now());
        let owns_phase = ctx.phase == SyncPhase::Probing;

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                debug!("Probe failed: {}", e);
                self.set_reachability(&mut ctx, Reachability::Unreachable);
                if owns_phase {
                    self.set_phase(&mut ctx, SyncPhase::Idle);
                }
                return ProbeOutcome::Unreachable {
                    reason: e.to_string(),
                };
            }
        };

        let flipped = prior_reachability != Reachability::Reachable;
        self.set_reachability(&mut ctx, Reachability::Reachable);

        let due = !ctx.queue.is_empty() && (flipped || prior_phase == SyncPhase::Degraded);
        if !due {
            if owns_phase {
                self.set_phase(&mut ctx, SyncPhase::Idle);
            }
            return ProbeOutcome::Reachable {
                report,
                drain: None,
            };
        }

        let Some(transfer_guard) = FlightGuard::try_acquire(&self.transfer_in_flight) else {
            // Keep the drain due for the next probe
            if owns_phase {
                self.set_phase(&mut ctx, SyncPhase::Degraded);
            }
            return ProbeOutcome::Reachable {
                report,
                drain: Some(DrainOutcome::AlreadyRunning),
            };
        };
        drop(ctx);
        drop(probe_guard);

        info!("Connection restored, uploading offline tasks");
        let drain = self.run_drain(transfer_guard).await;
        ProbeOutcome::Reachable {
            report,
            drain: Some(drain),
        }
    }

    /// Upload every queued create, in creation order
    pub async fn drain(&self) -> DrainOutcome {
        let Some(guard) = FlightGuard::try_acquire(&self.transfer_in_flight) else {
            debug!("Drain already running");
            return DrainOutcome::AlreadyRunning;
        };
        self.run_drain(guard).await
    }

    async fn run_drain(&self, _guard: FlightGuard<'_>) -> DrainOutcome {
        let entries = {
            let mut ctx = self.ctx.lock().await;
            if ctx.queue.is_empty() {
                if ctx.phase == SyncPhase::Probing || ctx.phase == SyncPhase::Degraded {
                    self.set_phase(&mut ctx, SyncPhase::Idle);
                }
                return DrainOutcome::Empty;
            }
            self.set_phase(&mut ctx, SyncPhase::Syncing);
            ctx.queue.list().to_vec()
        };

        info!(entries = entries.len(), "Draining offline queue");
        let mut report = DrainReport::default();
        let mut saw_unreachable = false;

        for entry in entries {
            match self.remote.create_task(&entry.payload).await {
                Ok(created) => {
                    let uploaded = Uploaded {
                        offline_id: entry.offline_id.clone(),
                        id: created.id,
                        task_id: created.task_id,
                    };
                    debug!(
                        offline_id = %uploaded.offline_id,
                        task_id = %uploaded.task_id,
                        "Uploaded offline task"
                    );

                    // Record each confirmation right away so a crash mid-drain
                    // cannot upload it twice
                    let mut ctx = self.ctx.lock().await;
                    if let Err(e) = ctx
                        .queue
                        .remove_confirmed(std::slice::from_ref(&entry.offline_id))
                    {
                        report
                            .warnings
                            .push(self.storage_warning("Failed to update offline queue", e));
                    }
                    if let Err(e) = ctx.cache.retire_pending(&entry.offline_id) {
                        report
                            .warnings
                            .push(self.storage_warning("Failed to update task cache", e));
                    }
                    drop(ctx);

                    self.emit(SyncEvent::Uploaded(uploaded.clone()));
                    report.succeeded.push(uploaded);
                }
                Err(e) => {
                    warn!(offline_id = %entry.offline_id, "Upload failed: {}", e);
                    saw_unreachable |= e.is_unreachable();
                    let failed = FailedUpload {
                        offline_id: entry.offline_id,
                        title: entry.payload.title,
                        error: e.to_string(),
                        unreachable: e.is_unreachable(),
                    };
                    self.emit(SyncEvent::UploadFailed(failed.clone()));
                    report.failed.push(failed);
                }
            }
        }

        if saw_unreachable {
            let mut ctx = self.ctx.lock().await;
            self.set_reachability(&mut ctx, Reachability::Unreachable);
        }

        // Reconcile with the server's view of what now exists
        let refresh = self.fetch_and_replace().await;
        if let RefreshOutcome::Failed(ref e) = refresh {
            debug!("Post-drain refresh failed: {}", e);
        }

        info!("Drain finished: {}", report.summary());
        let mut ctx = self.ctx.lock().await;
        let next = if report.is_clean() {
            SyncPhase::Idle
        } else {
            SyncPhase::Degraded
        };
        self.set_phase(&mut ctx, next);
        ctx.last_drain = Some(report.clone());
        drop(ctx);

        self.emit(SyncEvent::DrainFinished(report.clone()));
        DrainOutcome::Completed(report)
    }

    /// Fetch the full task list and replace the cache snapshot
    ///
    /// Skipped while a drain is running; the drain refreshes when it ends.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = FlightGuard::try_acquire(&self.transfer_in_flight) else {
            debug!("Transfer in flight, skipping refresh");
            return RefreshOutcome::Skipped;
        };
        self.fetch_and_replace().await
    }

    async fn fetch_and_replace(&self) -> RefreshOutcome {
        match self.remote.fetch_tasks(&TaskFilter::default()).await {
            Ok(tasks) => {
                let count = tasks.len();
                let mut ctx = self.ctx.lock().await;
                if let Err(e) = ctx.cache.replace(tasks) {
                    self.storage_warning("Failed to persist task cache", e);
                }
                ctx.last_refresh = Some(Utc::now());
                drop(ctx);

                debug!(tasks = count, "Task cache refreshed");
                self.emit(SyncEvent::CacheRefreshed { tasks: count });
                RefreshOutcome::Refreshed { tasks: count }
            }
            Err(e) => {
                if e.is_unreachable() {
                    let mut ctx = self.ctx.lock().await;
                    self.set_reachability(&mut ctx, Reachability::Unreachable);
                } else {
                    warn!("Task refresh rejected: {}", e);
                }
                RefreshOutcome::Failed(e)
            }
        }
    }

    /// Explicit user sync: probe, upload anything queued, then refresh
    pub async fn sync_now(&self) -> SyncReport {
        let probe = self.probe().await;
        let mut report = SyncReport {
            probe,
            drain: None,
            refresh: None,
        };

        let reachable = match report.probe {
            ProbeOutcome::Reachable { ref drain, .. } => {
                report.drain = drain.clone();
                true
            }
            ProbeOutcome::Unreachable { .. } => false,
            ProbeOutcome::Coalesced => {
                self.ctx.lock().await.reachability == Reachability::Reachable
            }
        };
        if !reachable {
            return report;
        }

        if report.drain.is_none() && !self.ctx.lock().await.queue.is_empty() {
            report.drain = Some(self.drain().await);
        }
        // A completed drain already refreshed the cache
        if !matches!(report.drain, Some(DrainOutcome::Completed(_))) {
            report.refresh = Some(self.refresh().await);
        }
        report
    }
}
