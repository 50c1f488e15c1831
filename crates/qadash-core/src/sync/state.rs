//! Shared sync state
//!
//! Everything the coordinator and the router both touch lives in one
//! [`SyncContext`], owned by the coordinator behind an async mutex.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::LocalCache;
use crate::models::OfflineId;
use crate::queue::OfflineQueue;

/// Whether the server answered the most recent probe or data call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Reachable,
    Unreachable,
    /// Startup state until the first probe resolves
    Checking,
}

/// Coordinator state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Probing,
    Syncing,
    /// The last drain left entries behind; the next reachable probe retries
    Degraded,
}

/// An entry the server accepted during a drain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Uploaded {
    pub offline_id: OfflineId,
    pub id: i64,
    pub task_id: String,
}

/// An entry that stayed queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUpload {
    pub offline_id: OfflineId,
    pub title: String,
    pub error: String,
    /// Whether the failure was a connectivity problem rather than a rejection
    pub unreachable: bool,
}

/// Per-entry outcome of one drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub succeeded: Vec<Uploaded>,
    pub failed: Vec<FailedUpload>,
    /// Storage problems hit while recording the results
    pub warnings: Vec<String>,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// One-line summary for notices and logs
    pub fn summary(&self) -> String {
        if self.failed.is_empty() {
            format!("{} task(s) uploaded", self.succeeded.len())
        } else {
            format!(
                "{} uploaded, {} failed (will retry)",
                self.succeeded.len(),
                self.failed.len()
            )
        }
    }
}

/// State shared between the coordinator and the router
pub struct SyncContext {
    pub cache: LocalCache,
    pub queue: OfflineQueue,
    pub reachability: Reachability,
    pub phase: SyncPhase,
    pub last_drain: Option<DrainReport>,
    pub last_probe: Option<DateTime<Utc>>,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl SyncContext {
    pub fn new(cache: LocalCache, queue: OfflineQueue) -> Self {
        Self {
            cache,
            queue,
            reachability: Reachability::Checking,
            phase: SyncPhase::Idle,
            last_drain: None,
            last_probe: None,
            last_refresh: None,
        }
    }

    pub fn snapshot(&self) -> SyncStatusSnapshot {
        SyncStatusSnapshot {
            phase: self.phase,
            reachability: self.reachability,
            queued: self.queue.len(),
            cached: self.cache.read().len(),
            pending_placeholders: self.cache.pending_count(),
            last_drain: self.last_drain.clone(),
            last_probe: self.last_probe,
            last_refresh: self.last_refresh,
        }
    }
}

/// Point-in-time view of sync state for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatusSnapshot {
    pub phase: SyncPhase,
    pub reachability: Reachability,
    pub queued: usize,
    pub cached: usize,
    pub pending_placeholders: usize,
    pub last_drain: Option<DrainReport>,
    pub last_probe: Option<DateTime<Utc>>,
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Notices emitted by the coordinator and router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    ReachabilityChanged(Reachability),
    PhaseChanged(SyncPhase),
    /// A queued create reached the server
    Uploaded(Uploaded),
    /// A queued create failed and stays queued
    UploadFailed(FailedUpload),
    DrainFinished(DrainReport),
    CacheRefreshed { tasks: usize },
    /// A local write failed; the change only lives in memory
    StorageWarning(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    #[test]
    fn test_new_context_starts_checking() {
        let ctx = SyncContext::new(
            LocalCache::open(Box::new(MemoryBlobStore::new())),
            OfflineQueue::open(Box::new(MemoryBlobStore::new())),
        );
        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.reachability, Reachability::Checking);
        assert_eq!(snapshot.phase, SyncPhase::Idle);
        assert_eq!(snapshot.queued, 0);
        assert!(snapshot.last_drain.is_none());
    }

    #[test]
    fn test_drain_report_summary() {
        let mut report = DrainReport::default();
        report.succeeded.push(Uploaded {
            offline_id: "OFFLINE-1-aaaaaaaa".parse().unwrap(),
            id: 1,
            task_id: "QA-1".to_string(),
        });
        assert!(report.is_clean());
        assert_eq!(report.summary(), "1 task(s) uploaded");

        report.failed.push(FailedUpload {
            offline_id: "OFFLINE-2-bbbbbbbb".parse().unwrap(),
            title: "B".to_string(),
            error: "Server returned 500: boom".to_string(),
            unreachable: false,
        });
        assert!(!report.is_clean());
        assert_eq!(report.summary(), "1 uploaded, 1 failed (will retry)");
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&SyncPhase::Degraded).unwrap(), "\"degraded\"");
        assert_eq!(
            serde_json::to_string(&Reachability::Checking).unwrap(),
            "\"checking\""
        );
    }
}
