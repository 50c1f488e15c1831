//! Offline queue
//!
//! Durable, ordered list of task creations recorded while the server was
//! unreachable. Entries are only ever appended or removed as a whole; they are
//! never reordered, merged or edited in place.
//!
//! The stored blob is never overwritten with less than it held. When it
//! cannot be decoded, the readable entries are kept and the raw value is
//! copied to a backup key before the first write. When it cannot be read at
//! all, it is read again and merged before the first write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{OfflineId, TaskPayload};
use crate::storage::{backup_key, save_json, BlobStore, StorageError, StorageResult, QUEUE_KEY};

/// A create mutation waiting for the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub offline_id: OfflineId,
    pub created_at: DateTime<Utc>,
    pub payload: TaskPayload,
}

impl QueueEntry {
    pub fn new(payload: TaskPayload, now: DateTime<Utc>) -> Self {
        Self {
            offline_id: OfflineId::generate(now),
            created_at: now,
            payload,
        }
    }
}

/// What has to succeed before the stored blob may be replaced
#[derive(Debug)]
enum WriteGuard {
    Clear,
    /// Copy the undecodable blob to `key` first
    Backup { key: String, raw: String },
    /// The blob could not be read; read and merge it first
    Reload,
}

/// Persisted FIFO of pending creates
pub struct OfflineQueue {
    entries: Vec<QueueEntry>,
    store: Box<dyn BlobStore>,
    guard: WriteGuard,
    load_error: Option<StorageError>,
}

impl OfflineQueue {
    /// Open the queue, loading any persisted entries
    ///
    /// Never fails. Problems with the stored blob are logged and kept for
    /// [`take_load_error`](Self::take_load_error).
    pub fn open(store: Box<dyn BlobStore>) -> Self {
        let mut queue = Self {
            entries: Vec::new(),
            store,
            guard: WriteGuard::Clear,
            load_error: None,
        };

        match queue.store.get(QUEUE_KEY) {
            Ok(None) => {}
            Ok(Some(raw)) => {
                queue.entries = queue.absorb(raw);
                if let Err(e) = queue.release_guard() {
                    warn!("Could not back up the offline queue yet: {}", e);
                }
            }
            Err(e) => {
                warn!("Could not read offline queue, will retry before writing: {}", e);
                queue.guard = WriteGuard::Reload;
                queue.load_error = Some(e);
            }
        }

        debug!(entries = queue.entries.len(), "Loaded offline queue");
        queue
    }

    /// Problem found while loading the stored queue, if any
    pub fn take_load_error(&mut self) -> Option<StorageError> {
        self.load_error.take()
    }

    /// Append a new entry for `payload`
    ///
    /// The entry is always kept in memory; the second value reports whether
    /// it also reached durable storage.
    pub fn enqueue(
        &mut self,
        payload: TaskPayload,
        now: DateTime<Utc>,
    ) -> (QueueEntry, StorageResult<()>) {
        let entry = QueueEntry::new(payload, now);
        self.entries.push(entry.clone());
        debug!(
            offline_id = %entry.offline_id,
            queued = self.entries.len(),
            "Queued offline create"
        );
        (entry, self.persist())
    }

    /// All entries in creation order
    pub fn list(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn get(&self, offline_id: &OfflineId) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| &e.offline_id == offline_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Replace the whole queue
    pub fn replace_all(&mut self, entries: Vec<QueueEntry>) -> StorageResult<()> {
        self.entries = entries;
        self.persist()
    }

    /// Drop the entries the server has confirmed, keeping everything else
    /// (including entries appended after the confirmations were collected)
    /// in its original order
    pub fn remove_confirmed(&mut self, confirmed: &[OfflineId]) -> StorageResult<()> {
        let remaining = self
            .entries
            .iter()
            .filter(|e| !confirmed.contains(&e.offline_id))
            .cloned()
            .collect();
        self.replace_all(remaining)
    }

    fn persist(&mut self) -> StorageResult<()> {
        self.release_guard()?;
        save_json(self.store.as_mut(), QUEUE_KEY, self.entries.as_slice())
    }

    /// Decode a stored blob, arming a backup when any of it is unreadable
    fn absorb(&mut self, raw: String) -> Vec<QueueEntry> {
        let (entries, problem) = decode_entries(&raw);
        if let Some(details) = problem {
            let key = backup_key(QUEUE_KEY, Utc::now());
            warn!(kept = entries.len(), "Offline queue is partly unreadable: {}", details);
            self.load_error = Some(StorageError::CorruptBlobBackedUp {
                key: QUEUE_KEY.to_string(),
                backup_key: key.clone(),
                details,
            });
            self.guard = WriteGuard::Backup { key, raw };
        }
        entries
    }

    fn release_guard(&mut self) -> StorageResult<()> {
        match std::mem::replace(&mut self.guard, WriteGuard::Clear) {
            WriteGuard::Clear => Ok(()),
            WriteGuard::Backup { key, raw } => {
                if let Err(e) = self.store.put(&key, &raw) {
                    self.guard = WriteGuard::Backup { key, raw };
                    return Err(e);
                }
                info!(backup = %key, "Kept a copy of the unreadable offline queue");
                Ok(())
            }
            WriteGuard::Reload => {
                let raw = match self.store.get(QUEUE_KEY) {
                    Ok(raw) => raw,
                    Err(e) => {
                        self.guard = WriteGuard::Reload;
                        return Err(e);
                    }
                };
                let Some(raw) = raw else {
                    return Ok(());
                };
                // Stored entries predate anything queued since open
                let mut merged = self.absorb(raw);
                for entry in std::mem::take(&mut self.entries) {
                    if !merged.iter().any(|e| e.offline_id == entry.offline_id) {
                        merged.push(entry);
                    }
                }
                info!(entries = merged.len(), "Merged stored offline queue");
                self.entries = merged;
                self.release_guard()
            }
        }
    }
}

/// Decode a stored queue, keeping every entry that can still be read
///
/// The second value describes what was skipped, if anything.
fn decode_entries(raw: &str) -> (Vec<QueueEntry>, Option<String>) {
    let values: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(values) => values,
        Err(e) => return (Vec::new(), Some(e.to_string())),
    };

    let total = values.len();
    let mut entries = Vec::with_capacity(total);
    let mut first_error = None;
    for value in values {
        match serde_json::from_value::<QueueEntry>(value) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    let problem = first_error.map(|e| {
        format!("{} of {} entries unreadable ({})", total - entries.len(), total, e)
    });
    (entries, problem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Assignees;
    use crate::storage::MemoryBlobStore;
    use chrono::Duration;

    fn titles(queue: &OfflineQueue) -> Vec<String> {
        queue.list().iter().map(|e| e.payload.title.clone()).collect()
    }

    #[test]
    fn test_enqueue_keeps_creation_order() {
        let mut queue = OfflineQueue::open(Box::new(MemoryBlobStore::new()));
        assert!(queue.is_empty());

        let start = Utc::now();
        for (i, title) in ["A", "B", "C"].iter().enumerate() {
            let (_, persisted) =
                queue.enqueue(TaskPayload::new(*title), start + Duration::milliseconds(i as i64));
            persisted.unwrap();
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(titles(&queue), ["A", "B", "C"]);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let store = MemoryBlobStore::new();
        let entry = {
            let mut queue = OfflineQueue::open(Box::new(store.clone()));
            let payload = TaskPayload::new("Login fails").with_assignees(Assignees::new(["Rahul"]));
            let (entry, persisted) = queue.enqueue(payload, Utc::now());
            persisted.unwrap();
            entry
        };

        let queue = OfflineQueue::open(Box::new(store.clone()));
        assert_eq!(queue.get(&entry.offline_id), Some(&entry));

        let raw = store.raw(QUEUE_KEY).unwrap();
        assert!(raw.contains("\"offlineId\""));
        assert!(raw.contains("\"createdAt\""));
    }

    #[test]
    fn test_failed_write_keeps_entry_in_memory() {
        let store = MemoryBlobStore::new();
        let mut queue = OfflineQueue::open(Box::new(store.clone()));

        store.set_fail_writes(true);
        let (entry, persisted) = queue.enqueue(TaskPayload::new("offline"), Utc::now());
        assert!(persisted.is_err());
        assert!(queue.get(&entry.offline_id).is_some());
        assert!(store.raw(QUEUE_KEY).is_none());
    }

    #[test]
    fn test_remove_confirmed_keeps_others_in_order() {
        let mut queue = OfflineQueue::open(Box::new(MemoryBlobStore::new()));
        let now = Utc::now();
        let (a, _) = queue.enqueue(TaskPayload::new("A"), now);
        let (_, _) = queue.enqueue(TaskPayload::new("B"), now);
        let (c, _) = queue.enqueue(TaskPayload::new("C"), now);
        let (_, _) = queue.enqueue(TaskPayload::new("D"), now);

        queue.remove_confirmed(&[a.offline_id, c.offline_id]).unwrap();
        assert_eq!(titles(&queue), ["B", "D"]);

        queue.replace_all(Vec::new()).unwrap();
        assert!(queue.is_empty());
    }

    /// Stored blob with a readable entry titled `kept` and an entry titled
    /// `dropped` whose status this build cannot decode
    fn blob_with_unknown_status(kept: &str, dropped: &str) -> String {
        let now = Utc::now();
        let good = serde_json::to_value(QueueEntry::new(TaskPayload::new(kept), now)).unwrap();
        let mut bad =
            serde_json::to_value(QueueEntry::new(TaskPayload::new(dropped), now)).unwrap();
        bad["payload"]["status"] = serde_json::json!("Done");
        serde_json::to_string(&vec![good, bad]).unwrap()
    }

    fn backup_of(err: &StorageError) -> String {
        match err {
            StorageError::CorruptBlobBackedUp { backup_key, .. } => backup_key.clone(),
            other => panic!("expected a backed-up corruption, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_blob_opens_empty() {
        let store = MemoryBlobStore::new();
        store.insert_raw(QUEUE_KEY, "[{\"offlineId\": 3}]");
        let mut queue = OfflineQueue::open(Box::new(store.clone()));
        assert!(queue.is_empty());

        let backup = backup_of(&queue.take_load_error().unwrap());
        assert_eq!(store.raw(&backup).as_deref(), Some("[{\"offlineId\": 3}]"));
        assert!(queue.take_load_error().is_none());
    }

    #[test]
    fn test_unreadable_entry_survives_next_enqueue() {
        let store = MemoryBlobStore::new();
        let original = blob_with_unknown_status("still here", "keep me");
        store.insert_raw(QUEUE_KEY, &original);

        let mut queue = OfflineQueue::open(Box::new(store.clone()));
        assert_eq!(titles(&queue), ["still here"]);
        let err = queue.take_load_error().unwrap();
        assert!(err.to_string().contains("1 of 2 entries unreadable"));

        let (_, persisted) = queue.enqueue(TaskPayload::new("new"), Utc::now());
        persisted.unwrap();

        assert_eq!(store.raw(&backup_of(&err)), Some(original));
        let reopened = OfflineQueue::open(Box::new(store.clone()));
        assert_eq!(titles(&reopened), ["still here", "new"]);
    }

    #[test]
    fn test_failed_backup_blocks_overwrite() {
        let store = MemoryBlobStore::new();
        let original = blob_with_unknown_status("a", "keep me");
        store.insert_raw(QUEUE_KEY, &original);
        store.set_fail_writes(true);

        let mut queue = OfflineQueue::open(Box::new(store.clone()));
        let (_, persisted) = queue.enqueue(TaskPayload::new("new"), Utc::now());
        assert!(persisted.is_err());
        assert_eq!(store.raw(QUEUE_KEY).as_deref(), Some(original.as_str()));

        store.set_fail_writes(false);
        queue.remove_confirmed(&[]).unwrap();
        let backup = backup_of(&queue.take_load_error().unwrap());
        assert_eq!(store.raw(&backup), Some(original));
        assert_eq!(titles(&queue), ["a", "new"]);
    }

    #[test]
    fn test_unreadable_store_is_merged_before_write() {
        let store = MemoryBlobStore::new();
        {
            let mut queue = OfflineQueue::open(Box::new(store.clone()));
            queue.enqueue(TaskPayload::new("older"), Utc::now()).1.unwrap();
        }

        store.set_fail_reads(true);
        let mut queue = OfflineQueue::open(Box::new(store.clone()));
        assert!(queue.is_empty());
        assert!(matches!(queue.take_load_error(), Some(StorageError::Io(_))));

        let (_, persisted) = queue.enqueue(TaskPayload::new("newer"), Utc::now());
        assert!(persisted.is_err());

        store.set_fail_reads(false);
        let (_, persisted) = queue.enqueue(TaskPayload::new("newest"), Utc::now());
        persisted.unwrap();
        assert_eq!(titles(&queue), ["older", "newer", "newest"]);
        assert_eq!(
            titles(&OfflineQueue::open(Box::new(store))),
            ["older", "newer", "newest"]
        );
    }
}
