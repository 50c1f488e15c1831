//! Key-value blob stores
//!
//! The cache and the offline queue each persist one serialized blob under a
//! logical key. Every `put` replaces the whole value in a single statement,
//! so a reader never observes half of an old value and half of a new one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::{StorageError, StorageResult};
use super::schema::{init_schema, needs_init};

/// Logical key of the task cache blob
pub const CACHE_KEY: &str = "qa_tasks_cache";

/// Logical key of the offline queue blob
pub const QUEUE_KEY: &str = "qa_offline_tasks";

/// Key under which an unreadable value of `key` is kept for manual recovery
pub fn backup_key(key: &str, at: DateTime<Utc>) -> String {
    format!("{}.corrupt.{}", key, at.timestamp_millis())
}

/// Durable storage for whole serialized values
pub trait BlobStore: Send {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace the value stored under `key`; durable when this returns `Ok`
    fn put(&mut self, key: &str, value: &str) -> StorageResult<()>;
}

/// Load and decode a JSON blob
pub fn load_json<T: DeserializeOwned>(
    store: &dyn BlobStore,
    key: &str,
) -> StorageResult<Option<T>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StorageError::CorruptBlob {
            key: key.to_string(),
            details: e.to_string(),
        })
}

/// Encode and store a JSON blob
pub fn save_json<T: Serialize + ?Sized>(
    store: &mut dyn BlobStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.put(key, &raw)
}

/// SQLite-backed store (`<data_dir>/qadash.db`)
pub struct SqliteBlobStore {
    conn: Connection,
}

impl SqliteBlobStore {
    /// Open (and create if needed) the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        if needs_init(&conn)? {
            init_schema(&conn)?;
        }
        Ok(Self { conn })
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put(&mut self, key: &str, value: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }
}

/// In-memory store shared between clones
///
/// Cloning yields a handle onto the same map, which lets tests "reopen" a
/// store after dropping the component that owned it. Reads and writes can be
/// made to fail to simulate a locked database or a full disk.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail (or succeed again)
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `put` fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw stored value, for assertions
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Overwrite a raw value, bypassing failure injection
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("simulated read failure")));
        }
        Ok(self.raw(key))
    }

    fn put(&mut self, key: &str, value: &str) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed {
                key: key.to_string(),
                details: "simulated write failure".to_string(),
            });
        }
        self.insert_raw(key, value);
        Ok(())
    }
}
