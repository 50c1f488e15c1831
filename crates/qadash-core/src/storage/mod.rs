//! Storage layer
//!
//! Durable local state for the sync subsystem.
//!
//! ## Architecture
//!
//! - **Key-value blobs**: the task cache and the offline queue are each one
//!   JSON value under a logical key (`qa_tasks_cache`, `qa_offline_tasks`)
//! - **SQLite**: the default backing store, one upsert per write
//! - **Memory**: shared in-process store used by tests

pub mod error;
pub mod kv;
pub mod schema;

pub use error::{StorageError, StorageResult};
pub use kv::{
    backup_key, load_json, save_json, BlobStore, MemoryBlobStore, SqliteBlobStore, CACHE_KEY,
    QUEUE_KEY,
};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
