//! Remote store client
//!
//! The task API is reached only through the [`RemoteStore`] trait so the sync
//! coordinator can be driven by in-process fakes in tests. [`HttpRemoteStore`]
//! is the reqwest implementation used by the CLI.
//!
//! Every failure is classified as one of two kinds:
//! - [`RemoteError::Unreachable`]: timeout, refused connection or aborted
//!   transfer. Retryable, and the signal that drives offline routing.
//! - [`RemoteError::Http`]: the server answered with a non-2xx status (or an
//!   unreadable body). Surfaced verbatim and never queued.
//!
//! The client never retries on its own.

pub mod http;
pub mod wire;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Task, TaskFilter, TaskPatch, TaskPayload, TaskStatus};

pub use http::HttpRemoteStore;
pub use wire::{Created, HealthReport, StatusChange};

/// Failure of a remote call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The server could not be reached in time
    #[error("Server unreachable: {reason}")]
    Unreachable { reason: String },

    /// The server answered with an error
    #[error("Server returned {status}: {message}")]
    Http { status: u16, message: String },
}

impl RemoteError {
    pub fn unreachable(reason: impl Into<String>) -> Self {
        RemoteError::Unreachable {
            reason: reason.into(),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, RemoteError::Unreachable { .. })
    }
}

/// Result type for remote calls
pub type RemoteResult<T> = Result<T, RemoteError>;

/// CRUD contract of the backend task API
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `GET /tasks` with the filter as query parameters
    async fn fetch_tasks(&self, filter: &TaskFilter) -> RemoteResult<Vec<Task>>;

    /// `POST /tasks`
    async fn create_task(&self, payload: &TaskPayload) -> RemoteResult<Created>;

    /// `PUT /tasks/{id}` with only the fields present in `patch`
    async fn update_task(&self, id: i64, patch: &TaskPatch) -> RemoteResult<()>;

    /// `PATCH /tasks/{id}/status`
    async fn set_status(&self, id: i64, status: TaskStatus) -> RemoteResult<StatusChange>;

    /// `DELETE /tasks/{id}`
    async fn delete_task(&self, id: i64) -> RemoteResult<()>;

    /// `GET /health` on the short probe timeout
    async fn probe_health(&self) -> RemoteResult<HealthReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let offline = RemoteError::unreachable("connection refused");
        assert!(offline.is_unreachable());
        assert_eq!(offline.to_string(), "Server unreachable: connection refused");

        let rejected = RemoteError::Http {
            status: 400,
            message: "Title is required".to_string(),
        };
        assert!(!rejected.is_unreachable());
        assert_eq!(rejected.to_string(), "Server returned 400: Title is required");
    }
}
