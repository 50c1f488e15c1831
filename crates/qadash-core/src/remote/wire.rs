//! Wire formats of the task API
//!
//! The server stores assignees and tags as comma-joined strings and reports
//! timestamps in SQLite's `CURRENT_TIMESTAMP` format. Everything is converted
//! into the typed models here, leniently: an unknown status or priority label
//! falls back to the default instead of failing the whole fetch.

use serde::{Deserialize, Serialize};

use crate::models::{
    deserialize_name_list, parse_timestamp, Assignees, Priority, SyncIdentity, Task, TaskStatus,
};

/// `{success, data}` envelope used by most endpoints
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    pub data: T,
}

/// Bare acknowledgement (`PUT`, `DELETE`)
#[derive(Debug, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body of a non-2xx response
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Identity assigned by the server to a newly created task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created {
    pub id: i64,
    pub task_id: String,
}

/// Response of `PATCH /tasks/{id}/status`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    #[serde(default)]
    pub old_status: Option<String>,
    #[serde(default)]
    pub new_status: Option<String>,
}

/// Status transition confirmed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub old: TaskStatus,
    pub new: TaskStatus,
}

impl StatusChange {
    /// Build from the server's labels, falling back to the requested status
    pub fn from_body(body: StatusBody, requested: TaskStatus) -> Self {
        Self {
            old: lenient_status(body.old_status.as_deref()),
            new: body
                .new_status
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(requested),
        }
    }
}

/// Response of `GET /health`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub security: Option<String>,
    #[serde(default)]
    pub external_access: bool,
    #[serde(default)]
    pub version: Option<String>,
}

/// Task row as returned by `GET /tasks`
#[derive(Debug, Deserialize)]
pub struct RemoteTask {
    pub id: i64,
    #[serde(default)]
    pub task_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub previous_status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assignee: Assignees,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default, deserialize_with = "deserialize_name_list")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl RemoteTask {
    pub fn into_task(self) -> Task {
        // Rows created before task_id existed are labelled like the dashboard does
        let task_id = self
            .task_id
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("QA-{:03}", self.id));

        Task {
            identity: SyncIdentity::Remote {
                id: self.id,
                task_id,
            },
            title: self.title,
            description: self.description,
            status: lenient_status(self.status.as_deref()),
            previous_status: self.previous_status.as_deref().and_then(|s| s.parse().ok()),
            priority: self
                .priority
                .as_deref()
                .and_then(|p| p.parse::<Priority>().ok())
                .unwrap_or_default(),
            assignees: self.assignee,
            start_date: self.start_date.filter(|d| !d.is_empty()),
            due_date: self.due_date.filter(|d| !d.is_empty()),
            module: self.module,
            environment: self
                .environment
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "QA".to_string()),
            tags: self.tags,
            created_at: self.created_at.as_deref().and_then(parse_timestamp),
            updated_at: self.updated_at.as_deref().and_then(parse_timestamp),
            pending: false,
        }
    }
}

fn lenient_status(label: Option<&str>) -> TaskStatus {
    label.and_then(|s| s.parse().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_task_conversion() {
        let raw = r#"{
            "id": 42,
            "task_id": "QA-AB12",
            "title": "Login fails",
            "description": null,
            "status": "In Progress",
            "previous_status": null,
            "priority": "High",
            "assignee": "Rahul,Suraj",
            "start_date": "2026-01-05",
            "due_date": null,
            "module": "Auth",
            "environment": "UAT",
            "tags": ["smoke", "login"],
            "created_at": "2026-01-05 09:30:00",
            "updated_at": "2026-01-06 10:00:00"
        }"#;
        let task = serde_json::from_str::<RemoteTask>(raw).unwrap().into_task();

        assert_eq!(task.remote_id(), Some(42));
        assert_eq!(task.display_id(), "QA-AB12");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.assignees.as_slice(), ["Rahul", "Suraj"]);
        assert_eq!(task.tags, ["smoke", "login"]);
        assert_eq!(task.environment, "UAT");
        assert!(task.created_at.is_some());
        assert!(!task.pending);
    }

    #[test]
    fn test_sparse_row_uses_defaults() {
        let raw = r#"{"id": 7, "title": "Old row", "status": "New", "assignee": null, "tags": ""}"#;
        let task = serde_json::from_str::<RemoteTask>(raw).unwrap().into_task();

        assert_eq!(task.display_id(), "QA-007");
        assert_eq!(task.status, TaskStatus::Unassigned);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.environment, "QA");
        assert!(task.assignees.is_empty());
        assert!(task.tags.is_empty());
    }

    #[test]
    fn test_status_change_falls_back_to_requested() {
        let body: StatusBody =
            serde_json::from_str(r#"{"success": true, "oldStatus": "Assigned"}"#).unwrap();
        let change = StatusChange::from_body(body, TaskStatus::Blocked);
        assert_eq!(change.old, TaskStatus::Assigned);
        assert_eq!(change.new, TaskStatus::Blocked);
    }

    #[test]
    fn test_health_report_fields() {
        let raw = r#"{"status": "OK", "database": "SQLite (Local)", "externalAccess": false, "version": "1.0.0"}"#;
        let report: HealthReport = serde_json::from_str(raw).unwrap();
        assert_eq!(report.status, "OK");
        assert_eq!(report.version.as_deref(), Some("1.0.0"));
        assert!(!report.external_access);
    }
}
