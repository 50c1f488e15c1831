//! Data models for the QA dashboard
//!
//! Defines the task record, its sync identity, and the payload/patch shapes
//! sent to the task API. Assignees and tags are normalised here so that no
//! other component has to care about how the server or the user spelled them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Workflow status of a task
///
/// Declaration order is the order `cycle_status` walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    #[serde(alias = "New")]
    Unassigned,
    Assigned,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "UAT Completed")]
    UatCompleted,
    Overdue,
    Deprecated,
    Blocked,
    Deployed,
    Rollbacked,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 9] = [
        TaskStatus::Unassigned,
        TaskStatus::Assigned,
        TaskStatus::InProgress,
        TaskStatus::UatCompleted,
        TaskStatus::Overdue,
        TaskStatus::Deprecated,
        TaskStatus::Blocked,
        TaskStatus::Deployed,
        TaskStatus::Rollbacked,
    ];

    /// Label used on the wire and in the UI
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Unassigned => "Unassigned",
            TaskStatus::Assigned => "Assigned",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::UatCompleted => "UAT Completed",
            TaskStatus::Overdue => "Overdue",
            TaskStatus::Deprecated => "Deprecated",
            TaskStatus::Blocked => "Blocked",
            TaskStatus::Deployed => "Deployed",
            TaskStatus::Rollbacked => "Rollbacked",
        }
    }

    /// The status after this one, wrapping around at the end
    pub fn next(&self) -> TaskStatus {
        let idx = Self::ALL.iter().position(|s| s == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Whether this status counts as "done" for undo-completion
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Deployed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|status| {
                status.as_str().eq_ignore_ascii_case(wanted)
                    || status
                        .as_str()
                        .replace(' ', "-")
                        .eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| format!("unknown status '{}'", s))
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Most urgent first
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "Critical",
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    /// Sort rank, most urgent first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Priority::Critical,
            Priority::High,
            Priority::Medium,
            Priority::Low,
        ]
        .into_iter()
        .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| format!("unknown priority '{}'", s))
    }
}

/// Ordered set of assignee identifiers
///
/// Accepts a comma-separated string, a list, or an object whose string
/// values are the names. Whitespace is trimmed, empty names dropped and
/// duplicates removed while keeping first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Assignees(Vec<String>);

impl Assignees {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(normalize_names(names.into_iter().map(Into::into)))
    }

    /// Parse a comma-separated list (the server's storage format)
    pub fn parse(joined: &str) -> Self {
        Self::new(joined.split(','))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn joined(&self) -> String {
        self.0.join(", ")
    }
}

impl<'de> Deserialize<'de> for Assignees {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_name_list(deserializer).map(Assignees)
    }
}

/// Deserialize a list of names from a string, list, object or null
pub(crate) fn deserialize_name_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(names_from_value(value))
}

fn names_from_value(value: serde_json::Value) -> Vec<String> {
    use serde_json::Value;

    let raw: Vec<String> = match value {
        Value::Null => Vec::new(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(_, v)| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        other => vec![other.to_string()],
    };
    normalize_names(raw.into_iter())
}

fn normalize_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Locally generated identity for a task that has not reached the server
///
/// Format: `OFFLINE-<unix millis>-<8 hex chars>`. The millisecond prefix
/// orders ids by creation time; the suffix keeps ids created in the same
/// millisecond distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfflineId(String);

impl OfflineId {
    pub const PREFIX: &'static str = "OFFLINE-";

    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}{}-{}",
            Self::PREFIX,
            now.timestamp_millis(),
            &suffix[..8]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time encoded in the id, if it is well formed
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.0
            .strip_prefix(Self::PREFIX)?
            .split('-')
            .next()?
            .parse()
            .ok()
    }
}

impl fmt::Display for OfflineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OfflineId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with(Self::PREFIX) && s.len() > Self::PREFIX.len() {
            Ok(Self(s.to_string()))
        } else {
            Err(format!("not an offline id: '{}'", s))
        }
    }
}

/// Which system owns a task's identity
///
/// A task has exactly one sync identity at a time: a server-assigned id once
/// it has been persisted remotely, otherwise its offline id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncIdentity {
    Remote { id: i64, task_id: String },
    Local { offline_id: OfflineId },
}

impl SyncIdentity {
    pub fn key(&self) -> TaskKey {
        match self {
            SyncIdentity::Remote { id, .. } => TaskKey::Remote(*id),
            SyncIdentity::Local { offline_id } => TaskKey::Local(offline_id.clone()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, SyncIdentity::Local { .. })
    }
}

/// Lookup key for a task in the working copy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    Remote(i64),
    Local(OfflineId),
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Remote(id) => write!(f, "{}", id),
            TaskKey::Local(offline_id) => write!(f, "{}", offline_id),
        }
    }
}

impl FromStr for TaskKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            return Ok(TaskKey::Remote(id));
        }
        s.parse::<OfflineId>().map(TaskKey::Local)
    }
}

/// A QA work item as held in the local cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub identity: SyncIdentity,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// Status before the task was marked done, for undo-completion
    pub previous_status: Option<TaskStatus>,
    pub priority: Priority,
    pub assignees: Assignees,
    pub start_date: Option<String>,
    pub due_date: Option<String>,
    pub module: Option<String>,
    pub environment: String,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Tentative entry awaiting upload (two-phase commit over the cache)
    #[serde(default)]
    pub pending: bool,
}

impl Task {
    /// Build the tentative local-only record shown while a create is queued
    pub fn placeholder(offline_id: OfflineId, payload: &TaskPayload, now: DateTime<Utc>) -> Self {
        Self {
            identity: SyncIdentity::Local { offline_id },
            title: payload.title.clone(),
            description: payload.description.clone(),
            status: payload.status,
            previous_status: None,
            priority: payload.priority,
            assignees: payload.assignee.clone(),
            start_date: payload.start_date.clone(),
            due_date: payload.due_date.clone(),
            module: payload.module.clone(),
            environment: payload.environment.clone(),
            tags: payload.tags.clone(),
            created_at: Some(now),
            updated_at: Some(now),
            pending: true,
        }
    }

    pub fn key(&self) -> TaskKey {
        self.identity.key()
    }

    pub fn is_local_only(&self) -> bool {
        self.identity.is_local()
    }

    /// Remote id, if the server has assigned one
    pub fn remote_id(&self) -> Option<i64> {
        match self.identity {
            SyncIdentity::Remote { id, .. } => Some(id),
            SyncIdentity::Local { .. } => None,
        }
    }

    /// Past its due date without reaching UAT Completed or Deployed
    ///
    /// A missing or unparseable due date never makes a task overdue.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        if matches!(self.status, TaskStatus::UatCompleted | TaskStatus::Deployed) {
            return false;
        }
        self.due_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
            .is_some_and(|due| due < today)
    }

    /// Human-facing identifier (`QA-...` or the offline id)
    pub fn display_id(&self) -> &str {
        match &self.identity {
            SyncIdentity::Remote { task_id, .. } => task_id,
            SyncIdentity::Local { offline_id } => offline_id.as_str(),
        }
    }

    /// Apply a partial update in place and bump `updated_at`
    pub fn apply_patch(&mut self, patch: &TaskPatch, now: DateTime<Utc>) {
        if let Some(ref title) = patch.title {
            self.title = title.clone();
        }
        if let Some(ref description) = patch.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(previous) = patch.previous_status {
            self.previous_status = Some(previous);
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(ref assignee) = patch.assignee {
            self.assignees = assignee.clone();
        }
        if let Some(ref start) = patch.start_date {
            self.start_date = Some(start.clone());
        }
        if let Some(ref due) = patch.due_date {
            self.due_date = Some(due.clone());
        }
        if let Some(ref module) = patch.module {
            self.module = Some(module.clone());
        }
        if let Some(ref environment) = patch.environment {
            self.environment = environment.clone();
        }
        if let Some(ref tags) = patch.tags {
            self.tags = tags.clone();
        }
        self.updated_at = Some(now);
    }
}

/// Body of a create request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assignee: Assignees,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default, deserialize_with = "deserialize_name_list")]
    pub tags: Vec<String>,
}

impl TaskPayload {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
            priority: Priority::default(),
            assignee: Assignees::default(),
            start_date: None,
            due_date: None,
            module: None,
            environment: default_environment(),
            tags: Vec::new(),
        }
    }

    pub fn with_assignees(mut self, assignees: Assignees) -> Self {
        self.assignee = assignees;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Check the payload before it enters the router
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        Ok(())
    }
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Assignees>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Query filter for `GET /tasks`, also applied locally to the cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub search: Option<String>,
    /// Exact tag, case-insensitive; the server has no such parameter
    pub tag: Option<String>,
}

impl TaskFilter {
    pub fn is_empty(&self) -> bool {
        *self == TaskFilter::default()
    }

    /// Query-string pairs; empty fields are omitted
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(priority) = self.priority {
            pairs.push(("priority", priority.as_str().to_string()));
        }
        if let Some(ref assignee) = self.assignee {
            pairs.push(("assignee", assignee.clone()));
        }
        if let Some(ref search) = self.search {
            pairs.push(("search", search.clone()));
        }
        pairs
    }

    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|s| s != task.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != task.priority) {
            return false;
        }
        if let Some(ref assignee) = self.assignee {
            if !task.assignees.contains(assignee) {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let hit = |s: &str| s.to_lowercase().contains(&needle);
            let found = hit(&task.title)
                || task.description.as_deref().is_some_and(hit)
                || task.module.as_deref().is_some_and(hit)
                || task.tags.iter().any(|t| hit(t.as_str()));
            if !found {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if !task.tags.iter().any(|t| t.trim().eq_ignore_ascii_case(tag.trim())) {
                return false;
            }
        }
        true
    }
}

/// Parse a server timestamp
///
/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` format (UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn default_environment() -> String {
    "QA".to_string()
}
