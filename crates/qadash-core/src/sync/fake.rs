//! Scriptable in-process remote store for tests

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{SyncIdentity, Task, TaskFilter, TaskKey, TaskPatch, TaskPayload, TaskStatus};
use crate::remote::{Created, HealthReport, RemoteError, RemoteResult, RemoteStore, StatusChange};

#[derive(Default)]
struct FakeState {
    /// Probe answers consumed in order; afterwards `online` decides
    probe_script: VecDeque<bool>,
    offline: bool,
    reject_titles: HashSet<String>,
    unreachable_titles: HashSet<String>,
    create_delay: Option<Duration>,
    server_tasks: Vec<Task>,
    created: Vec<TaskPayload>,
    updates: Vec<(i64, TaskPatch)>,
    status_calls: Vec<(i64, TaskStatus)>,
    deletes: Vec<i64>,
    next_id: i64,
    probes: usize,
    fetches: usize,
}

pub(crate) struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 1,
                ..FakeState::default()
            }),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Make every call fail as unreachable (or succeed again)
    pub fn set_offline(&self, offline: bool) {
        self.with(|s| s.offline = offline);
    }

    pub fn script_probes(&self, answers: &[bool]) {
        self.with(|s| s.probe_script = answers.iter().copied().collect());
    }

    /// Creates with this title are answered with HTTP 500
    pub fn reject(&self, title: &str) {
        self.with(|s| s.reject_titles.insert(title.to_string()));
    }

    pub fn accept(&self, title: &str) {
        self.with(|s| {
            s.reject_titles.remove(title);
            s.unreachable_titles.remove(title);
        });
    }

    /// Creates with this title time out
    pub fn drop_connection_for(&self, title: &str) {
        self.with(|s| s.unreachable_titles.insert(title.to_string()));
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.with(|s| s.create_delay = Some(delay));
    }

    pub fn seed(&self, tasks: Vec<Task>) {
        self.with(|s| {
            s.next_id = tasks.iter().filter_map(Task::remote_id).max().unwrap_or(0) + 1;
            s.server_tasks = tasks;
        });
    }

    pub fn created_titles(&self) -> Vec<String> {
        self.with(|s| s.created.iter().map(|p| p.title.clone()).collect())
    }

    pub fn created_payloads(&self) -> Vec<TaskPayload> {
        self.with(|s| s.created.clone())
    }

    pub fn updates(&self) -> Vec<(i64, TaskPatch)> {
        self.with(|s| s.updates.clone())
    }

    pub fn status_calls(&self) -> Vec<(i64, TaskStatus)> {
        self.with(|s| s.status_calls.clone())
    }

    pub fn deletes(&self) -> Vec<i64> {
        self.with(|s| s.deletes.clone())
    }

    pub fn probe_count(&self) -> usize {
        self.with(|s| s.probes)
    }

    pub fn fetch_count(&self) -> usize {
        self.with(|s| s.fetches)
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.with(|s| s.offline) {
            return Err(RemoteError::unreachable("connection refused"));
        }
        Ok(())
    }
}

/// A server-side task as the fake stores it
pub(crate) fn server_task(id: i64, payload: &TaskPayload) -> Task {
    let mut task = Task::placeholder(
        crate::models::OfflineId::generate(Utc::now()),
        payload,
        Utc::now(),
    );
    task.identity = SyncIdentity::Remote {
        id,
        task_id: format!("QA-{}", id),
    };
    task.pending = false;
    task
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn fetch_tasks(&self, filter: &TaskFilter) -> RemoteResult<Vec<Task>> {
        self.with(|s| s.fetches += 1);
        self.check_online()?;
        Ok(self.with(|s| {
            s.server_tasks
                .iter()
                .filter(|t| filter.matches(t))
                .cloned()
                .collect()
        }))
    }

    async fn create_task(&self, payload: &TaskPayload) -> RemoteResult<Created> {
        if let Some(delay) = self.with(|s| s.create_delay) {
            tokio::time::sleep(delay).await;
        }
        self.check_online()?;
        self.with(|s| {
            if s.unreachable_titles.contains(&payload.title) {
                return Err(RemoteError::unreachable("request timed out"));
            }
            if s.reject_titles.contains(&payload.title) {
                return Err(RemoteError::Http {
                    status: 500,
                    message: "Failed to create task".to_string(),
                });
            }
            let id = s.next_id;
            s.next_id += 1;
            s.created.push(payload.clone());
            s.server_tasks.push(server_task(id, payload));
            Ok(Created {
                id,
                task_id: format!("QA-{}", id),
            })
        })
    }

    async fn update_task(&self, id: i64, patch: &TaskPatch) -> RemoteResult<()> {
        self.check_online()?;
        self.with(|s| {
            let task = s
                .server_tasks
                .iter_mut()
                .find(|t| t.key() == TaskKey::Remote(id))
                .ok_or_else(|| RemoteError::Http {
                    status: 404,
                    message: "Task not found".to_string(),
                })?;
            task.apply_patch(patch, Utc::now());
            s.updates.push((id, patch.clone()));
            Ok(())
        })
    }

    async fn set_status(&self, id: i64, status: TaskStatus) -> RemoteResult<StatusChange> {
        self.check_online()?;
        self.with(|s| {
            let task = s
                .server_tasks
                .iter_mut()
                .find(|t| t.key() == TaskKey::Remote(id))
                .ok_or_else(|| RemoteError::Http {
                    status: 404,
                    message: "Task not found".to_string(),
                })?;
            let old = task.status;
            task.status = status;
            s.status_calls.push((id, status));
            Ok(StatusChange { old, new: status })
        })
    }

    async fn delete_task(&self, id: i64) -> RemoteResult<()> {
        self.check_online()?;
        self.with(|s| {
            let before = s.server_tasks.len();
            s.server_tasks.retain(|t| t.key() != TaskKey::Remote(id));
            if s.server_tasks.len() == before {
                return Err(RemoteError::Http {
                    status: 404,
                    message: "Task not found".to_string(),
                });
            }
            s.deletes.push(id);
            Ok(())
        })
    }

    async fn probe_health(&self) -> RemoteResult<HealthReport> {
        let reachable = self.with(|s| {
            s.probes += 1;
            s.probe_script.pop_front().unwrap_or(!s.offline)
        });
        if !reachable {
            return Err(RemoteError::unreachable("request timed out"));
        }
        Ok(HealthReport {
            status: "OK".to_string(),
            ..HealthReport::default()
        })
    }
}
