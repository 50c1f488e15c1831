//! Task command handlers

use anyhow::{bail, Result};

use qadash_core::sync::MutationReport;
use qadash_core::{
    Assignees, MutationOutcome, Priority, Store, Task, TaskFilter, TaskKey, TaskPatch,
    TaskPayload, TaskStatus,
};

use crate::editor::{confirm, edit_description};
use crate::output::Output;

/// Fields shared by `create` and `update`
#[derive(Debug, Default, Clone)]
pub struct TaskFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignees: Vec<String>,
    pub module: Option<String>,
    pub environment: Option<String>,
    pub tags: Vec<String>,
    pub start_date: Option<String>,
    pub due_date: Option<String>,
}

impl TaskFields {
    fn into_payload(self, title: String) -> TaskPayload {
        let mut payload = TaskPayload::new(title)
            .with_assignees(split_names(&self.assignees))
            .with_status(self.status.unwrap_or_default())
            .with_priority(self.priority.unwrap_or_default());
        payload.description = self.description;
        payload.module = self.module;
        payload.start_date = self.start_date;
        payload.due_date = self.due_date;
        payload.tags = split_names(&self.tags).as_slice().to_vec();
        if let Some(environment) = self.environment {
            payload.environment = environment;
        }
        payload
    }

    fn into_patch(self) -> TaskPatch {
        TaskPatch {
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            assignee: (!self.assignees.is_empty()).then(|| split_names(&self.assignees)),
            module: self.module,
            environment: self.environment,
            tags: (!self.tags.is_empty()).then(|| split_names(&self.tags).as_slice().to_vec()),
            start_date: self.start_date,
            due_date: self.due_date,
            ..TaskPatch::default()
        }
    }
}

/// Accept both repeated flags and comma-separated values
fn split_names(values: &[String]) -> Assignees {
    Assignees::new(values.iter().flat_map(|v| v.split(',')))
}

/// List tasks from the working copy
pub async fn list(store: &Store, filter: TaskFilter, output: &Output) -> Result<()> {
    let tasks = store.sync().tasks(&filter).await;
    output.print_tasks(&tasks);
    Ok(())
}

/// Summary counts over the cached tasks matching `filter`
pub async fn stats(store: &Store, filter: TaskFilter, output: &Output) -> Result<()> {
    let stats = store.sync().stats(&filter).await;
    output.print_stats(&stats);
    Ok(())
}

/// Show a single task
pub async fn show(store: &Store, id: String, output: &Output) -> Result<()> {
    let key = resolve_key(store, &id).await?;
    let Some(task) = store.sync().find(&key).await else {
        bail!("Task not found: {}", id);
    };
    output.print_task(&task);
    Ok(())
}

/// Create a task, queueing it offline if the server is unreachable
pub async fn create(
    store: &Store,
    title: String,
    mut fields: TaskFields,
    edit: bool,
    output: &Output,
) -> Result<()> {
    if edit {
        fields.description = edit_description(&title, fields.description.as_deref())?;
    }

    let report = store.router().create_task(fields.into_payload(title)).await?;
    report_mutation(&report, output);

    let key = match report.outcome {
        MutationOutcome::Created(ref created) => TaskKey::Remote(created.id),
        MutationOutcome::Queued { ref offline_id } => TaskKey::Local(offline_id.clone()),
        _ => return Ok(()),
    };
    if let Some(task) = store.sync().find(&key).await {
        if !output.is_quiet() {
            output.print_task(&task);
        }
    }
    Ok(())
}

/// Update fields of a task
pub async fn update(
    store: &Store,
    id: String,
    mut fields: TaskFields,
    edit: bool,
    output: &Output,
) -> Result<()> {
    let key = resolve_key(store, &id).await?;

    if edit {
        let Some(task) = store.sync().find(&key).await else {
            bail!("Task not found: {}", id);
        };
        fields.description = edit_description(&task.title, task.description.as_deref())?;
    }

    let patch = fields.into_patch();
    let report = store.router().update_task(&key, patch).await?;
    report_mutation(&report, output);
    Ok(())
}

/// Delete a task
pub async fn delete(store: &Store, id: String, yes: bool, output: &Output) -> Result<()> {
    let key = resolve_key(store, &id).await?;
    let Some(task) = store.sync().find(&key).await else {
        bail!("Task not found: {}", id);
    };

    if !yes && output.should_prompt() {
        println!("Delete task: {} - {}", task.display_id(), task.title);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let report = store.router().delete_task(&key).await?;
    report_mutation(&report, output);
    Ok(())
}

/// Set the status of a task
pub async fn set_status(
    store: &Store,
    id: String,
    status: TaskStatus,
    output: &Output,
) -> Result<()> {
    let key = resolve_key(store, &id).await?;
    let report = store.router().set_status(&key, status).await?;
    report_mutation(&report, output);
    Ok(())
}

/// Mark a task done, or restore its previous status if it already is
pub async fn done(store: &Store, id: String, output: &Output) -> Result<()> {
    let key = resolve_key(store, &id).await?;
    let report = store.router().toggle_done(&key).await?;
    report_mutation(&report, output);
    Ok(())
}

/// Advance a task to the next status
pub async fn cycle(store: &Store, id: String, output: &Output) -> Result<()> {
    let key = resolve_key(store, &id).await?;
    let report = store.router().cycle_status(&key).await?;
    report_mutation(&report, output);
    Ok(())
}

fn report_mutation(report: &MutationReport, output: &Output) {
    output.success(&report.outcome.notice());
    for warning in &report.warnings {
        output.warning(warning);
    }
}

/// Resolve a task argument
///
/// Accepts a numeric server id, an offline id, or a display id such as
/// `QA-AB12` (case-insensitive).
async fn resolve_key(store: &Store, raw: &str) -> Result<TaskKey> {
    if let Ok(key) = raw.parse::<TaskKey>() {
        return Ok(key);
    }

    let tasks = store.sync().tasks(&TaskFilter::default()).await;
    match match_display_id(&tasks, raw) {
        Some(key) => Ok(key),
        None => bail!("No task found matching: {}", raw),
    }
}

fn match_display_id(tasks: &[Task], raw: &str) -> Option<TaskKey> {
    tasks
        .iter()
        .find(|t| t.display_id().eq_ignore_ascii_case(raw.trim()))
        .map(|t| t.key())
}
