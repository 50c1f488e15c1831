//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use qadash_core::sync::{DrainReport, SyncStatusSnapshot};
use qadash_core::{QueueEntry, Task, TaskStats, TaskStatus};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a single task with all fields
    pub fn print_task(&self, task: &Task) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", task.display_id());
                println!("Title:       {}", task.title);
                println!("Status:      {}", task.status);
                if let Some(previous) = task.previous_status {
                    println!("Previous:    {}", previous);
                }
                println!("Priority:    {}", task.priority);
                if !task.assignees.is_empty() {
                    println!("Assignees:   {}", task.assignees.joined());
                }
                if let Some(ref desc) = task.description {
                    println!("Description: {}", desc);
                }
                if let Some(ref module) = task.module {
                    println!("Module:      {}", module);
                }
                println!("Environment: {}", task.environment);
                if let Some(ref start) = task.start_date {
                    println!("Start:       {}", start);
                }
                if let Some(ref due) = task.due_date {
                    println!("Due:         {}", due);
                }
                if !task.tags.is_empty() {
                    println!("Tags:        {}", task.tags.join(", "));
                }
                if let Some(created) = task.created_at {
                    println!("Created:     {}", created.format("%Y-%m-%d %H:%M"));
                }
                if let Some(updated) = task.updated_at {
                    println!("Updated:     {}", updated.format("%Y-%m-%d %H:%M"));
                }
                if task.is_local_only() {
                    println!();
                    println!("Saved offline; waiting to be uploaded.");
                }
            }
            OutputFormat::Json => print_json(task),
            OutputFormat::Quiet => {
                println!("{}", task.key());
            }
        }
    }

    /// Print a list of tasks
    pub fn print_tasks(&self, tasks: &[Task]) {
        match self.format {
            OutputFormat::Human => {
                if tasks.is_empty() {
                    println!("No tasks found.");
                    return;
                }
                for task in tasks {
                    let marker = if task.is_local_only() { "*" } else { " " };
                    println!(
                        "{}{:<10} | {:<13} | {:<8} | {} | {}",
                        marker,
                        truncate(task.display_id(), 10),
                        task.status.as_str(),
                        task.priority.as_str(),
                        truncate_line(&task.title, 40),
                        truncate(&task.assignees.joined(), 25)
                    );
                }
                let offline = tasks.iter().filter(|t| t.is_local_only()).count();
                if offline > 0 {
                    println!("\n{} task(s), {} saved offline (*)", tasks.len(), offline);
                } else {
                    println!("\n{} task(s)", tasks.len());
                }
            }
            OutputFormat::Json => print_json(&tasks),
            OutputFormat::Quiet => {
                for task in tasks {
                    println!("{}", task.key());
                }
            }
        }
    }

    /// Print the offline queue
    pub fn print_queue(&self, entries: &[QueueEntry]) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("No tasks waiting for upload.");
                    return;
                }
                for entry in entries {
                    println!(
                        "{} | {} | {}",
                        entry.offline_id,
                        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                        truncate_line(&entry.payload.title, 50)
                    );
                }
                println!("\n{} queued", entries.len());
            }
            OutputFormat::Json => print_json(&entries),
            OutputFormat::Quiet => {
                for entry in entries {
                    println!("{}", entry.offline_id);
                }
            }
        }
    }

    /// Print a sync status snapshot
    pub fn print_sync_status(&self, status: &SyncStatusSnapshot) {
        match self.format {
            OutputFormat::Human => {
                println!("Server:       {:?}", status.reachability);
                println!("Phase:        {:?}", status.phase);
                println!("Cached tasks: {}", status.cached);
                println!("Queued:       {}", status.queued);
                if let Some(at) = status.last_refresh {
                    println!("Refreshed:    {}", at.format("%Y-%m-%d %H:%M:%S"));
                }
                if let Some(ref drain) = status.last_drain {
                    println!("Last drain:   {}", drain.summary());
                }
            }
            OutputFormat::Json => print_json(status),
            OutputFormat::Quiet => {}
        }
    }

    /// Print the dashboard summary
    pub fn print_stats(&self, stats: &TaskStats) {
        match self.format {
            OutputFormat::Human => {
                println!("Total tasks:   {}", stats.total);
                println!(
                    "UAT completed: {} ({}%)",
                    stats.status_count(TaskStatus::UatCompleted),
                    stats.uat_completed_percent
                );
                println!("Overdue:       {}", stats.overdue);
                if stats.pending > 0 {
                    println!("Not uploaded:  {}", stats.pending);
                }
                println!();
                println!("By status:");
                for c in &stats.by_status {
                    println!("  {:<15} {}", c.value.as_str(), c.count);
                }
                println!("By priority:");
                for c in &stats.by_priority {
                    println!("  {:<15} {}", c.value.as_str(), c.count);
                }
                if !stats.by_tag.is_empty() {
                    println!("By tag:");
                    for c in &stats.by_tag {
                        println!("  {:<15} {}", truncate(&c.value, 15), c.count);
                    }
                }
            }
            OutputFormat::Json => print_json(stats),
            OutputFormat::Quiet => {
                println!("{} {} {}", stats.total, stats.overdue, stats.uat_completed_percent);
            }
        }
    }

    /// Print the per-entry result of a drain
    pub fn print_drain(&self, report: &DrainReport) {
        match self.format {
            OutputFormat::Human => {
                for uploaded in &report.succeeded {
                    println!("  ✓ {} -> {}", uploaded.offline_id, uploaded.task_id);
                }
                for failed in &report.failed {
                    println!("  ✗ {} ({}): {}", failed.offline_id, failed.title, failed.error);
                }
                for warning in &report.warnings {
                    println!("  ⚠ {}", warning);
                }
                println!("{}", report.summary());
            }
            OutputFormat::Json => print_json(report),
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr (suppressed in quiet mode)
    pub fn warning(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", message);
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode JSON: {}", e),
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
    }

    #[test]
    fn test_truncate_multibyte() {
        // Must not split a character
        assert_eq!(truncate("élève très motivé", 8), "élève...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
        assert_eq!(
            truncate_line("very long single line here", 10),
            "very lo..."
        );
    }
}
