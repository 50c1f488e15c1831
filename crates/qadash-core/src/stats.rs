//! Dashboard summary
//!
//! Counts computed over a task list, usually the cached working copy, so the
//! summary is available offline.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Priority, Task, TaskStatus};

/// Number of tasks sharing one value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Count<T> {
    pub value: T,
    pub count: usize,
}

/// Summary of a task list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    /// Every status in cycle order, including empty ones
    pub by_status: Vec<Count<TaskStatus>>,
    /// Priorities most urgent first, including empty ones
    pub by_priority: Vec<Count<Priority>>,
    /// Tags by descending count, then name
    pub by_tag: Vec<Count<String>>,
    /// Share of UAT Completed tasks, rounded half up; 0 for an empty list
    pub uat_completed_percent: u32,
    pub overdue: usize,
    /// Local-only tasks waiting for upload
    pub pending: usize,
}

impl TaskStats {
    pub fn compute(tasks: &[Task], today: NaiveDate) -> Self {
        let total = tasks.len();

        let by_status: Vec<_> = TaskStatus::ALL
            .iter()
            .map(|&status| Count {
                value: status,
                count: count_where(tasks, |t| t.status == status),
            })
            .collect();

        let by_priority = Priority::ALL
            .iter()
            .map(|&priority| Count {
                value: priority,
                count: count_where(tasks, |t| t.priority == priority),
            })
            .collect();

        // Keyed case-insensitively; the first spelling seen is shown
        let mut tags: BTreeMap<String, Count<String>> = BTreeMap::new();
        for tag in tasks.iter().flat_map(|t| t.tags.iter()) {
            let tag = tag.trim();
            if tag.is_empty() {
                continue;
            }
            tags.entry(tag.to_lowercase())
                .or_insert_with(|| Count {
                    value: tag.to_string(),
                    count: 0,
                })
                .count += 1;
        }
        let mut by_tag: Vec<_> = tags.into_values().collect();
        by_tag.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));

        let uat_completed = by_status
            .iter()
            .find(|c| c.value == TaskStatus::UatCompleted)
            .map_or(0, |c| c.count);

        Self {
            total,
            uat_completed_percent: percent(uat_completed, total),
            overdue: count_where(tasks, |t| t.is_overdue(today)),
            pending: count_where(tasks, Task::is_local_only),
            by_status,
            by_priority,
            by_tag,
        }
    }

    pub fn status_count(&self, status: TaskStatus) -> usize {
        self.by_status
            .iter()
            .find(|c| c.value == status)
            .map_or(0, |c| c.count)
    }
}

fn count_where(tasks: &[Task], pred: impl Fn(&Task) -> bool) -> usize {
    tasks.iter().filter(|t| pred(t)).count()
}

/// `part / whole` as a whole percentage, rounded half up
fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part * 200 + whole) / (whole * 2)) as u32
}
