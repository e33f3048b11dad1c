use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BatchId, TaskId, TaskStatus};

const BULK_SUFFIX: &str = ".json";

/// Point-in-time copy of a task, detached from the batch lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    /// Per-user task identifier.
    pub id: TaskId,
    /// Link, channel handle or export file path.
    pub descriptor: String,
    /// Current execution state.
    pub status: TaskStatus,
    /// Progress percentage in `0..=100`.
    pub progress: u32,
    /// Last few progress lines, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<String>,
    /// Failure or cancellation reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskSnapshot {
    /// Bulk items are chat-export files rather than single links.
    pub fn is_bulk(&self) -> bool {
        is_bulk_descriptor(&self.descriptor)
    }

    /// Descriptor as shown to users: export files show only their basename.
    pub fn display_name(&self) -> &str {
        if !self.is_bulk() {
            return &self.descriptor;
        }
        self.descriptor
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.descriptor)
    }
}

/// Returns `true` for descriptors naming a chat-export file.
pub fn is_bulk_descriptor(descriptor: &str) -> bool {
    descriptor.ends_with(BULK_SUFFIX)
}

/// Final tally of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch: BatchId,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Wall time since the batch started, rounded to whole seconds.
    pub elapsed: Duration,
}

impl BatchSummary {
    /// Count terminal states over a task list.
    pub fn tally(batch: BatchId, tasks: &[TaskSnapshot], elapsed: Duration) -> Self {
        let mut summary = Self {
            batch,
            total: tasks.len(),
            completed: 0,
            failed: 0,
            cancelled: 0,
            elapsed: Duration::from_secs(round_secs(elapsed)),
        };
        for task in tasks {
            match task.status {
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Cancelled => summary.cancelled += 1,
                TaskStatus::Pending | TaskStatus::Running => {}
            }
        }
        summary
    }
}

fn round_secs(elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs();
    if elapsed.subsec_millis() >= 500 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(descriptor: &str, status: TaskStatus) -> TaskSnapshot {
        TaskSnapshot {
            id: TaskId(1),
            descriptor: descriptor.to_string(),
            status,
            progress: 0,
            history: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn bulk_items_show_basename() {
        let unix = snapshot("/var/lib/courier/123456.json", TaskStatus::Pending);
        assert!(unix.is_bulk());
        assert_eq!(unix.display_name(), "123456.json");

        let windows = snapshot(r"C:\exports\987.json", TaskStatus::Pending);
        assert_eq!(windows.display_name(), "987.json");
    }

    #[test]
    fn links_are_shown_verbatim() {
        let link = snapshot("https://t.me/channel/42", TaskStatus::Pending);
        assert!(!link.is_bulk());
        assert_eq!(link.display_name(), "https://t.me/channel/42");
    }

    #[test]
    fn tally_counts_terminal_states_only() {
        let tasks = vec![
            snapshot("a", TaskStatus::Completed),
            snapshot("b", TaskStatus::Failed),
            snapshot("c", TaskStatus::Cancelled),
            snapshot("d", TaskStatus::Cancelled),
            snapshot("e", TaskStatus::Pending),
        ];
        let summary = BatchSummary::tally(BatchId(3), &tasks, Duration::from_millis(2_600));
        assert_eq!(summary.total, 5);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 2);
        assert_eq!(summary.elapsed, Duration::from_secs(3));
    }

    #[test]
    fn empty_history_is_not_serialized() {
        let json = serde_json::to_string(&snapshot("x", TaskStatus::Running)).unwrap();
        assert!(!json.contains("history"));
        assert!(!json.contains("error"));
    }
}
