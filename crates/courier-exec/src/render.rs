use std::{fmt::Write as _, time::Duration};

use async_trait::async_trait;
use courier_model::{
    BatchId, BatchSummary, CancelAffordance, ChatId, StatusHandle, TaskSnapshot, TaskStatus,
};

use crate::error::ExecError;

/// Creates and updates the human-readable status message of a batch.
#[async_trait]
pub trait StatusRenderer: Send + Sync {
    /// Post a new status message and return its handle.
    async fn create(
        &self,
        chat: ChatId,
        text: &str,
        cancel: Option<&CancelAffordance>,
    ) -> Result<StatusHandle, ExecError>;

    /// Replace the text of an existing status message. `cancel: None` removes the button.
    async fn render(
        &self,
        handle: &StatusHandle,
        text: &str,
        cancel: Option<&CancelAffordance>,
    ) -> Result<(), ExecError>;
}

/// Live status text of a batch.
///
/// The header names the running task's position when one is running; bulk
/// items show only their file name.
pub fn render_batch_status(batch: BatchId, tasks: &[TaskSnapshot]) -> String {
    let mut out = String::new();

    let running = tasks
        .iter()
        .position(|t| t.status == TaskStatus::Running);

    match running {
        Some(idx) => {
            let _ = writeln!(out, "📦 Batch #{batch} | Task: {}/{}\n", idx + 1, tasks.len());
        }
        None => {
            let _ = writeln!(out, "📦 Batch #{batch} ({} tasks)\n", tasks.len());
        }
    }

    for task in tasks {
        let kind = if task.is_bulk() { "📁" } else { "🔗" };
        let (icon, text) = match task.status {
            TaskStatus::Pending => ("⏳", "Pending".to_string()),
            TaskStatus::Running => ("🔄", format!("Forwarding {}%", task.progress)),
            TaskStatus::Completed => ("✅", "Completed".to_string()),
            TaskStatus::Cancelled => ("❌", "Cancelled".to_string()),
            TaskStatus::Failed => (
                "⚠️",
                task.error.clone().unwrap_or_else(|| "Failed".to_string()),
            ),
        };
        let _ = writeln!(
            out,
            "{icon} {kind} #{} [{text}] {}",
            task.id,
            task.display_name()
        );
    }

    if let Some(idx) = running
        && tasks[idx].is_bulk()
    {
        out.push_str("\n💡 Large migration in progress, please be patient...");
    }

    out
}

/// Terminal summary posted after the last task.
pub fn render_summary(summary: &BatchSummary) -> String {
    format!(
        "📦 Batch #{} finished\n\n\
         Total: {} tasks\n\
         ✅ Succeeded: {}\n\
         ⚠️ Failed: {}\n\
         ❌ Cancelled: {}\n\n\
         Elapsed: {}",
        summary.batch,
        summary.total,
        summary.completed,
        summary.failed,
        summary.cancelled,
        format_elapsed(summary.elapsed),
    )
}

/// Compact `1h2m3s` style duration, whole seconds only.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m{s}s"),
        _ => format!("{h}h{m}m{s}s"),
    }
}
