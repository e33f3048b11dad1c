use std::time::{Duration, Instant};

use courier_model::{
    BatchId, StatusHandle, Target, TaskId, TaskSnapshot, TaskStatus, UserId, is_bulk_descriptor,
};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Progress lines kept per task.
pub const HISTORY_LIMIT: usize = 5;

/// One work item of a batch.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    descriptor: String,
    status: TaskStatus,
    progress: u32,
    history: Vec<String>,
    last_percent: Option<u32>,
    error: Option<String>,
    cancel_requested: bool,
}

impl Task {
    pub fn new(id: TaskId, descriptor: impl Into<String>) -> Self {
        Self {
            id,
            descriptor: descriptor.into(),
            status: TaskStatus::Pending,
            progress: 0,
            history: Vec::new(),
            last_percent: None,
            error: None,
            cancel_requested: false,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            descriptor: self.descriptor.clone(),
            status: self.status,
            progress: self.progress,
            history: self.history.clone(),
            error: self.error.clone(),
        }
    }

    fn finish(&mut self, status: TaskStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        if status == TaskStatus::Completed {
            self.progress = 100;
        }
        self.error = error;
        true
    }
}

/// A group of tasks submitted together and executed in order.
///
/// The task list is only reachable through methods that hold the lock for
/// the duration of one call; readers get [`TaskSnapshot`] copies.
#[derive(Debug)]
pub struct Batch {
    id: BatchId,
    user: UserId,
    tasks: RwLock<Vec<Task>>,
    status: StatusHandle,
    cancel: CancellationToken,
    started_at: Instant,
    target: Option<Target>,
}

impl Batch {
    pub fn new(
        id: BatchId,
        user: UserId,
        tasks: Vec<Task>,
        status: StatusHandle,
        target: Option<Target>,
    ) -> Self {
        Self {
            id,
            user,
            tasks: RwLock::new(tasks),
            status,
            cancel: CancellationToken::new(),
            started_at: Instant::now(),
            target,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn target(&self) -> Option<Target> {
        self.target
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Whether the batch contains chat-export files.
    pub fn is_bulk(&self) -> bool {
        self.tasks
            .read()
            .iter()
            .any(|t| is_bulk_descriptor(&t.descriptor))
    }

    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.tasks.read().iter().map(Task::snapshot).collect()
    }

    pub fn task(&self, idx: usize) -> Option<TaskSnapshot> {
        self.tasks.read().get(idx).map(Task::snapshot)
    }

    pub fn is_cancel_requested(&self, idx: usize) -> bool {
        self.tasks
            .read()
            .get(idx)
            .is_some_and(|t| t.cancel_requested)
    }

    /// Flag every non-terminal task and fire the batch token.
    ///
    /// The token fires at most once; repeated calls only re-flag tasks.
    pub fn request_cancel(&self) {
        {
            let mut tasks = self.tasks.write();
            for task in tasks.iter_mut().filter(|t| !t.status.is_terminal()) {
                task.cancel_requested = true;
            }
        }
        self.cancel.cancel();
    }

    /// `Pending -> Running` with progress reset. Returns `false` for any other state.
    pub fn start(&self, idx: usize) -> bool {
        let mut tasks = self.tasks.write();
        match tasks.get_mut(idx) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Running;
                task.progress = 0;
                task.last_percent = None;
                true
            }
            _ => false,
        }
    }

    /// Record a progress report for a running task.
    ///
    /// The line is appended to the history only when the percent differs from
    /// the last recorded one; the history keeps the newest [`HISTORY_LIMIT`] lines.
    pub fn record_progress(&self, idx: usize, percent: u32, line: &str) -> bool {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(idx) else {
            return false;
        };
        if task.status != TaskStatus::Running {
            return false;
        }
        let percent = percent.min(100);
        task.progress = percent;
        if task.last_percent != Some(percent) {
            task.last_percent = Some(percent);
            task.history.push(format!("{percent}% - {line}"));
            if task.history.len() > HISTORY_LIMIT {
                let overflow = task.history.len() - HISTORY_LIMIT;
                task.history.drain(..overflow);
            }
        }
        true
    }

    /// Move a task into a terminal state. Terminal tasks are never changed again.
    pub fn finish(&self, idx: usize, status: TaskStatus, error: Option<String>) -> bool {
        self.tasks
            .write()
            .get_mut(idx)
            .is_some_and(|t| t.finish(status, error))
    }

    /// Cancel every non-terminal task from `from` on. Returns how many changed.
    pub fn cancel_remaining(&self, from: usize, reason: &str) -> usize {
        let mut tasks = self.tasks.write();
        tasks
            .iter_mut()
            .skip(from)
            .map(|t| usize::from(t.finish(TaskStatus::Cancelled, Some(reason.to_string()))))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: u64) -> Batch {
        let tasks = (1..=n)
            .map(|i| Task::new(TaskId(i), format!("https://t.me/c/1/{i}")))
            .collect();
        Batch::new(
            BatchId(1),
            UserId(10),
            tasks,
            StatusHandle {
                chat: 10,
                message: 99,
            },
            None,
        )
    }

    #[test]
    fn history_is_capped_and_deduplicated() {
        let b = batch(1);
        assert!(b.start(0));
        for p in [1, 1, 2, 3, 4, 5, 6] {
            b.record_progress(0, p, "line");
        }
        let snap = b.task(0).unwrap();
        assert_eq!(snap.progress, 6);
        assert_eq!(snap.history.len(), HISTORY_LIMIT);
        assert_eq!(snap.history.first().unwrap(), "2% - line");
        assert_eq!(snap.history.last().unwrap(), "6% - line");
    }

    #[test]
    fn progress_requires_running_task() {
        let b = batch(1);
        assert!(!b.record_progress(0, 10, "early"));
        assert!(!b.record_progress(5, 10, "missing"));
        assert_eq!(b.task(0).unwrap().progress, 0);
    }

    #[test]
    fn terminal_status_is_final() {
        let b = batch(1);
        b.start(0);
        assert!(b.finish(0, TaskStatus::Failed, Some("boom".into())));
        assert!(!b.finish(0, TaskStatus::Completed, None));
        assert!(!b.start(0));

        let snap = b.task(0).unwrap();
        assert_eq!(snap.status, TaskStatus::Failed);
        assert_eq!(snap.error.as_deref(), Some("boom"));
    }

    #[test]
    fn finish_rejects_non_terminal_target() {
        let b = batch(1);
        assert!(!b.finish(0, TaskStatus::Running, None));
    }

    #[test]
    fn cancel_flags_only_open_tasks() {
        let b = batch(3);
        b.start(0);
        b.finish(0, TaskStatus::Completed, None);
        b.request_cancel();

        assert!(!b.is_cancel_requested(0));
        assert!(b.is_cancel_requested(1));
        assert!(b.is_cancel_requested(2));
        assert!(b.cancel_token().is_cancelled());
    }

    #[test]
    fn cancel_remaining_skips_terminal_tasks() {
        let b = batch(3);
        b.start(0);
        b.finish(0, TaskStatus::Completed, None);
        assert_eq!(b.cancel_remaining(0, "batch terminated"), 2);

        let snap = b.snapshot();
        assert_eq!(snap[0].status, TaskStatus::Completed);
        assert_eq!(snap[2].status, TaskStatus::Cancelled);
        assert_eq!(snap[2].error.as_deref(), Some("batch terminated"));
    }

    #[test]
    fn completion_sets_full_progress() {
        let b = batch(1);
        b.start(0);
        b.record_progress(0, 40, "x");
        b.finish(0, TaskStatus::Completed, None);
        assert_eq!(b.task(0).unwrap().progress, 100);
    }
}
