use serde::{Deserialize, Serialize};

use crate::{BatchId, TaskId, UserId};

/// Lifecycle notification kinds emitted by the registry and the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    // registry
    BatchRegistered,
    BatchCancelRequested,
    BatchRemoved,

    // executor
    TaskStarting,
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
    BatchFinished,
    RenderFailed,
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub user: UserId,
    pub batch: BatchId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, user: UserId, batch: BatchId) -> Self {
        Self {
            kind,
            user,
            batch,
            task: None,
            reason: None,
        }
    }

    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
