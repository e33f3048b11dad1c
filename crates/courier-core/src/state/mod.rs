mod batch;
pub use batch::{Batch, HISTORY_LIMIT, Task};

use std::{collections::HashMap, sync::Arc};

use courier_model::{BatchId, Event, EventKind, TaskId, UserId};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::subscriber::Subscribers;

/// In-memory table of in-flight batches, keyed by owner and batch id.
///
/// Also owns the per-user id counters, so issuing an id and looking up a
/// batch go through the same lock.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    subscribers: Subscribers,
}

#[derive(Default)]
struct RegistryInner {
    batches: HashMap<UserId, HashMap<BatchId, Arc<Batch>>>,
    /// Last issued batch id per user.
    batch_seq: HashMap<UserId, u64>,
    /// Last issued task id per user.
    task_seq: HashMap<UserId, u64>,
}

impl TaskRegistry {
    /// Create an empty registry without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscribers(subscribers: Subscribers) -> Self {
        Self {
            inner: Arc::default(),
            subscribers,
        }
    }

    pub fn subscribers(&self) -> &Subscribers {
        &self.subscribers
    }

    /// Deliver an event to the registry's subscribers.
    pub fn emit(&self, event: Event) {
        self.subscribers.emit(&event);
    }

    /// Next batch id for `user`, starting at 1. Never reused.
    pub fn next_batch_id(&self, user: UserId) -> BatchId {
        let mut inner = self.inner.write();
        let seq = inner.batch_seq.entry(user).or_insert(0);
        *seq += 1;
        BatchId(*seq)
    }

    /// Next task id for `user`, starting at 1. Never reused.
    pub fn next_task_id(&self, user: UserId) -> TaskId {
        let mut inner = self.inner.write();
        let seq = inner.task_seq.entry(user).or_insert(0);
        *seq += 1;
        TaskId(*seq)
    }

    /// Store a batch under its owner and id, replacing any previous entry.
    pub fn register(&self, batch: Arc<Batch>) {
        let (user, id) = (batch.user(), batch.id());
        {
            let mut inner = self.inner.write();
            inner.batches.entry(user).or_default().insert(id, batch);
        }
        debug!(target: "courier.core.state", user = user.get(), batch = id.get(), "batch registered");
        self.emit(Event::new(EventKind::BatchRegistered, user, id));
    }

    /// Drop a batch. Removing an absent batch is a no-op.
    pub fn remove(&self, user: UserId, id: BatchId) {
        let removed = {
            let mut inner = self.inner.write();
            let removed = inner
                .batches
                .get_mut(&user)
                .and_then(|by_id| by_id.remove(&id));
            if inner.batches.get(&user).is_some_and(HashMap::is_empty) {
                inner.batches.remove(&user);
            }
            removed
        };
        if removed.is_some() {
            debug!(target: "courier.core.state", user = user.get(), batch = id.get(), "batch removed");
            self.emit(Event::new(EventKind::BatchRemoved, user, id));
        }
    }

    /// Request cancellation of a registered batch.
    ///
    /// Returns `false` when no such batch is registered. The batch is flagged
    /// and its token fired outside the registry lock.
    pub fn cancel(&self, user: UserId, id: BatchId) -> bool {
        let Some(batch) = self.get(user, id) else {
            return false;
        };
        batch.request_cancel();
        info!(target: "courier.core.state", user = user.get(), batch = id.get(), "batch cancellation requested");
        self.emit(Event::new(EventKind::BatchCancelRequested, user, id));
        true
    }

    pub fn get(&self, user: UserId, id: BatchId) -> Option<Arc<Batch>> {
        let inner = self.inner.read();
        inner
            .batches
            .get(&user)
            .and_then(|by_id| by_id.get(&id))
            .cloned()
    }

    /// Batches of one user, oldest first.
    pub fn list_by_user(&self, user: UserId) -> Vec<Arc<Batch>> {
        let inner = self.inner.read();
        let mut batches: Vec<Arc<Batch>> = inner
            .batches
            .get(&user)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default();
        batches.sort_by_key(|b| b.id());
        batches
    }

    /// Total number of registered batches across all users.
    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.batches.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("batches", &self.len())
            .field("subscribers", &self.subscribers)
            .finish()
    }
}
