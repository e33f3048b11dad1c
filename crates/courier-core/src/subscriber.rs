use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use courier_model::Event;
use tracing::error;

/// Receiver of lifecycle events.
///
/// Called synchronously from the emitting task, so implementations must not block.
pub trait Subscribe: Send + Sync {
    fn on_event(&self, event: &Event);
    fn name(&self) -> &'static str;
}

/// Fan-out set of subscribers.
#[derive(Clone, Default)]
pub struct Subscribers {
    inner: Arc<Vec<Arc<dyn Subscribe>>>,
}

impl Subscribers {
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        Self {
            inner: Arc::new(subscribers),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Deliver `event` to every subscriber; a panicking subscriber is logged and skipped.
    pub fn emit(&self, event: &Event) {
        for sub in self.inner.iter() {
            let delivered = catch_unwind(AssertUnwindSafe(|| sub.on_event(event)));
            if delivered.is_err() {
                error!(
                    target: "courier.core.subscriber",
                    subscriber = sub.name(),
                    kind = ?event.kind,
                    "subscriber panicked while processing an event"
                );
            }
        }
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.inner.iter().map(|s| s.name()).collect();
        f.debug_struct("Subscribers").field("names", &names).finish()
    }
}
