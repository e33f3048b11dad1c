use std::borrow::Borrow;

use courier_model::{Event, EventKind};
use tracing::{debug, error, info, trace, warn};

pub trait View {
    fn user(&self) -> i64;
    fn batch(&self) -> u64;
    fn task(&self) -> u64;
    fn as_reason(&self) -> &str;
    fn kind(&self) -> EventKind;
    fn has_reason(&self) -> bool;
}

impl<T> View for T
where
    T: Borrow<Event>,
{
    #[inline]
    fn user(&self) -> i64 {
        self.borrow().user.get()
    }
    #[inline]
    fn batch(&self) -> u64 {
        self.borrow().batch.get()
    }
    #[inline]
    fn task(&self) -> u64 {
        self.borrow().task.map(|t| t.get()).unwrap_or(0)
    }
    #[inline]
    fn as_reason(&self) -> &str {
        self.borrow().reason.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn kind(&self) -> EventKind {
        self.borrow().kind
    }
    #[inline]
    fn has_reason(&self) -> bool {
        self.borrow().reason.is_some()
    }
}

#[inline]
pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        // registry
        EventKind::BatchRegistered => "batch registered",
        EventKind::BatchCancelRequested => "batch cancellation requested",
        EventKind::BatchRemoved => "batch removed from registry",

        // executor
        EventKind::TaskStarting => "task is starting",
        EventKind::TaskCompleted => "task completed",
        EventKind::TaskFailed => "task failed (batch continues)",
        EventKind::TaskCancelled => "task cancelled",
        EventKind::BatchFinished => "batch finished",
        EventKind::RenderFailed => "status render failed (ignored)",
    }
}

#[inline]
pub fn log_event<E: View>(e: E) {
    let msg = message_for(e.kind());

    match e.kind() {
        // registry
        EventKind::BatchRegistered => {
            debug!(target: "courier.observe.events", user = e.user(), batch = e.batch(), "{msg}")
        }
        EventKind::BatchRemoved => {
            trace!(target: "courier.observe.events", user = e.user(), batch = e.batch(), "{msg}")
        }
        EventKind::BatchCancelRequested => {
            info!(target: "courier.observe.events", user = e.user(), batch = e.batch(), "{msg}")
        }

        // executor
        EventKind::TaskStarting => info!(
            target: "courier.observe.events",
            user = e.user(),
            batch = e.batch(),
            task = e.task(),
            "{msg}"
        ),
        EventKind::TaskCompleted => debug!(
            target: "courier.observe.events",
            user = e.user(),
            batch = e.batch(),
            task = e.task(),
            "{msg}"
        ),
        EventKind::TaskFailed => error!(
            target: "courier.observe.events",
            user = e.user(),
            batch = e.batch(),
            task = e.task(),
            reason = e.as_reason(),
            "{msg}"
        ),
        EventKind::TaskCancelled => warn!(
            target: "courier.observe.events",
            user = e.user(),
            batch = e.batch(),
            task = e.task(),
            reason = e.as_reason(),
            "{msg}"
        ),
        EventKind::BatchFinished => {
            if e.has_reason() {
                info!(
                    target: "courier.observe.events",
                    user = e.user(),
                    batch = e.batch(),
                    summary = e.as_reason(),
                    "{msg}"
                );
            } else {
                info!(target: "courier.observe.events", user = e.user(), batch = e.batch(), "{msg}");
            }
        }
        EventKind::RenderFailed => warn!(
            target: "courier.observe.events",
            user = e.user(),
            batch = e.batch(),
            reason = e.as_reason(),
            "{msg}"
        ),
    }
}
