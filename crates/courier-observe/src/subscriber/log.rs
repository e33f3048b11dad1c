use courier_core::Subscribe;
use courier_model::Event;

use crate::subscriber::view::log_event;

/// Writes every lifecycle event to the installed `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSubscriber;

impl LogSubscriber {
    pub fn new() -> Self {
        Self
    }
}

impl Subscribe for LogSubscriber {
    fn on_event(&self, event: &Event) {
        log_event(event);
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
