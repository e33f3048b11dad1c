mod log;
mod view;

pub use log::LogSubscriber;
pub use view::{View, log_event, message_for};
