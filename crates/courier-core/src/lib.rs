//! Shared state of the courier agent: the batch registry, the dedup cache,
//! lifecycle event fan-out and configuration.

mod cache;
pub use cache::DedupCache;

mod config;
pub use config::{
    BotConfig, CourierConfig, ExecutorConfig, FilterConfig, ForwardMode, LoggerSection,
    MonitorConfig, SubscriptionApiConfig, VerifyConfig,
};

mod error;
pub use error::CoreError;

mod state;
pub use state::{Batch, HISTORY_LIMIT, Task, TaskRegistry};

mod subscriber;
pub use subscriber::{Subscribe, Subscribers};
