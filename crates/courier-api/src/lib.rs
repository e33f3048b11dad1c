//! Operations exposed by the agent: batch creation and cancellation, status
//! rendering, verification runs and the channel monitor pipeline.

mod error;
pub use error::ApiError;

mod links;
pub use links::{LinkExtractor, extract_links, extract_telegram_links, filter_links, matches_any};

mod subscription;
pub use subscription::{SubmissionSummary, SubscriptionClient, classify};

#[cfg(feature = "http")]
pub use subscription::HttpSubscriptionClient;

mod service;
pub use service::{BatchHandle, CancelReply, ChannelMessage, Courier, ExportVerification};
