mod ids;
pub use ids::{BatchId, ChatId, MessageId, TaskId, UserId};

mod task_status;
pub use task_status::TaskStatus;

mod task_info;
pub use task_info::{BatchSummary, TaskSnapshot, is_bulk_descriptor};

mod status;
pub use status::{CancelAffordance, CancelAffordanceError, StatusHandle};

mod event;
pub use event::{Event, EventKind};

mod verify;
pub use verify::{FirstFailure, VerificationJob, VerificationReport, VerificationResult};

mod subscription;
pub use subscription::{DetectionStats, SubscriptionKind, SubscriptionOutcome, SubscriptionRequest};

/// Forward destination (chat or channel identifier).
pub type Target = i64;

/// Edit marker of a message; `0` means the message was never edited.
pub type EditVersion = i64;
