use async_trait::async_trait;
use courier_model::Target;
use tokio_util::sync::CancellationToken;

use crate::{error::ExecError, progress::ProgressSink};

/// Forwards a single work item to its destination.
///
/// `target` overrides the default destination when set. Implementations
/// report progress through `progress` and should stop early once `cancel`
/// fires; the executor classifies the task as cancelled either way.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        cancel: &CancellationToken,
        descriptor: &str,
        target: Option<Target>,
        progress: &dyn ProgressSink,
    ) -> Result<(), ExecError>;
}
