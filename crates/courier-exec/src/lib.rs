//! Sequential batch execution: progress interception, status rendering,
//! the batch driver and the subprocess forwarder.

mod error;
pub use error::{ExecError, ExecResult};

pub mod progress;
pub use progress::{ProgressSink, ProgressWriter, Throttle, parse_progress, pump, sanitize_line};

mod render;
pub use render::{StatusRenderer, format_elapsed, render_batch_status, render_summary};

mod forward;
pub use forward::Forwarder;

mod batch;
pub use batch::{BATCH_TERMINATED, BatchExecutor, CANCELLED_BY_USER, ExecutorOptions};

#[cfg(feature = "proc")]
pub mod proc;
#[cfg(feature = "proc")]
pub use proc::{ProcConfig, ProcForwarder};

mod util;

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::{BatchExecutor, Forwarder, ProgressSink, StatusRenderer};
}
