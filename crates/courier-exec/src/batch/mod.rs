use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use courier_core::{Batch, ExecutorConfig, TaskRegistry};
use courier_model::{
    BatchId, BatchSummary, CancelAffordance, Event, EventKind, TaskStatus, UserId,
};
use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, trace, warn};

use crate::{
    forward::Forwarder,
    progress::{ProgressSink, Throttle},
    render::{StatusRenderer, render_batch_status, render_summary},
};

/// Reason recorded on the task that was running when the user cancelled.
pub const CANCELLED_BY_USER: &str = "cancelled by user";
/// Reason recorded on tasks that never started because their batch was cancelled.
pub const BATCH_TERMINATED: &str = "batch terminated";

/// Timing knobs of the batch driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Pause between two tasks of a batch.
    pub inter_task_delay: Duration,
    /// Minimum gap between progress re-renders of a link task.
    pub link_render_interval: Duration,
    /// Minimum gap between progress re-renders of a bulk export task.
    pub bulk_render_interval: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            inter_task_delay: Duration::from_secs(1),
            link_render_interval: Duration::from_secs(1),
            bulk_render_interval: Duration::from_secs(30),
        }
    }
}

impl From<&ExecutorConfig> for ExecutorOptions {
    fn from(cfg: &ExecutorConfig) -> Self {
        Self {
            inter_task_delay: Duration::from_millis(cfg.inter_task_delay_ms),
            link_render_interval: Duration::from_millis(cfg.link_render_interval_ms),
            bulk_render_interval: Duration::from_millis(cfg.bulk_render_interval_ms),
        }
    }
}

/// Drives batches task by task.
///
/// One driver runs per batch; all status renders of a batch happen on its
/// driver, in order.
#[derive(Clone)]
pub struct BatchExecutor {
    registry: TaskRegistry,
    forwarder: Arc<dyn Forwarder>,
    renderer: Arc<dyn StatusRenderer>,
    opts: ExecutorOptions,
    forwarded: Arc<AtomicU64>,
}

impl BatchExecutor {
    pub fn new(
        registry: TaskRegistry,
        forwarder: Arc<dyn Forwarder>,
        renderer: Arc<dyn StatusRenderer>,
    ) -> Self {
        Self {
            registry,
            forwarder,
            renderer,
            opts: ExecutorOptions::default(),
            forwarded: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_options(mut self, opts: ExecutorOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn options(&self) -> ExecutorOptions {
        self.opts
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn renderer(&self) -> &Arc<dyn StatusRenderer> {
        &self.renderer
    }

    /// Number of tasks completed successfully since start.
    pub fn forwarded_total(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Run the batch on the tokio runtime.
    pub fn spawn(&self, batch: Arc<Batch>) -> JoinHandle<BatchSummary> {
        let this = self.clone();
        tokio::spawn(async move { this.run(batch).await })
    }

    /// Execute every task of `batch` in order and return the final tally.
    ///
    /// The batch is removed from the registry when this returns, and also if
    /// the driver is dropped or panics midway.
    pub async fn run(&self, batch: Arc<Batch>) -> BatchSummary {
        let guard = Deregister {
            registry: &self.registry,
            user: batch.user(),
            batch: batch.id(),
        };
        let (user, id) = (batch.user(), batch.id());
        let affordance = CancelAffordance::new(user, id);
        let total = batch.len();

        debug!(target: "courier.exec.batch", user = user.get(), batch = id.get(), total, "batch started");

        for idx in 0..total {
            if batch.is_cancel_requested(idx) {
                let n = batch.cancel_remaining(idx, BATCH_TERMINATED);
                debug!(target: "courier.exec.batch", batch = id.get(), skipped = n, "batch stopped before next task");
                break;
            }
            if !batch.start(idx) {
                continue;
            }
            let Some(task) = batch.task(idx) else {
                break;
            };

            self.registry
                .emit(Event::new(EventKind::TaskStarting, user, id).with_task(task.id));
            self.render(&batch, Some(&affordance)).await;

            let interval = if task.is_bulk() {
                self.opts.bulk_render_interval
            } else {
                self.opts.link_render_interval
            };
            let (wake_tx, mut wake_rx) = mpsc::unbounded_channel();
            let sink = TaskProgress {
                batch: batch.clone(),
                idx,
                throttle: Mutex::new(Throttle::new(interval)),
                wake: wake_tx,
            };

            let token = batch.cancel_token().clone();
            let result = {
                let fut = self
                    .forwarder
                    .forward(&token, &task.descriptor, batch.target(), &sink);
                tokio::pin!(fut);
                loop {
                    tokio::select! {
                        res = &mut fut => break res,
                        Some(()) = wake_rx.recv() => {
                            while wake_rx.try_recv().is_ok() {}
                            self.render(&batch, Some(&affordance)).await;
                        }
                    }
                }
            };

            let (status, error) = if token.is_cancelled() {
                (TaskStatus::Cancelled, Some(CANCELLED_BY_USER.to_string()))
            } else {
                match result {
                    Err(e) => (TaskStatus::Failed, Some(e.to_string())),
                    Ok(()) => (TaskStatus::Completed, None),
                }
            };
            batch.finish(idx, status, error.clone());

            let event = match status {
                TaskStatus::Completed => {
                    self.forwarded.fetch_add(1, Ordering::Relaxed);
                    info!(target: "courier.exec.batch", batch = id.get(), task = task.id.get(), descriptor = %task.descriptor, "task completed");
                    Event::new(EventKind::TaskCompleted, user, id)
                }
                TaskStatus::Failed => {
                    info!(target: "courier.exec.batch", batch = id.get(), task = task.id.get(), descriptor = %task.descriptor, error = ?error, "task failed");
                    Event::new(EventKind::TaskFailed, user, id)
                }
                _ => Event::new(EventKind::TaskCancelled, user, id),
            };
            let event = match error {
                Some(reason) => event.with_task(task.id).with_reason(reason),
                None => event.with_task(task.id),
            };
            self.registry.emit(event);

            let last = idx + 1 == total;
            let cancelled = status == TaskStatus::Cancelled;
            let keep_button = !(last || cancelled);
            self.render(&batch, keep_button.then_some(&affordance)).await;

            if cancelled {
                batch.cancel_remaining(idx + 1, BATCH_TERMINATED);
                break;
            }
            if !last {
                tokio::time::sleep(self.opts.inter_task_delay).await;
            }
        }

        let summary = BatchSummary::tally(id, &batch.snapshot(), batch.elapsed());
        let text = render_summary(&summary);
        self.render_text(&batch, &text, None).await;

        drop(guard);
        info!(
            target: "courier.exec.batch",
            user = user.get(),
            batch = id.get(),
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            elapsed_s = summary.elapsed.as_secs(),
            "batch finished"
        );
        self.registry.emit(
            Event::new(EventKind::BatchFinished, user, id).with_reason(format!(
                "{} completed, {} failed, {} cancelled",
                summary.completed, summary.failed, summary.cancelled
            )),
        );
        summary
    }

    async fn render(&self, batch: &Batch, cancel: Option<&CancelAffordance>) {
        let text = render_batch_status(batch.id(), &batch.snapshot());
        self.render_text(batch, &text, cancel).await;
    }

    async fn render_text(&self, batch: &Batch, text: &str, cancel: Option<&CancelAffordance>) {
        let handle = batch.status_handle();
        if let Err(e) = self.renderer.render(&handle, text, cancel).await {
            warn!(target: "courier.exec.batch", batch = batch.id().get(), error = %e, "status render failed");
            self.registry.emit(
                Event::new(EventKind::RenderFailed, batch.user(), batch.id())
                    .with_reason(e.to_string()),
            );
        }
    }
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("opts", &self.opts)
            .field("forwarded", &self.forwarded_total())
            .finish()
    }
}

/// Progress sink of the running task.
struct TaskProgress {
    batch: Arc<Batch>,
    idx: usize,
    throttle: Mutex<Throttle>,
    wake: mpsc::UnboundedSender<()>,
}

impl ProgressSink for TaskProgress {
    fn report(&self, percent: u32, line: &str) {
        trace!(target: "courier.exec.batch", batch = self.batch.id().get(), percent, line, "progress");
        self.batch.record_progress(self.idx, percent, line);
        if self.throttle.lock().ready() {
            let _ = self.wake.send(());
        }
    }
}

/// Removes the batch from the registry on drop.
struct Deregister<'a> {
    registry: &'a TaskRegistry,
    user: UserId,
    batch: BatchId,
}

impl Drop for Deregister<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.user, self.batch);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use courier_core::{Task, TaskRegistry};
    use courier_model::{
        BatchId, CancelAffordance, ChatId, StatusHandle, Target, TaskStatus, UserId,
    };
    use parking_lot::Mutex;
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::ExecError;

    #[derive(Clone)]
    enum Step {
        Ok,
        Fail(&'static str),
        /// Report each percent 400ms apart, then succeed.
        Report(Vec<u32>),
        /// Signal `started`, then wait for the token.
        Block,
    }

    #[derive(Default)]
    struct Script {
        steps: HashMap<String, Step>,
        calls: Mutex<Vec<(String, Option<Target>)>>,
        started: Notify,
    }

    impl Script {
        fn new(steps: &[(&str, Step)]) -> Arc<Self> {
            Arc::new(Self {
                steps: steps
                    .iter()
                    .map(|(d, s)| (d.to_string(), s.clone()))
                    .collect(),
                ..Default::default()
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().iter().map(|(d, _)| d.clone()).collect()
        }
    }

    #[async_trait]
    impl Forwarder for Script {
        async fn forward(
            &self,
            cancel: &CancellationToken,
            descriptor: &str,
            target: Option<Target>,
            progress: &dyn ProgressSink,
        ) -> Result<(), ExecError> {
            self.calls.lock().push((descriptor.to_string(), target));
            match self.steps.get(descriptor).cloned().unwrap_or(Step::Ok) {
                Step::Ok => Ok(()),
                Step::Fail(msg) => Err(ExecError::Forward(msg.to_string())),
                Step::Report(percents) => {
                    for p in percents {
                        tokio::time::sleep(Duration::from_millis(400)).await;
                        progress.report(p, "(1 MB/s)");
                    }
                    Ok(())
                }
                Step::Block => {
                    self.started.notify_one();
                    cancel.cancelled().await;
                    Err(ExecError::Cancelled)
                }
            }
        }
    }

    #[derive(Default)]
    struct Screen {
        renders: Mutex<Vec<(String, bool)>>,
        broken: AtomicBool,
    }

    impl Screen {
        fn renders(&self) -> Vec<(String, bool)> {
            self.renders.lock().clone()
        }
    }

    #[async_trait]
    impl StatusRenderer for Screen {
        async fn create(
            &self,
            chat: ChatId,
            _text: &str,
            _cancel: Option<&CancelAffordance>,
        ) -> Result<StatusHandle, ExecError> {
            Ok(StatusHandle { chat, message: 1 })
        }

        async fn render(
            &self,
            _handle: &StatusHandle,
            text: &str,
            cancel: Option<&CancelAffordance>,
        ) -> Result<(), ExecError> {
            if self.broken.load(Ordering::Relaxed) {
                return Err(ExecError::Render("message not found".into()));
            }
            self.renders.lock().push((text.to_string(), cancel.is_some()));
            Ok(())
        }
    }

    const USER: UserId = UserId(77);

    fn setup(
        items: &[&str],
        target: Option<Target>,
        forwarder: Arc<Script>,
    ) -> (TaskRegistry, BatchExecutor, Arc<Screen>, Arc<Batch>) {
        let registry = TaskRegistry::new();
        let screen = Arc::new(Screen::default());
        let exec = BatchExecutor::new(registry.clone(), forwarder, screen.clone());

        let id = registry.next_batch_id(USER);
        let tasks = items
            .iter()
            .map(|d| Task::new(registry.next_task_id(USER), *d))
            .collect();
        let batch = Arc::new(Batch::new(
            id,
            USER,
            tasks,
            StatusHandle {
                chat: USER.get(),
                message: 1,
            },
            target,
        ));
        registry.register(batch.clone());
        (registry, exec, screen, batch)
    }

    fn statuses(batch: &Batch) -> Vec<TaskStatus> {
        batch.snapshot().iter().map(|t| t.status).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn runs_all_tasks_in_order() {
        let script = Script::new(&[]);
        let (registry, exec, screen, batch) = setup(&["a", "b", "c"], None, script.clone());

        let summary = exec.run(batch.clone()).await;

        assert_eq!(script.calls(), vec!["a", "b", "c"]);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.total, 3);
        assert_eq!(exec.forwarded_total(), 3);
        assert!(registry.get(USER, batch.id()).is_none());

        let renders = screen.renders();
        // start + finish per task, then the summary
        assert_eq!(renders.len(), 7);
        assert!(renders[0].0.contains("Task: 1/3"));
        assert!(renders[0].1);
        // last task's final render drops the button
        assert!(!renders[5].1);
        assert!(renders[4].1);
        let (last, button) = renders.last().unwrap();
        assert!(last.starts_with("📦 Batch #1 finished"));
        assert!(!button);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_does_not_abort_batch() {
        let script = Script::new(&[("b", Step::Fail("peer not found"))]);
        let (_registry, exec, _screen, batch) = setup(&["a", "b", "c"], None, script.clone());

        let summary = exec.run(batch.clone()).await;

        assert_eq!(
            statuses(&batch),
            vec![TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Completed]
        );
        assert_eq!(
            batch.task(1).unwrap().error.as_deref(),
            Some("forward failed: peer not found")
        );
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 2);
        assert_eq!(script.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_batch_stops_remaining_tasks() {
        let script = Script::new(&[("b", Step::Block)]);
        let (registry, exec, screen, batch) = setup(&["a", "b", "c"], None, script.clone());

        let handle = exec.spawn(batch.clone());
        script.started.notified().await;
        assert!(registry.cancel(USER, batch.id()));

        let summary = handle.await.unwrap();

        assert_eq!(
            statuses(&batch),
            vec![TaskStatus::Completed, TaskStatus::Cancelled, TaskStatus::Cancelled]
        );
        let snap = batch.snapshot();
        assert_eq!(snap[1].error.as_deref(), Some(CANCELLED_BY_USER));
        assert_eq!(snap[2].error.as_deref(), Some(BATCH_TERMINATED));
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.cancelled, 2);
        assert_eq!(script.calls(), vec!["a", "b"]);

        // gone from the registry, so a second cancel reports nothing to do
        assert!(registry.get(USER, batch.id()).is_none());
        assert!(!registry.cancel(USER, batch.id()));

        let renders = screen.renders();
        let after_cancel = &renders[renders.len() - 2];
        assert!(after_cancel.0.contains("[Cancelled]"));
        assert!(!after_cancel.1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_runs_nothing() {
        let script = Script::new(&[]);
        let (registry, exec, screen, batch) = setup(&["a", "b"], None, script.clone());
        registry.cancel(USER, batch.id());

        let summary = exec.run(batch.clone()).await;

        assert!(script.calls().is_empty());
        assert_eq!(summary.cancelled, 2);
        assert!(
            batch
                .snapshot()
                .iter()
                .all(|t| t.error.as_deref() == Some(BATCH_TERMINATED))
        );
        // only the summary is rendered
        assert_eq!(screen.renders().len(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_renders_are_throttled() {
        let script = Script::new(&[("a", Step::Report(vec![10, 10, 20, 30]))]);
        let (_registry, exec, screen, batch) = setup(&["a"], None, script);

        exec.run(batch.clone()).await;

        // start, one throttled progress render at ~1.2s, finish, summary
        let renders = screen.renders();
        assert_eq!(renders.len(), 4);
        assert!(renders[1].0.contains("[Forwarding 20%]"));
        assert!(renders[1].1);

        let snap = batch.task(0).unwrap();
        assert_eq!(
            snap.history,
            vec!["10% - (1 MB/s)", "20% - (1 MB/s)", "30% - (1 MB/s)"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_tasks_use_the_long_interval() {
        let script = Script::new(&[("/tmp/export.json", Step::Report(vec![10, 20, 30, 40]))]);
        let (_registry, exec, screen, batch) = setup(&["/tmp/export.json"], None, script);

        exec.run(batch).await;

        // 1.6s of progress never reaches the 30s bulk interval
        assert_eq!(screen.renders().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn inter_task_delay_is_applied_between_tasks_only() {
        let script = Script::new(&[]);
        let (_registry, exec, _screen, batch) = setup(&["a", "b", "c"], None, script);
        let exec = exec.with_options(ExecutorOptions {
            inter_task_delay: Duration::from_secs(5),
            ..ExecutorOptions::default()
        });

        let started = tokio::time::Instant::now();
        let summary = exec.run(batch).await;

        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(10), "{waited:?}");
        assert!(waited < Duration::from_secs(11), "{waited:?}");
        assert_eq!(summary.completed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn render_failures_are_ignored() {
        let script = Script::new(&[]);
        let (registry, exec, screen, batch) = setup(&["a", "b"], None, script);
        screen.broken.store(true, Ordering::Relaxed);

        let summary = exec.run(batch).await;

        assert_eq!(summary.completed, 2);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn target_override_reaches_forwarder() {
        let script = Script::new(&[]);
        let (_registry, exec, _screen, batch) = setup(&["x.json"], Some(-100123), script.clone());

        exec.run(batch).await;

        assert_eq!(script.calls.lock()[0].1, Some(-100123));
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_returns_summary() {
        let script = Script::new(&[]);
        let (_registry, exec, _screen, batch) = setup(&["a"], None, script);
        let summary = exec.spawn(batch).await.unwrap();
        assert_eq!(summary.batch, BatchId(1));
        assert_eq!(summary.completed, 1);
    }
}
