use std::{
    cmp::Reverse,
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use courier_core::{Batch, BotConfig, CourierConfig, DedupCache, MonitorConfig, Task, TaskRegistry};
use courier_exec::{BatchExecutor, render_batch_status};
use courier_model::{
    BatchId, BatchSummary, CancelAffordance, ChatId, EditVersion, StatusHandle, SubscriptionOutcome,
    SubscriptionRequest, Target, TaskId, TaskSnapshot, UserId, VerificationReport,
};
use courier_verify::{ChatExport, Lookup, VerificationPool, VerifyProgress, cleaned_path};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::ApiError,
    links::{LinkExtractor, filter_links, matches_any},
    subscription::SubscriptionClient,
};

/// Answer to a cancel-button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReply {
    Cancelled,
    /// Batch unknown or already finished.
    NotFound,
    /// The button belongs to another user.
    Forbidden,
    /// Payload is not a cancel request.
    Invalid,
}

impl CancelReply {
    /// Short toast text shown to the requester.
    pub fn message(&self) -> &'static str {
        match self {
            CancelReply::Cancelled => "✅ All tasks cancelled",
            CancelReply::NotFound => "⚠️ Batch not found or already finished",
            CancelReply::Forbidden => "❌ You cannot cancel another user's tasks",
            CancelReply::Invalid => "⚠️ Invalid action",
        }
    }
}

/// A batch accepted by [`Courier::create_batch`] and its running driver.
pub struct BatchHandle {
    batch: Arc<Batch>,
    join: JoinHandle<BatchSummary>,
}

impl BatchHandle {
    pub fn id(&self) -> BatchId {
        self.batch.id()
    }

    pub fn user(&self) -> UserId {
        self.batch.user()
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.batch.status_handle()
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.batch.snapshot().iter().map(|t| t.id).collect()
    }

    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.batch.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the driver and return the final tally.
    pub async fn wait(self) -> Result<BatchSummary, ApiError> {
        Ok(self.join.await?)
    }
}

impl fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHandle")
            .field("user", &self.user())
            .field("batch", &self.id())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Result of checking an exported chat history.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportVerification {
    pub report: VerificationReport,
    /// Written next to the export when some ids were invalid and the run completed.
    pub cleaned: Option<PathBuf>,
}

/// A message read back from a channel's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: i64,
    pub version: EditVersion,
    pub text: String,
}

/// Entry point of the agent: batches, cancellation, verification and the monitor pipeline.
pub struct Courier {
    executor: BatchExecutor,
    cache: Arc<DedupCache>,
    pool: VerificationPool,
    links: LinkExtractor,
    monitor: MonitorConfig,
    bot: BotConfig,
    subscriptions: Option<Arc<dyn SubscriptionClient>>,
}

impl Courier {
    pub fn new(
        cfg: &CourierConfig,
        executor: BatchExecutor,
        lookup: Arc<dyn Lookup>,
    ) -> Result<Self, ApiError> {
        let cache = DedupCache::new(cfg.monitor.cache_capacity)?;
        let links = LinkExtractor::new(&cfg.monitor.filters)
            .map_err(|e| ApiError::InvalidRequest(format!("bad link filters: {e}")))?;
        let pool = VerificationPool::new(lookup)
            .with_workers(cfg.verify.workers)
            .with_call_delay(Duration::from_millis(cfg.verify.call_delay_ms));

        Ok(Self {
            executor,
            cache: Arc::new(cache),
            pool,
            links,
            monitor: cfg.monitor.clone(),
            bot: cfg.bot.clone(),
            subscriptions: None,
        })
    }

    pub fn with_subscription_client(mut self, client: Arc<dyn SubscriptionClient>) -> Self {
        self.subscriptions = Some(client);
        self
    }

    pub fn with_verify_progress(mut self, progress: Arc<dyn VerifyProgress>) -> Self {
        self.pool = self.pool.with_progress(progress);
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.executor.registry()
    }

    pub fn executor(&self) -> &BatchExecutor {
        &self.executor
    }

    pub fn is_allowed(&self, user: UserId) -> bool {
        self.bot.is_user_allowed(user.get())
    }

    /// Gate for every user-initiated command.
    pub fn authorize(&self, user: UserId) -> Result<(), ApiError> {
        if self.is_allowed(user) {
            Ok(())
        } else {
            debug!(target: "courier.api.service", user = user.get(), "user not on allow-list");
            Err(ApiError::Unauthorized(user))
        }
    }

    /// Register `items` as a new batch of `user` and start executing it.
    ///
    /// The initial status message is posted to `chat` first; if that fails
    /// nothing is registered.
    pub async fn create_batch(
        &self,
        user: UserId,
        chat: ChatId,
        items: Vec<String>,
        target: Option<Target>,
    ) -> Result<BatchHandle, ApiError> {
        self.authorize(user)?;
        let items: Vec<String> = items
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect();
        if items.is_empty() {
            return Err(ApiError::InvalidRequest("batch has no items".into()));
        }

        let registry = self.registry();
        let id = registry.next_batch_id(user);
        let tasks: Vec<Task> = items
            .into_iter()
            .map(|descriptor| Task::new(registry.next_task_id(user), descriptor))
            .collect();

        let snapshot: Vec<TaskSnapshot> = tasks.iter().map(Task::snapshot).collect();
        let text = render_batch_status(id, &snapshot);
        let affordance = CancelAffordance::new(user, id);
        let status = self
            .executor
            .renderer()
            .create(chat, &text, Some(&affordance))
            .await
            .map_err(ApiError::StatusMessage)?;

        let batch = Arc::new(Batch::new(id, user, tasks, status, target));
        registry.register(batch.clone());
        info!(target: "courier.api.service", user = user.get(), batch = id.get(), tasks = batch.len(), "batch created");

        let join = self.executor.spawn(batch.clone());
        Ok(BatchHandle { batch, join })
    }

    pub fn cancel_batch(&self, user: UserId, batch: BatchId) -> bool {
        self.registry().cancel(user, batch)
    }

    /// Handle a press of the cancel button carrying `data`.
    pub fn handle_cancel_callback(&self, requester: UserId, data: &str) -> CancelReply {
        let Ok(affordance) = data.parse::<CancelAffordance>() else {
            debug!(target: "courier.api.service", data, "ignoring unknown callback");
            return CancelReply::Invalid;
        };
        if !self.is_allowed(requester) {
            return CancelReply::Forbidden;
        }
        if affordance.user != requester {
            warn!(
                target: "courier.api.service",
                requester = requester.get(),
                owner = affordance.user.get(),
                batch = affordance.batch.get(),
                "cancel attempt on foreign batch"
            );
            return CancelReply::Forbidden;
        }
        if self.cancel_batch(affordance.user, affordance.batch) {
            info!(target: "courier.api.service", user = requester.get(), batch = affordance.batch.get(), "batch cancelled by user");
            CancelReply::Cancelled
        } else {
            CancelReply::NotFound
        }
    }

    pub fn render_batch_status(&self, handle: &BatchHandle) -> String {
        render_batch_status(handle.id(), &handle.snapshot())
    }

    pub async fn run_verification(
        &self,
        cancel: &CancellationToken,
        source: i64,
        ids: &[i64],
    ) -> Result<VerificationReport, ApiError> {
        Ok(self.pool.run(cancel, source, ids).await?)
    }

    /// Verify every message of a chat export and write a cleaned copy when some are gone.
    pub async fn verify_export(
        &self,
        cancel: &CancellationToken,
        path: impl AsRef<Path>,
    ) -> Result<ExportVerification, ApiError> {
        let path = path.as_ref();
        let export = ChatExport::load(path)?;
        let ids = export.message_ids();
        let report = self.pool.run(cancel, export.id, &ids).await?;

        let cleaned = if report.invalid > 0 && report.complete {
            let out = cleaned_path(path);
            export.without_ids(&report.invalid_ids).save(&out)?;
            Some(out)
        } else {
            None
        };
        Ok(ExportVerification { report, cleaned })
    }

    /// Dedup classification of an incoming message: `(was_known, should_process)`.
    pub fn observe(&self, source: i64, item: i64, version: EditVersion) -> (bool, bool) {
        self.cache.add_or_update(source, item, version)
    }

    /// Links worth registering from a message of `channel`.
    ///
    /// Only monitored channels count. Non-whitelisted channels must also pass
    /// the content filter; blacklisted links are dropped.
    pub fn screen_message(&self, channel: i64, text: &str) -> Vec<String> {
        if !self.monitor.channels.contains(&channel) || text.trim().is_empty() {
            return Vec::new();
        }
        let filters = &self.monitor.filters;
        let whitelisted = self.monitor.whitelist_channels.contains(&channel);
        if !whitelisted && !matches_any(text, &filters.content_filter) {
            return Vec::new();
        }
        filter_links(&self.links.extract(text), &filters.link_blacklist)
    }

    /// [`Courier::observe`] followed by [`Courier::screen_message`] for new or edited messages.
    pub fn ingest(&self, channel: i64, item: i64, version: EditVersion, text: &str) -> Vec<String> {
        let (_, should_process) = self.observe(channel, item, version);
        if !should_process {
            return Vec::new();
        }
        self.screen_message(channel, text)
    }

    /// Number of history messages taken per channel on startup; `0` disables backfill.
    pub fn history_count(&self) -> usize {
        self.monitor.fetch_history_count as usize
    }

    /// Run the newest [`Courier::history_count`] messages of `history` through
    /// [`Courier::ingest`], oldest first, and return the links found without repeats.
    pub fn backfill(&self, channel: i64, history: &[ChannelMessage]) -> Vec<String> {
        let count = self.history_count();
        if count == 0 {
            return Vec::new();
        }
        let mut recent: Vec<&ChannelMessage> = history.iter().collect();
        recent.sort_by_key(|m| Reverse(m.id));
        recent.truncate(count);

        let mut seen = HashSet::new();
        let links: Vec<String> = recent
            .into_iter()
            .rev()
            .flat_map(|m| self.ingest(channel, m.id, m.version, &m.text))
            .filter(|link| seen.insert(link.clone()))
            .collect();
        info!(target: "courier.api.service", channel, links = links.len(), "history backfilled");
        links
    }

    /// Register links with the subscription service.
    ///
    /// Subscriptions go one request each; nodes are sent together in one
    /// request. A failed call becomes an `Error` outcome.
    pub async fn submit_links(&self, links: &[String]) -> Result<Vec<SubscriptionOutcome>, ApiError> {
        let client = self.subscriptions.as_ref().ok_or(ApiError::NotConfigured)?;
        let (subs, nodes) = self.links.partition(links);

        let mut requests: Vec<SubscriptionRequest> =
            subs.iter().map(SubscriptionRequest::subscription).collect();
        if !nodes.is_empty() {
            requests.push(SubscriptionRequest::nodes(nodes.as_slice()));
        }

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            let outcome = match client.submit(request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(target: "courier.api.service", error = %e, "subscription request failed");
                    SubscriptionOutcome::Error {
                        message: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

impl fmt::Debug for Courier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Courier")
            .field("executor", &self.executor)
            .field("pool", &self.pool)
            .field("cached", &self.cache.len())
            .field("subscriptions", &self.subscriptions.is_some())
            .finish()
    }
}
