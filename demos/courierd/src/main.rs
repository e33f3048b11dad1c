use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use courier_api::{Courier, HttpSubscriptionClient, SubmissionSummary};
use courier_core::{CourierConfig, Subscribe, Subscribers, TaskRegistry};
use courier_exec::{BatchExecutor, ExecError, ExecutorOptions, ProcConfig, ProcForwarder, StatusRenderer};
use courier_model::{BatchId, CancelAffordance, ChatId, StatusHandle, UserId};
use courier_observe::{LogSubscriber, LoggerConfig, logger_init};
use courier_verify::{Lookup, VerifyError};

/// Prints status messages to stdout instead of a chat.
#[derive(Default)]
struct ConsoleRenderer {
    next_id: AtomicI64,
}

#[async_trait]
impl StatusRenderer for ConsoleRenderer {
    async fn create(
        &self,
        chat: ChatId,
        text: &str,
        cancel: Option<&CancelAffordance>,
    ) -> Result<StatusHandle, ExecError> {
        let message = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = StatusHandle { chat, message };
        self.render(&handle, text, cancel).await?;
        Ok(handle)
    }

    async fn render(
        &self,
        handle: &StatusHandle,
        text: &str,
        cancel: Option<&CancelAffordance>,
    ) -> Result<(), ExecError> {
        println!("--- [{}:{}]\n{text}", handle.chat, handle.message);
        if let Some(cancel) = cancel {
            println!("[{}] -> cancel {}", cancel.label(), cancel.batch);
        }
        Ok(())
    }
}

/// No chat client is attached to the demo, so every lookup fails.
struct Detached;

#[async_trait]
impl Lookup for Detached {
    async fn lookup(&self, _cancel: &CancellationToken, _source: i64, _id: i64) -> Result<i64, VerifyError> {
        Err(VerifyError::Lookup("no chat client attached".into()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Config
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    let mut cfg = CourierConfig::load(&path).with_context(|| format!("loading {path}"))?;
    let warnings = cfg.validate();

    // 2) Logger
    let log_cfg = LoggerConfig::try_from(&cfg.logger)?;
    logger_init(&log_cfg)?;
    for w in &warnings {
        warn!("{w}");
    }
    info!(config = %path, "logger initialized");

    // 3) Registry + executor
    let subscribers = Subscribers::new(vec![Arc::new(LogSubscriber::new()) as Arc<dyn Subscribe>]);
    let registry = TaskRegistry::with_subscribers(subscribers);

    let program = std::env::var("COURIER_FORWARD_PROGRAM").unwrap_or_else(|_| "tdl".to_string());
    let forwarder = ProcForwarder::new(ProcConfig {
        program,
        default_target: (cfg.bot.forward_target != 0).then_some(cfg.bot.forward_target),
        mode: cfg.bot.forward_mode,
        echo: true,
        ..ProcConfig::default()
    });
    let executor = BatchExecutor::new(registry, Arc::new(forwarder), Arc::new(ConsoleRenderer::default()))
        .with_options(ExecutorOptions::from(&cfg.executor));

    // 4) Service
    let mut courier = Courier::new(&cfg, executor, Arc::new(Detached))?;
    if cfg.monitor.enabled {
        let client = HttpSubscriptionClient::new(&cfg.monitor.subscription_api)?;
        courier = courier.with_subscription_client(Arc::new(client));
        info!("subscription api configured");
    }

    let user = UserId(cfg.bot.allowed_users.first().copied().unwrap_or(0));
    info!(user = user.get(), "reading commands from stdin; press Ctrl+C to stop");

    // 5) Command loop
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => handle(&courier, user, line.trim()).await,
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down...");
                break;
            }
        }
    }

    for batch in courier.registry().list_by_user(user) {
        courier.cancel_batch(user, batch.id());
    }
    Ok(())
}

async fn handle(courier: &Courier, user: UserId, line: &str) {
    let mut words = line.split_whitespace();
    match words.next() {
        None => {}
        Some("cancel") => {
            let Some(Ok(id)) = words.next().map(str::parse::<u64>) else {
                println!("usage: cancel <batch>");
                return;
            };
            let data = CancelAffordance::new(user, BatchId(id)).callback_data();
            println!("{}", courier.handle_cancel_callback(user, &data).message());
        }
        Some("status") => {
            for batch in courier.registry().list_by_user(user) {
                println!("{}", courier_exec::render_batch_status(batch.id(), &batch.snapshot()));
            }
        }
        Some("monitor") => {
            let Some(Ok(channel)) = words.next().map(str::parse::<i64>) else {
                println!("usage: monitor <channel> <text>");
                return;
            };
            let text = words.collect::<Vec<_>>().join(" ");
            let links = courier.screen_message(channel, &text);
            if links.is_empty() {
                println!("no links");
                return;
            }
            match courier.submit_links(&links).await {
                Ok(outcomes) => {
                    let summary = SubmissionSummary::from_outcomes(&outcomes);
                    println!(
                        "submitted {}, succeeded {}, nodes added {}",
                        summary.submitted, summary.succeeded, summary.stats.added
                    );
                }
                Err(e) => println!("links: {}\n{e}", links.join(" ")),
            }
        }
        Some(_) => {
            let items: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            let chat = user.get();
            match courier.create_batch(user, chat, items, None).await {
                Ok(handle) => info!(batch = handle.id().get(), tasks = handle.task_ids().len(), "batch accepted"),
                Err(e) => warn!(error = %e, "batch rejected"),
            }
        }
    }
}
