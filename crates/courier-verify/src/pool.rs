use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use courier_model::{FirstFailure, VerificationJob, VerificationReport, VerificationResult};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::VerifyError;

/// Single-item existence check.
///
/// Returns the id of the item actually found, which the pool compares
/// against the requested one. Must be idempotent.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(
        &self,
        cancel: &CancellationToken,
        source: i64,
        id: i64,
    ) -> Result<i64, VerifyError>;
}

/// Coarse progress callback: `(percent, processed, total)`, at most once per 10 %.
pub trait VerifyProgress: Send + Sync {
    fn report(&self, percent: u32, processed: usize, total: usize);
}

impl<F> VerifyProgress for F
where
    F: Fn(u32, usize, usize) + Send + Sync,
{
    fn report(&self, percent: u32, processed: usize, total: usize) {
        self(percent, processed, total)
    }
}

const PROGRESS_STEP: usize = 10;

/// Fixed-size worker pool reconciling out-of-order lookups back to input order.
#[derive(Clone)]
pub struct VerificationPool {
    lookup: Arc<dyn Lookup>,
    workers: usize,
    call_delay: Duration,
    progress: Option<Arc<dyn VerifyProgress>>,
}

impl VerificationPool {
    pub fn new(lookup: Arc<dyn Lookup>) -> Self {
        Self {
            lookup,
            workers: 20,
            call_delay: Duration::from_millis(10),
            progress: None,
        }
    }

    /// Number of concurrent workers, at least one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Pause each worker takes after every lookup.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn VerifyProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Check every id of `ids` against `source`.
    ///
    /// Once `cancel` fires workers stop taking jobs and the report covers what
    /// was processed so far, with `complete == false`.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        source: i64,
        ids: &[i64],
    ) -> Result<VerificationReport, VerifyError> {
        if ids.is_empty() {
            return Err(VerifyError::Empty);
        }
        let total = ids.len();
        info!(target: "courier.verify.pool", source, total, workers = self.workers, "verification started");

        let (job_tx, job_rx) = mpsc::channel(total);
        for (index, &id) in ids.iter().enumerate() {
            job_tx
                .send(VerificationJob { index, id })
                .await
                .map_err(|_| VerifyError::Closed)?;
        }
        drop(job_tx);

        let jobs = Arc::new(Mutex::new(job_rx));
        let (res_tx, mut res_rx) = mpsc::channel(total);
        let mut set = JoinSet::new();
        for worker in 0..self.workers.min(total) {
            set.spawn(run_worker(
                worker,
                self.lookup.clone(),
                jobs.clone(),
                res_tx.clone(),
                cancel.clone(),
                source,
                self.call_delay,
            ));
        }
        drop(res_tx);

        let mut report = VerificationReport {
            total,
            ..VerificationReport::default()
        };
        let mut invalid: Vec<(usize, i64)> = Vec::new();
        let mut processed = 0usize;
        let mut last_step = 0usize;

        while let Some(res) = res_rx.recv().await {
            processed += 1;
            let percent = processed * 100 / total;
            if percent >= last_step + PROGRESS_STEP {
                last_step = percent;
                debug!(target: "courier.verify.pool", percent, processed, total, "verification progress");
                if let Some(progress) = &self.progress {
                    progress.report(percent as u32, processed, total);
                }
            }

            if res.valid {
                report.valid += 1;
                continue;
            }
            report.invalid += 1;
            invalid.push((res.index, res.id));
            let lower = report
                .first_failure
                .as_ref()
                .is_none_or(|first| res.index < first.index);
            if lower {
                let message = res.message.unwrap_or_default();
                warn!(target: "courier.verify.pool", index = res.index, id = res.id, error = %message, "invalid item");
                report.first_failure = Some(FirstFailure {
                    index: res.index,
                    id: res.id,
                    message,
                });
            }
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!(target: "courier.verify.pool", error = %e, "verification worker aborted");
            }
        }

        invalid.sort_unstable_by_key(|(index, _)| *index);
        report.invalid_ids = invalid.into_iter().map(|(_, id)| id).collect();
        report.complete = report.processed() == total;

        info!(
            target: "courier.verify.pool",
            source,
            total,
            valid = report.valid,
            invalid = report.invalid,
            complete = report.complete,
            "verification finished"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for VerificationPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationPool")
            .field("workers", &self.workers)
            .field("call_delay", &self.call_delay)
            .finish()
    }
}

async fn run_worker(
    worker: usize,
    lookup: Arc<dyn Lookup>,
    jobs: Arc<Mutex<mpsc::Receiver<VerificationJob>>>,
    results: mpsc::Sender<VerificationResult>,
    cancel: CancellationToken,
    source: i64,
    delay: Duration,
) {
    loop {
        if cancel.is_cancelled() {
            trace!(target: "courier.verify.pool", worker, "cancelled; worker exits");
            break;
        }
        let job = { jobs.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };

        let result = match lookup.lookup(&cancel, source, job.id).await {
            Err(_) if cancel.is_cancelled() => break,
            Err(e) => VerificationResult::invalid(job, e.to_string()),
            Ok(found) if found != job.id => VerificationResult::invalid(
                job,
                format!("id mismatch: expected {}, got {found}", job.id),
            ),
            Ok(_) => VerificationResult::valid(job),
        };
        if results.send(result).await.is_err() {
            break;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            Mutex as StdMutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use rand::Rng;

    use super::*;

    /// Ids in `bad` fail; ids in `moved` resolve to another id. Random latency per call.
    struct Fake {
        bad: HashSet<i64>,
        moved: HashSet<i64>,
        max_jitter_ms: u64,
        calls: AtomicUsize,
    }

    impl Fake {
        fn new(bad: &[i64], moved: &[i64], max_jitter_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                bad: bad.iter().copied().collect(),
                moved: moved.iter().copied().collect(),
                max_jitter_ms,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Lookup for Fake {
        async fn lookup(
            &self,
            _cancel: &CancellationToken,
            _source: i64,
            id: i64,
        ) -> Result<i64, VerifyError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.max_jitter_ms > 0 {
                let ms = rand::thread_rng().gen_range(0..=self.max_jitter_ms);
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            if self.bad.contains(&id) {
                return Err(VerifyError::Lookup(format!("message {id} not found")));
            }
            if self.moved.contains(&id) {
                return Ok(id + 1);
            }
            Ok(id)
        }
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let pool = VerificationPool::new(Fake::new(&[], &[], 0));
        let err = pool.run(&CancellationToken::new(), 1, &[]).await.unwrap_err();
        assert!(matches!(err, VerifyError::Empty));
    }

    #[tokio::test]
    async fn all_valid_has_no_first_failure() {
        let pool = VerificationPool::new(Fake::new(&[], &[], 0)).with_call_delay(Duration::ZERO);
        let ids: Vec<i64> = (1..=50).collect();
        let report = pool.run(&CancellationToken::new(), 1, &ids).await.unwrap();

        assert_eq!(report.total, 50);
        assert_eq!(report.valid, 50);
        assert!(report.first_failure.is_none());
        assert!(report.invalid_ids.is_empty());
        assert!(report.complete);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn first_failure_is_lowest_index_regardless_of_timing() {
        let ids: Vec<i64> = (100..300).collect();
        let bad = [250, 140, 299, 101];
        let moved = [180];

        for _ in 0..5 {
            let fake = Fake::new(&bad, &moved, 5);
            let pool = VerificationPool::new(fake.clone())
                .with_workers(20)
                .with_call_delay(Duration::from_millis(1));
            let report = pool.run(&CancellationToken::new(), 7, &ids).await.unwrap();

            assert_eq!(report.valid + report.invalid, ids.len());
            assert_eq!(report.invalid, 5);
            assert_eq!(report.invalid_ids, vec![101, 140, 180, 250, 299]);

            let first = report.first_failure.unwrap();
            assert_eq!(first.index, 1);
            assert_eq!(first.id, 101);
            assert_eq!(first.message, "lookup failed: message 101 not found");
            assert_eq!(fake.calls.load(Ordering::Relaxed), ids.len());
        }
    }

    #[tokio::test]
    async fn id_mismatch_is_reported() {
        let pool = VerificationPool::new(Fake::new(&[], &[3], 0)).with_call_delay(Duration::ZERO);
        let report = pool
            .run(&CancellationToken::new(), 1, &[1, 2, 3])
            .await
            .unwrap();
        let first = report.first_failure.unwrap();
        assert_eq!(first.index, 2);
        assert_eq!(first.message, "id mismatch: expected 3, got 4");
    }

    #[tokio::test]
    async fn progress_is_reported_in_ten_percent_steps() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let pool = VerificationPool::new(Fake::new(&[], &[], 0))
            .with_workers(3)
            .with_call_delay(Duration::ZERO)
            .with_progress(Arc::new(move |pct: u32, _done: usize, _total: usize| {
                sink.lock().unwrap().push(pct);
            }));
        let ids: Vec<i64> = (1..=20).collect();
        pool.run(&CancellationToken::new(), 1, &ids).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]
        );
    }

    #[tokio::test]
    async fn cancelled_run_is_incomplete() {
        let fake = Fake::new(&[], &[], 0);
        let pool = VerificationPool::new(fake.clone())
            .with_workers(2)
            .with_call_delay(Duration::from_millis(20));
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let ids: Vec<i64> = (1..=1_000).collect();
        let report = pool.run(&token, 1, &ids).await.unwrap();

        assert!(!report.complete);
        assert!(report.processed() < ids.len());
        assert_eq!(report.processed(), fake.calls.load(Ordering::Relaxed));
        assert_eq!(report.total, ids.len());
    }
}
