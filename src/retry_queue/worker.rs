//! Background worker draining the retry queue.
//!
//! A single sweep loop claims due jobs and hands each to the delivery
//! handler on its own task. Concurrency is bounded by a semaphore and the
//! overall attempt rate by a token bucket, so a large backlog drains without
//! stampeding the delivery channels.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::models::RetryJob;
use super::policy::RetryPolicy;
use super::store::RetryQueueStore;
use crate::server::metrics;

/// Outcome of one redelivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    Failed(String),
}

/// Delivery side of the queue. The worker owns job bookkeeping; the handler
/// owns the channels and the notification record.
#[async_trait]
pub trait RetryHandler: Send + Sync {
    /// Try to deliver the notification once, through whatever channels are
    /// currently available.
    async fn attempt(&self, job: &RetryJob) -> AttemptOutcome;

    /// A failed attempt was rescheduled with the given retry count.
    fn on_retry_scheduled(&self, notification_id: i64, retry_count: i32);

    /// All retries are spent. The notification stays queryable but will not
    /// be redelivered.
    fn on_exhausted(&self, notification_id: i64, attempts: i32);
}

/// Token bucket limiting attempts per second across all workers.
struct RateLimiter {
    state: Mutex<RateLimiterState>,
    rate_per_sec: f64,
    capacity: f64,
}

struct RateLimiterState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    fn new(rate_per_sec: u32) -> Self {
        let rate = rate_per_sec.max(1) as f64;
        Self {
            state: Mutex::new(RateLimiterState {
                tokens: rate,
                last_refill: Instant::now(),
            }),
            rate_per_sec: rate,
            capacity: rate,
        }
    }

    async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
                state.last_refill = Instant::now();
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.rate_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

pub struct RetryWorker {
    store: Arc<dyn RetryQueueStore>,
    handler: Arc<dyn RetryHandler>,
    policy: RetryPolicy,
    sweep_interval: Duration,
    concurrency: Arc<Semaphore>,
    rate_limiter: Arc<RateLimiter>,
}

impl RetryWorker {
    pub fn new(
        store: Arc<dyn RetryQueueStore>,
        handler: Arc<dyn RetryHandler>,
        policy: RetryPolicy,
        sweep_interval_secs: u64,
        worker_concurrency: usize,
        rate_limit_per_sec: u32,
    ) -> Self {
        Self {
            store,
            handler,
            policy,
            sweep_interval: Duration::from_secs(sweep_interval_secs.max(1)),
            concurrency: Arc::new(Semaphore::new(worker_concurrency.max(1))),
            rate_limiter: Arc::new(RateLimiter::new(rate_limit_per_sec)),
        }
    }

    /// Run until cancelled. One sweep at a time; a sweep that takes longer
    /// than the interval simply delays the next one.
    pub async fn run(self: Arc<Self>, cancellation_token: CancellationToken) {
        if let Ok(recovered) = self.store.reset_in_flight() {
            if recovered > 0 {
                info!("Recovered {} in-flight retry jobs from previous run", recovered);
            }
        }

        let mut interval = tokio::time::interval(self.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Retry worker shutting down");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!("Retry sweep failed: {}", e);
                    }
                }
            }
        }
    }

    /// Claim everything due and spawn attempts. Returns once every claimed
    /// job has been handed off; the semaphore keeps the actual attempt
    /// concurrency bounded across sweeps.
    pub async fn sweep(&self) -> anyhow::Result<()> {
        let now = chrono::Utc::now().timestamp();
        let due = self.store.claim_due(now, 1000)?;
        if due.is_empty() {
            return Ok(());
        }
        debug!("Retry sweep claimed {} due jobs", due.len());

        for job in due {
            let permit = self
                .concurrency
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let store = self.store.clone();
            let handler = self.handler.clone();
            let policy = self.policy.clone();
            let rate_limiter = self.rate_limiter.clone();

            tokio::spawn(async move {
                let _permit = permit;
                rate_limiter.acquire().await;
                process_job(&*store, &*handler, &policy, &job).await;
            });
        }

        if let Ok(stats) = self.store.stats() {
            metrics::observe_queue_depth(&stats);
        }
        Ok(())
    }
}

async fn process_job(
    store: &dyn RetryQueueStore,
    handler: &dyn RetryHandler,
    policy: &RetryPolicy,
    job: &RetryJob,
) {
    match handler.attempt(job).await {
        AttemptOutcome::Delivered => {
            metrics::observe_retry_attempt("delivered");
            if let Err(e) = store.mark_done(job.id) {
                error!("Failed to mark retry job {} done: {}", job.id, e);
            }
        }
        AttemptOutcome::Failed(error) => {
            let attempts = job.retry_count + 1;
            if policy.should_retry(attempts) {
                metrics::observe_retry_attempt("rescheduled");
                let next_retry_at = policy.next_retry_at(attempts);
                if let Err(e) = store.mark_retry(job.id, attempts, next_retry_at, &error) {
                    error!("Failed to reschedule retry job {}: {}", job.id, e);
                }
                handler.on_retry_scheduled(job.notification_id, attempts);
            } else {
                metrics::observe_retry_attempt("exhausted");
                warn!(
                    "Notification {} exhausted retries after {} attempts: {}",
                    job.notification_id, attempts, error
                );
                if let Err(e) = store.mark_failed(job.id, attempts, &error) {
                    error!("Failed to mark retry job {} failed: {}", job.id, e);
                }
                handler.on_exhausted(job.notification_id, attempts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry_queue::models::{JobPriority, JobStatus};
    use crate::retry_queue::store::InMemoryRetryQueueStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct ScriptedHandler {
        outcomes: StdMutex<Vec<AttemptOutcome>>,
        attempts: AtomicUsize,
        exhausted: StdMutex<Vec<(i64, i32)>>,
        rescheduled: StdMutex<Vec<(i64, i32)>>,
    }

    impl ScriptedHandler {
        fn new(outcomes: Vec<AttemptOutcome>) -> Self {
            Self {
                outcomes: StdMutex::new(outcomes),
                attempts: AtomicUsize::new(0),
                exhausted: StdMutex::new(Vec::new()),
                rescheduled: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RetryHandler for ScriptedHandler {
        async fn attempt(&self, _job: &RetryJob) -> AttemptOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                AttemptOutcome::Failed("no script".to_string())
            } else {
                outcomes.remove(0)
            }
        }

        fn on_retry_scheduled(&self, notification_id: i64, retry_count: i32) {
            self.rescheduled
                .lock()
                .unwrap()
                .push((notification_id, retry_count));
        }

        fn on_exhausted(&self, notification_id: i64, attempts: i32) {
            self.exhausted
                .lock()
                .unwrap()
                .push((notification_id, attempts));
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_backoff_secs: 5,
            max_backoff_secs: 300,
        }
    }

    #[tokio::test]
    async fn successful_attempt_marks_job_done() {
        let store = Arc::new(InMemoryRetryQueueStore::new());
        let handler = ScriptedHandler::new(vec![AttemptOutcome::Delivered]);
        store.enqueue(1, "s1", JobPriority::Normal, 0).unwrap();
        let job = store.claim_due(0, 10).unwrap().remove(0);

        process_job(&*store, &handler, &policy(), &job).await;

        assert_eq!(store.get_job(job.id).unwrap().unwrap().status, JobStatus::Done);
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_attempt_reschedules_with_backoff() {
        let store = Arc::new(InMemoryRetryQueueStore::new());
        let handler = ScriptedHandler::new(vec![AttemptOutcome::Failed("nope".to_string())]);
        store.enqueue(1, "s1", JobPriority::Normal, 0).unwrap();
        let job = store.claim_due(0, 10).unwrap().remove(0);

        process_job(&*store, &handler, &policy(), &job).await;

        let stored = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        assert!(stored.next_retry_at > chrono::Utc::now().timestamp());
        assert_eq!(*handler.rescheduled.lock().unwrap(), vec![(1, 1)]);
    }

    #[tokio::test]
    async fn exhausted_job_is_marked_failed() {
        let store = Arc::new(InMemoryRetryQueueStore::new());
        let handler = ScriptedHandler::new(vec![AttemptOutcome::Failed("still down".to_string())]);
        store.enqueue(7, "s1", JobPriority::Normal, 0).unwrap();
        let mut job = store.claim_due(0, 10).unwrap().remove(0);
        // Two earlier failed attempts already recorded
        store.mark_retry(job.id, 2, 0, "earlier").unwrap();
        job = store.claim_due(0, 10).unwrap().remove(0);

        process_job(&*store, &handler, &policy(), &job).await;

        let stored = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.retry_count, 3);
        assert_eq!(*handler.exhausted.lock().unwrap(), vec![(7, 3)]);
    }

    #[tokio::test]
    async fn sweep_processes_all_due_jobs() {
        let store = Arc::new(InMemoryRetryQueueStore::new());
        let handler = Arc::new(ScriptedHandler::new(vec![
            AttemptOutcome::Delivered,
            AttemptOutcome::Delivered,
            AttemptOutcome::Delivered,
        ]));
        for id in 1..=3 {
            store.enqueue(id, "s1", JobPriority::Normal, 0).unwrap();
        }
        let worker = Arc::new(RetryWorker::new(
            store.clone(),
            handler.clone(),
            policy(),
            10,
            4,
            100,
        ));

        worker.sweep().await.unwrap();
        // Attempts run on spawned tasks
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
        let stats = store.stats().unwrap();
        assert_eq!(stats.done, 3);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn rate_limiter_spaces_out_acquisitions() {
        let limiter = RateLimiter::new(10);
        // Drain the initial burst
        for _ in 0..10 {
            limiter.acquire().await;
        }
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
