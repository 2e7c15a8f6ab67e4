//! Integration tests for the job queue and worker pool
//!
//! These exercise ordering, the capacity bound, the retry budget and the
//! shutdown behaviour through the public API only.

use async_trait::async_trait;
use gateway_worker_queue::{
    InMemoryJobHistory, Job, JobError, JobHandler, JobOutcome, JobQueue, JobRecord, JobType,
    QueueConfig, QueueError, ShutdownOutcome,
};
use serde_json::Map;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Reports each job it sees on a channel
struct RecordingHandler {
    seen: mpsc::UnboundedSender<Job>,
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let _ = self.seen.send(job.clone());
        Ok(())
    }
}

/// Fails every attempt with a fixed error
struct FailingHandler {
    error: JobError,
    attempts: AtomicU32,
    terminal_calls: AtomicU32,
}

impl FailingHandler {
    fn new(error: JobError) -> Self {
        Self {
            error,
            attempts: AtomicU32::new(0),
            terminal_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl JobHandler for FailingHandler {
    async fn handle(&self, _job: &Job) -> Result<(), JobError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    async fn on_terminal_failure(&self, _job: &Job, _error: &JobError) {
        self.terminal_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sleeps before succeeding
struct SlowHandler {
    delay: Duration,
}

#[async_trait]
impl JobHandler for SlowHandler {
    async fn handle(&self, _job: &Job) -> Result<(), JobError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

struct PanickingHandler;

#[async_trait]
impl JobHandler for PanickingHandler {
    async fn handle(&self, _job: &Job) -> Result<(), JobError> {
        panic!("handler exploded");
    }
}

fn queue(capacity: usize, workers: usize) -> (JobQueue, Arc<InMemoryJobHistory>) {
    let history = Arc::new(InMemoryJobHistory::new());
    let queue = JobQueue::new(QueueConfig { capacity, workers }, history.clone());
    (queue, history)
}

fn job(job_type: JobType) -> Job {
    Job::new(job_type, Map::new())
}

async fn wait_for_record(history: &InMemoryJobHistory, job_id: Uuid) -> JobRecord {
    for _ in 0..500 {
        if let Some(record) = history.for_job(job_id).into_iter().next() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no history record for job {}", job_id);
}

#[tokio::test]
async fn test_jobs_dequeued_by_priority_then_submission_order() {
    let (queue, _history) = queue(100, 1);
    let (tx, mut rx) = mpsc::unbounded_channel();
    queue.register_handler(
        JobType::ConfigUpdate,
        Arc::new(RecordingHandler { seen: tx }),
    );

    let routine_a = job(JobType::ConfigUpdate).with_priority(1000);
    let urgent_a = job(JobType::ConfigUpdate).with_priority(10);
    let routine_b = job(JobType::ConfigUpdate).with_priority(1000);
    let urgent_b = job(JobType::ConfigUpdate).with_priority(10);
    let medium = job(JobType::ConfigUpdate).with_priority(50);

    let expected = vec![urgent_a.id, urgent_b.id, medium.id, routine_a.id, routine_b.id];

    for j in [routine_a, urgent_a, routine_b, urgent_b, medium] {
        queue.submit(j).unwrap();
    }

    let cancel = CancellationToken::new();
    let pool = queue.start(cancel.clone());

    let mut order = Vec::new();
    for _ in 0..expected.len() {
        let seen = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for job")
            .expect("channel closed");
        order.push(seen.id);
    }

    assert_eq!(order, expected);
    assert_eq!(pool.shutdown(Duration::from_secs(5)).await, ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_submit_rejects_when_full() {
    let (queue, _history) = queue(2, 1);

    queue.submit(job(JobType::Analytics)).unwrap();
    queue.submit(job(JobType::Analytics)).unwrap();

    let err = queue.submit(job(JobType::Analytics)).unwrap_err();
    assert_eq!(err, QueueError::QueueFull { capacity: 2 });
    assert_eq!(queue.len(), 2);
}

#[tokio::test]
async fn test_retryable_failure_stops_at_max_retries() {
    let (queue, history) = queue(10, 2);
    let handler = Arc::new(FailingHandler::new(JobError::retryable("upstream timeout")));
    queue.register_handler(JobType::ConfigUpdate, handler.clone());

    let pool = queue.start(CancellationToken::new());

    let submitted = job(JobType::ConfigUpdate).with_max_retries(2);
    let job_id = submitted.id;
    queue.submit(submitted).unwrap();

    let record = wait_for_record(&history, job_id).await;
    assert_eq!(record.outcome, JobOutcome::Failed);
    assert_eq!(record.attempts, 3);
    assert_eq!(record.error.as_deref(), Some("upstream timeout"));
    assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(handler.terminal_calls.load(Ordering::SeqCst), 1);

    pool.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_fatal_failure_is_not_retried() {
    let (queue, history) = queue(10, 1);
    let handler = Arc::new(FailingHandler::new(JobError::fatal("bad payload")));
    queue.register_handler(JobType::ConfigUpdate, handler.clone());

    let pool = queue.start(CancellationToken::new());

    let submitted = job(JobType::ConfigUpdate);
    let job_id = submitted.id;
    queue.submit(submitted).unwrap();

    let record = wait_for_record(&history, job_id).await;
    assert_eq!(record.outcome, JobOutcome::Failed);
    assert_eq!(record.attempts, 1);
    assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(handler.terminal_calls.load(Ordering::SeqCst), 1);

    pool.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_job_without_handler_is_dropped() {
    let (queue, history) = queue(10, 1);
    let pool = queue.start(CancellationToken::new());

    let submitted = job(JobType::Integration);
    let job_id = submitted.id;
    queue.submit(submitted).unwrap();

    let record = wait_for_record(&history, job_id).await;
    assert_eq!(record.outcome, JobOutcome::Dropped);
    assert_eq!(record.attempts, 1);

    pool.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_panicking_handler_does_not_kill_worker() {
    let (queue, history) = queue(10, 1);
    let (tx, mut rx) = mpsc::unbounded_channel();
    queue.register_handler(JobType::Analytics, Arc::new(PanickingHandler));
    queue.register_handler(
        JobType::ConfigUpdate,
        Arc::new(RecordingHandler { seen: tx }),
    );

    let pool = queue.start(CancellationToken::new());

    let exploding = job(JobType::Analytics);
    let exploding_id = exploding.id;
    queue.submit(exploding).unwrap();

    let record = wait_for_record(&history, exploding_id).await;
    assert_eq!(record.outcome, JobOutcome::Failed);
    assert!(record.error.unwrap().contains("handler exploded"));

    let follow_up = job(JobType::ConfigUpdate);
    let follow_up_id = follow_up.id;
    queue.submit(follow_up).unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("single worker should still be running")
        .unwrap();
    assert_eq!(seen.id, follow_up_id);

    pool.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_cancellation_closes_queue() {
    let (queue, _history) = queue(10, 1);
    let cancel = CancellationToken::new();
    let pool = queue.start(cancel.clone());

    cancel.cancel();

    // no yield: admission stops before any task observes the token
    assert!(queue.is_closed());
    assert_eq!(
        queue.submit(job(JobType::Analytics)).unwrap_err(),
        QueueError::Closed
    );
    assert_eq!(pool.shutdown(Duration::from_secs(5)).await, ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_job() {
    let (queue, history) = queue(10, 1);
    queue.register_handler(
        JobType::ConfigUpdate,
        Arc::new(SlowHandler {
            delay: Duration::from_millis(200),
        }),
    );

    let pool = queue.start(CancellationToken::new());

    let submitted = job(JobType::ConfigUpdate);
    let job_id = submitted.id;
    queue.submit(submitted).unwrap();

    // let the worker pick the job up
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = pool.shutdown(Duration::from_secs(5)).await;
    assert_eq!(outcome, ShutdownOutcome::Graceful);

    let records = history.for_job(job_id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, JobOutcome::Succeeded);
}

#[tokio::test]
async fn test_shutdown_aborts_after_grace_period() {
    let (queue, history) = queue(10, 1);
    queue.register_handler(
        JobType::ConfigUpdate,
        Arc::new(SlowHandler {
            delay: Duration::from_secs(60),
        }),
    );

    let pool = queue.start(CancellationToken::new());

    let submitted = job(JobType::ConfigUpdate);
    let job_id = submitted.id;
    queue.submit(submitted).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = pool.shutdown(Duration::from_millis(100)).await;
    assert_eq!(outcome, ShutdownOutcome::TimedOut { aborted: 1 });
    assert!(history.for_job(job_id).is_empty());
}
