//! Bounded priority job queue with a fixed worker pool
//!
//! Jobs are held in a binary heap ordered by priority (lower value first) and,
//! for equal priorities, by submission order. Submission never blocks: a full
//! queue rejects the job immediately.

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::history::{JobHistory, JobOutcome, JobRecord};
use crate::{Job, JobError, JobHandler, JobType, QueueError};

/// Default bounded buffer size
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default number of concurrent workers
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Queue sizing
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of pending jobs
    pub capacity: usize,
    /// Number of workers started by [`JobQueue::start`]
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKER_COUNT,
        }
    }
}

/// Heap entry; `Ord` is reversed so the max-heap yields the most urgent job
struct QueuedJob {
    job: Job,
    seq: u64,
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .job
            .priority
            .cmp(&self.job.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedJob {}

struct QueueInner {
    pending: Mutex<BinaryHeap<QueuedJob>>,
    capacity: usize,
    workers: usize,
    seq: AtomicU64,
    /// Written only while `pending` is locked
    closed: AtomicBool,
    /// Token of the running worker pool; cancellation stops admission at once
    shutdown: Mutex<Option<CancellationToken>>,
    notify: Notify,
    handlers: DashMap<JobType, Arc<dyn JobHandler>>,
    history: Arc<dyn JobHistory>,
}

/// Shared handle to the job queue
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    pub fn new(config: QueueConfig, history: Arc<dyn JobHistory>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(BinaryHeap::new()),
                capacity: config.capacity.max(1),
                workers: config.workers.max(1),
                seq: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                shutdown: Mutex::new(None),
                notify: Notify::new(),
                handlers: DashMap::new(),
                history,
            }),
        }
    }

    /// Register the handler for a job type, replacing any previous one
    pub fn register_handler(&self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        if self.inner.handlers.insert(job_type, handler).is_some() {
            warn!(job_type = %job_type, "Replaced existing job handler");
        } else {
            debug!(job_type = %job_type, "Registered job handler");
        }
    }

    pub fn has_handler(&self, job_type: JobType) -> bool {
        self.inner.handlers.contains_key(&job_type)
    }

    /// Enqueue a job without blocking
    ///
    /// # Errors
    ///
    /// `QueueFull` when the buffer is at capacity, `Closed` once shutdown began.
    pub fn submit(&self, job: Job) -> Result<(), QueueError> {
        let mut pending = self.inner.pending.lock();

        if self.inner.admission_closed() {
            return Err(QueueError::Closed);
        }

        if pending.len() >= self.inner.capacity {
            return Err(QueueError::QueueFull {
                capacity: self.inner.capacity,
            });
        }

        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = job.priority,
            retry_count = job.retry_count,
            "Job submitted"
        );

        let seq = self.inner.seq.fetch_add(1, AtomicOrdering::Relaxed);
        pending.push(QueuedJob { job, seq });
        drop(pending);

        self.inner.notify.notify_one();
        Ok(())
    }

    /// Stop admitting jobs
    pub fn close(&self) {
        let pending = self.inner.pending.lock();
        if !self.inner.closed.swap(true, AtomicOrdering::AcqRel) {
            info!(pending = pending.len(), "Job queue closed to new submissions");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.admission_closed()
    }

    /// Number of jobs waiting for a worker
    pub fn len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Spawn the worker pool
    ///
    /// Cancelling `cancel` closes the queue and asks every worker to exit after
    /// its current job.
    pub fn start(&self, cancel: CancellationToken) -> WorkerPool {
        info!(
            workers = self.inner.workers,
            capacity = self.inner.capacity,
            "Starting queue workers"
        );

        *self.inner.shutdown.lock() = Some(cancel.clone());

        let queue = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            queue.close();
        });

        let handles = (0..self.inner.workers)
            .map(|worker_id| {
                let inner = self.inner.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { inner.run_worker(worker_id, cancel).await })
            })
            .collect();

        WorkerPool {
            handles,
            cancel,
            queue: self.clone(),
        }
    }
}

impl QueueInner {
    async fn run_worker(self: Arc<Self>, worker_id: usize, cancel: CancellationToken) {
        info!(worker_id, "Worker started");

        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = self.next_job() => job,
            };

            self.process(worker_id, job).await;
        }

        info!(worker_id, "Worker stopping");
    }

    async fn next_job(&self) -> Job {
        loop {
            if let Some(queued) = self.pending.lock().pop() {
                return queued.job;
            }
            self.notify.notified().await;
        }
    }

    async fn process(self: &Arc<Self>, worker_id: usize, job: Job) {
        let span = info_span!(
            "job",
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempt()
        );

        async move {
            let handler = self
                .handlers
                .get(&job.job_type)
                .map(|entry| Arc::clone(entry.value()));

            let Some(handler) = handler else {
                warn!(worker_id, "No handler registered for job type, dropping job");
                self.history
                    .record(JobRecord::new(&job, JobOutcome::Dropped, None))
                    .await;
                return;
            };

            debug!(worker_id, priority = job.priority, "Processing job");

            let result = AssertUnwindSafe(handler.handle(&job))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(JobError::Fatal(format!(
                        "handler panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });

            match result {
                Ok(()) => {
                    info!(worker_id, "Job succeeded");
                    self.history
                        .record(JobRecord::new(&job, JobOutcome::Succeeded, None))
                        .await;
                }
                Err(err) if err.is_retryable() && job.can_retry() => {
                    warn!(
                        worker_id,
                        max_retries = job.max_retries,
                        error = %err,
                        "Job failed, scheduling retry"
                    );

                    let mut retry = job.clone();
                    retry.retry_count += 1;

                    if let Err(submit_err) = self.resubmit(retry) {
                        let terminal = JobError::Fatal(format!(
                            "{} (retry not submitted: {})",
                            err.message(),
                            submit_err
                        ));
                        self.fail(handler.as_ref(), &job, terminal).await;
                    }
                }
                Err(err) => self.fail(handler.as_ref(), &job, err).await,
            }
        }
        .instrument(span)
        .await
    }

    fn admission_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
            || self
                .shutdown
                .lock()
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
    }

    fn resubmit(&self, job: Job) -> Result<(), QueueError> {
        let mut pending = self.pending.lock();

        if self.admission_closed() {
            return Err(QueueError::Closed);
        }
        if pending.len() >= self.capacity {
            return Err(QueueError::QueueFull {
                capacity: self.capacity,
            });
        }

        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        pending.push(QueuedJob { job, seq });
        drop(pending);

        self.notify.notify_one();
        Ok(())
    }

    async fn fail(&self, handler: &dyn JobHandler, job: &Job, err: JobError) {
        error!(
            attempts = job.attempt(),
            max_retries = job.max_retries,
            error = %err,
            "Job failed terminally"
        );

        handler.on_terminal_failure(job, &err).await;

        self.history
            .record(JobRecord::new(
                job,
                JobOutcome::Failed,
                Some(err.message().to_string()),
            ))
            .await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// How a worker pool shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every worker finished its in-flight job and exited
    Graceful,
    /// The grace period elapsed and the remaining workers were aborted
    TimedOut { aborted: usize },
}

/// Running workers started by [`JobQueue::start`]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    queue: JobQueue,
}

impl WorkerPool {
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Stop admission, let workers finish in-flight jobs, abort after `grace`
    pub async fn shutdown(self, grace: Duration) -> ShutdownOutcome {
        self.queue.close();
        self.cancel.cancel();

        let abort_handles: Vec<_> = self.handles.iter().map(|h| h.abort_handle()).collect();

        match tokio::time::timeout(grace, futures::future::join_all(self.handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "Worker task ended abnormally");
                    }
                }

                let discarded = self.queue.len();
                if discarded > 0 {
                    warn!(discarded, "Discarding queued jobs at shutdown");
                }

                info!("All workers stopped");
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                let aborted = abort_handles.iter().filter(|h| !h.is_finished()).count();
                for handle in &abort_handles {
                    handle.abort();
                }

                warn!(
                    aborted,
                    grace_secs = grace.as_secs(),
                    "Shutdown grace period elapsed, aborting workers"
                );
                ShutdownOutcome::TimedOut { aborted }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn job_with_priority(priority: i32) -> Job {
        Job::new(JobType::Analytics, Map::new()).with_priority(priority)
    }

    #[test]
    fn test_heap_orders_by_priority_then_submission() {
        let mut heap = BinaryHeap::new();
        let entries = [(1000, 0), (10, 1), (1000, 2), (10, 3), (50, 4)];
        for (priority, seq) in entries {
            heap.push(QueuedJob {
                job: job_with_priority(priority),
                seq,
            });
        }

        let order: Vec<(i32, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|q| (q.job.priority, q.seq))
            .collect();

        assert_eq!(order, vec![(10, 1), (10, 3), (50, 4), (1000, 0), (1000, 2)]);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
