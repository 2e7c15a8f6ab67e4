//! Job queue for the gateway worker
//!
//! A bounded, priority-ordered queue drained by a fixed pool of workers. Each
//! job type is routed to a registered [`JobHandler`]; transient failures are
//! re-submitted until the job's retry budget is spent and every terminal
//! outcome is written to a [`JobHistory`].

pub mod error;
pub mod handler;
pub mod history;
pub mod job;
pub mod queue;

pub use error::{JobError, QueueError};
pub use handler::JobHandler;
pub use history::{
    InMemoryJobHistory, JobHistory, JobOutcome, JobRecord, DEFAULT_HISTORY_CAPACITY,
};
pub use job::{Job, JobType, DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY};
pub use queue::{
    JobQueue, QueueConfig, ShutdownOutcome, WorkerPool, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_WORKER_COUNT,
};
