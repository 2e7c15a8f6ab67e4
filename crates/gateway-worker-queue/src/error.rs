//! Queue and job errors

use thiserror::Error;

/// Errors returned to callers submitting jobs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The bounded buffer has no room. Retry with backoff.
    #[error("Job queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Shutdown has begun and no new jobs are admitted
    #[error("Job queue is closed")]
    Closed,
}

/// Failure reported by a job handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Transient failure; the job is re-submitted while retries remain
    #[error("Retryable job failure: {0}")]
    Retryable(String),

    /// The job cannot succeed; it is never re-submitted
    #[error("Fatal job failure: {0}")]
    Fatal(String),
}

impl JobError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        JobError::Retryable(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        JobError::Fatal(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Retryable(_))
    }

    /// The message without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            JobError::Retryable(msg) | JobError::Fatal(msg) => msg,
        }
    }
}
