//! Job handler trait
//!
//! Each job type is dispatched to exactly one handler registered on the queue.

use async_trait::async_trait;

use crate::{Job, JobError};

/// Executes jobs of one type
///
/// # Example
/// ```ignore
/// struct CleanupHandler;
///
/// #[async_trait]
/// impl JobHandler for CleanupHandler {
///     async fn handle(&self, job: &Job) -> Result<(), JobError> {
///         // prune old rows
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run one attempt of the job
    ///
    /// Return `JobError::Retryable` for transient failures; the queue re-submits
    /// the job with an incremented retry count while `job.can_retry()` holds.
    async fn handle(&self, job: &Job) -> Result<(), JobError>;

    /// Called once when the job reaches a terminal failure
    ///
    /// This covers exhausted retries, fatal errors, panics and retries that
    /// could not be re-submitted (queue full or closed).
    async fn on_terminal_failure(&self, _job: &Job, _error: &JobError) {}
}
