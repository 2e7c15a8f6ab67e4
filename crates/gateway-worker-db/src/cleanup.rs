//! `database_cleanup` job handler

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gateway_worker_queue::{Job, JobError, JobHandler};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::SeaOrmJobHistory;

/// Default retention window for job history
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

const RETENTION_KEY: &str = "retention_days";

/// Deletes job history older than the retention window
pub struct DatabaseCleanupHandler {
    history: Arc<SeaOrmJobHistory>,
}

impl DatabaseCleanupHandler {
    pub fn new(history: Arc<SeaOrmJobHistory>) -> Self {
        Self { history }
    }
}

fn retention_days(job: &Job) -> Result<i64, JobError> {
    match job.payload.get(RETENTION_KEY) {
        None | Some(Value::Null) => Ok(DEFAULT_RETENTION_DAYS),
        Some(value) => value
            .as_i64()
            .filter(|days| *days >= 1)
            .ok_or_else(|| {
                JobError::fatal(format!(
                    "retention_days must be a positive integer, got {}",
                    value
                ))
            }),
    }
}

/// Oldest `finished_at` kept by a cleanup run at `now`
fn cutoff(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, JobError> {
    Duration::try_days(days)
        .and_then(|retention| now.checked_sub_signed(retention))
        .ok_or_else(|| JobError::fatal(format!("retention_days {} is out of range", days)))
}

#[async_trait]
impl JobHandler for DatabaseCleanupHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let days = retention_days(job)?;
        let cutoff = cutoff(Utc::now(), days)?;

        let deleted = self
            .history
            .delete_finished_before(cutoff)
            .await
            .map_err(|e| JobError::retryable(format!("Failed to delete job history: {}", e)))?;

        info!(
            job_id = %job.id,
            retention_days = days,
            deleted,
            "Database cleanup completed"
        );
        Ok(())
    }
}
