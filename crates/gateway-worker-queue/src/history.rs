//! Job history
//!
//! Jobs are not retained as live objects once they finish; their terminal
//! outcome is recorded here instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Job, JobType};

/// Default number of records kept by [`InMemoryJobHistory`]
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Terminal outcome of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed,
    /// No handler was registered for the job type
    Dropped,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Failed => "failed",
            JobOutcome::Dropped => "dropped",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(JobOutcome::Succeeded),
            "failed" => Ok(JobOutcome::Failed),
            "dropped" => Ok(JobOutcome::Dropped),
            other => Err(format!("Unknown job outcome: {}", other)),
        }
    }
}

/// Record of a finished job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub priority: i32,
    /// Attempts made, including the last one
    pub attempts: u32,
    pub outcome: JobOutcome,
    /// Last error, for failed jobs
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(job: &Job, outcome: JobOutcome, error: Option<String>) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type,
            priority: job.priority,
            attempts: job.attempt(),
            outcome,
            error,
            finished_at: Utc::now(),
        }
    }
}

/// Sink for terminal job outcomes
#[async_trait]
pub trait JobHistory: Send + Sync {
    async fn record(&self, record: JobRecord);
}

/// Bounded in-memory history, newest records kept
pub struct InMemoryJobHistory {
    records: Mutex<VecDeque<JobRecord>>,
    capacity: usize,
}

impl InMemoryJobHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Records in the order they were written (oldest first)
    pub fn records(&self) -> Vec<JobRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Records for a single job
    pub fn for_job(&self, job_id: Uuid) -> Vec<JobRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for InMemoryJobHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHistory for InMemoryJobHistory {
    async fn record(&self, record: JobRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn test_history_keeps_newest_records() {
        let history = InMemoryJobHistory::with_capacity(2);

        let jobs: Vec<Job> = (0..3)
            .map(|_| Job::new(JobType::Analytics, Map::new()))
            .collect();
        for job in &jobs {
            history
                .record(JobRecord::new(job, JobOutcome::Succeeded, None))
                .await;
        }

        let records = history.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].job_id, jobs[1].id);
        assert_eq!(records[1].job_id, jobs[2].id);
    }

    #[test]
    fn test_record_counts_attempts() {
        let mut job = Job::new(JobType::ConfigUpdate, Map::new());
        job.retry_count = 2;
        let record = JobRecord::new(&job, JobOutcome::Failed, Some("boom".to_string()));
        assert_eq!(record.attempts, 3);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_outcome_round_trip_names() {
        for outcome in [JobOutcome::Succeeded, JobOutcome::Failed, JobOutcome::Dropped] {
            assert_eq!(outcome.as_str().parse::<JobOutcome>().unwrap(), outcome);
        }
    }
}
