//! Job model
//!
//! A job is a unit of asynchronous work. Jobs are created by the certificate
//! sweep or by an external trigger, picked up by exactly one worker and then
//! discarded once a terminal outcome has been recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default priority for routine work (lower value = more urgent)
pub const DEFAULT_PRIORITY: i32 = 1000;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Kinds of work the worker knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CertificateRenewal,
    CertificateValidation,
    ConfigUpdate,
    LogProcessing,
    Analytics,
    DatabaseCleanup,
    Integration,
}

impl JobType {
    pub const ALL: [JobType; 7] = [
        JobType::CertificateRenewal,
        JobType::CertificateValidation,
        JobType::ConfigUpdate,
        JobType::LogProcessing,
        JobType::Analytics,
        JobType::DatabaseCleanup,
        JobType::Integration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::CertificateRenewal => "certificate_renewal",
            JobType::CertificateValidation => "certificate_validation",
            JobType::ConfigUpdate => "config_update",
            JobType::LogProcessing => "log_processing",
            JobType::Analytics => "analytics",
            JobType::DatabaseCleanup => "database_cleanup",
            JobType::Integration => "integration",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown job type: {}", s))
    }
}

/// A unit of asynchronous work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    /// Opaque key/value data interpreted by the handler
    pub payload: Map<String, Value>,
    /// Lower value is dequeued first
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(job_type: JobType, payload: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            payload,
            priority: DEFAULT_PRIORITY,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Add a single payload entry
    pub fn with_payload_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// String value of a payload entry, if present
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Whether another attempt is allowed after the current one fails
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Number of attempts made so far, including the current one
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }
}
