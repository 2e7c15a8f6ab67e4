//! SeaORM-backed job history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_worker_queue::{JobHistory, JobOutcome, JobRecord, JobType};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use tracing::{debug, error};
use uuid::Uuid;

use crate::entities::job_history::{self, Outcome};

/// Terminal job outcomes persisted in the `job_history` table
#[derive(Clone)]
pub struct SeaOrmJobHistory {
    db: DatabaseConnection,
}

impl SeaOrmJobHistory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Most recent records first
    pub async fn recent(&self, limit: u64) -> Result<Vec<JobRecord>, DbErr> {
        job_history::Entity::find()
            .order_by_desc(job_history::Column::FinishedAt)
            .limit(limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(to_record)
            .collect()
    }

    /// Delete records that finished before `cutoff`, returning how many went
    pub async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DbErr> {
        let result = job_history::Entity::delete_many()
            .filter(job_history::Column::FinishedAt.lt(cutoff))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

impl From<JobOutcome> for Outcome {
    fn from(value: JobOutcome) -> Self {
        match value {
            JobOutcome::Succeeded => Outcome::Succeeded,
            JobOutcome::Failed => Outcome::Failed,
            JobOutcome::Dropped => Outcome::Dropped,
        }
    }
}

impl From<Outcome> for JobOutcome {
    fn from(value: Outcome) -> Self {
        match value {
            Outcome::Succeeded => JobOutcome::Succeeded,
            Outcome::Failed => JobOutcome::Failed,
            Outcome::Dropped => JobOutcome::Dropped,
        }
    }
}

fn to_record(model: job_history::Model) -> Result<JobRecord, DbErr> {
    let job_id = Uuid::parse_str(&model.job_id)
        .map_err(|e| DbErr::Custom(format!("Invalid job id {}: {}", model.job_id, e)))?;
    let job_type = model.job_type.parse::<JobType>().map_err(DbErr::Custom)?;

    Ok(JobRecord {
        job_id,
        job_type,
        priority: model.priority,
        attempts: u32::try_from(model.attempts).unwrap_or(0),
        outcome: model.outcome.into(),
        error: model.error,
        finished_at: model.finished_at,
    })
}

#[async_trait]
impl JobHistory for SeaOrmJobHistory {
    async fn record(&self, record: JobRecord) {
        let model = job_history::ActiveModel {
            job_id: Set(record.job_id.to_string()),
            job_type: Set(record.job_type.as_str().to_string()),
            priority: Set(record.priority),
            attempts: Set(i32::try_from(record.attempts).unwrap_or(i32::MAX)),
            outcome: Set(record.outcome.into()),
            error: Set(record.error.clone()),
            finished_at: Set(record.finished_at),
        };

        // A history write failure must not affect the job itself
        match job_history::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
        {
            Ok(_) => debug!(
                job_id = %record.job_id,
                job_type = %record.job_type,
                outcome = %record.outcome,
                "Recorded job outcome"
            ),
            Err(e) => error!(
                job_id = %record.job_id,
                job_type = %record.job_type,
                outcome = %record.outcome,
                error = %e,
                "Failed to record job outcome"
            ),
        }
    }
}
