//! Create the job_history table

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JobHistory::Table)
                    .if_not_exists()
                    .col(string_len(JobHistory::JobId, 36).primary_key())
                    .col(string_len(JobHistory::JobType, 32).not_null())
                    .col(integer(JobHistory::Priority))
                    .col(integer(JobHistory::Attempts))
                    .col(string_len(JobHistory::Outcome, 16).not_null())
                    .col(text_null(JobHistory::Error))
                    .col(timestamp_with_time_zone(JobHistory::FinishedAt).not_null())
                    .to_owned(),
            )
            .await?;

        // Cleanup deletes by age
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_history_finished_at")
                    .table(JobHistory::Table)
                    .col(JobHistory::FinishedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum JobHistory {
    #[sea_orm(iden = "job_history")]
    Table,
    JobId,
    JobType,
    Priority,
    Attempts,
    Outcome,
    Error,
    FinishedAt,
}
