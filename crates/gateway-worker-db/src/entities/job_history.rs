//! Terminal job outcomes

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum Outcome {
    #[sea_orm(string_value = "succeeded")]
    Succeeded,

    #[sea_orm(string_value = "failed")]
    Failed,

    /// No handler registered for the job type
    #[sea_orm(string_value = "dropped")]
    Dropped,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub job_id: String,

    pub job_type: String,

    pub priority: i32,

    pub attempts: i32,

    pub outcome: Outcome,

    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,

    pub finished_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
