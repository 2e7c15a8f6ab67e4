//! Certificate entity, one row per domain

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Issuer class of a stored certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum CertificateKind {
    #[sea_orm(string_value = "production")]
    Production,

    #[sea_orm(string_value = "staging")]
    Staging,

    #[sea_orm(string_value = "temporary")]
    Temporary,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "certificates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub domain: String,

    #[sea_orm(column_type = "Text")]
    pub certificate_pem: String,

    #[sea_orm(column_type = "Text")]
    pub private_key_pem: String,

    pub expires_at: ChronoDateTimeUtc,

    pub certificate_type: CertificateKind,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
