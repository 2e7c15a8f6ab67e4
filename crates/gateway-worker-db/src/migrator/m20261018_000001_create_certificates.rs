//! Create the certificates table

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Certificates::Table)
                    .if_not_exists()
                    .col(string_len(Certificates::Domain, 255).primary_key())
                    .col(text(Certificates::CertificatePem))
                    .col(text(Certificates::PrivateKeyPem))
                    .col(timestamp_with_time_zone(Certificates::ExpiresAt).not_null())
                    .col(string_len(Certificates::CertificateType, 16).not_null())
                    .col(
                        timestamp_with_time_zone(Certificates::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Certificates::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // The sweep reads every row; expiry ordering is used by operators
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_certificates_expires_at")
                    .table(Certificates::Table)
                    .col(Certificates::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Certificates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Certificates {
    #[sea_orm(iden = "certificates")]
    Table,
    Domain,
    CertificatePem,
    PrivateKeyPem,
    ExpiresAt,
    CertificateType,
    CreatedAt,
    UpdatedAt,
}
