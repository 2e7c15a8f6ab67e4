//! SeaORM-backed certificate store

use async_trait::async_trait;
use gateway_worker_cert::{Certificate, CertificateStore, CertificateType, StoreError};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, DatabaseConnection, DbErr, EntityTrait, QueryOrder};
use tracing::debug;

use crate::entities::certificate::{self, CertificateKind};

/// Certificates persisted in the `certificates` table
#[derive(Clone)]
pub struct SeaOrmCertificateStore {
    db: DatabaseConnection,
}

impl SeaOrmCertificateStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl From<CertificateType> for CertificateKind {
    fn from(value: CertificateType) -> Self {
        match value {
            CertificateType::Production => CertificateKind::Production,
            CertificateType::Staging => CertificateKind::Staging,
            CertificateType::Temporary => CertificateKind::Temporary,
        }
    }
}

impl From<CertificateKind> for CertificateType {
    fn from(value: CertificateKind) -> Self {
        match value {
            CertificateKind::Production => CertificateType::Production,
            CertificateKind::Staging => CertificateType::Staging,
            CertificateKind::Temporary => CertificateType::Temporary,
        }
    }
}

fn to_certificate(model: certificate::Model) -> Certificate {
    Certificate {
        domain: model.domain,
        certificate_pem: model.certificate_pem,
        private_key_pem: model.private_key_pem,
        expires_at: model.expires_at,
        certificate_type: model.certificate_type.into(),
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn backend(err: DbErr) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl CertificateStore for SeaOrmCertificateStore {
    async fn store(&self, cert: &Certificate) -> Result<(), StoreError> {
        let model = certificate::ActiveModel {
            domain: Set(cert.domain.clone()),
            certificate_pem: Set(cert.certificate_pem.clone()),
            private_key_pem: Set(cert.private_key_pem.clone()),
            expires_at: Set(cert.expires_at),
            certificate_type: Set(cert.certificate_type.into()),
            created_at: Set(cert.created_at),
            updated_at: Set(cert.updated_at),
        };

        // Single-statement upsert; created_at of an existing row is left alone
        certificate::Entity::insert(model)
            .on_conflict(
                OnConflict::column(certificate::Column::Domain)
                    .update_columns([
                        certificate::Column::CertificatePem,
                        certificate::Column::PrivateKeyPem,
                        certificate::Column::ExpiresAt,
                        certificate::Column::CertificateType,
                        certificate::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(backend)?;

        debug!(domain = %cert.domain, expires_at = %cert.expires_at, "Stored certificate");
        Ok(())
    }

    async fn retrieve(&self, domain: &str) -> Result<Certificate, StoreError> {
        certificate::Entity::find_by_id(domain.to_string())
            .one(&self.db)
            .await
            .map_err(backend)?
            .map(to_certificate)
            .ok_or_else(|| StoreError::NotFound(domain.to_string()))
    }

    async fn list(&self) -> Result<Vec<Certificate>, StoreError> {
        let models = certificate::Entity::find()
            .order_by_asc(certificate::Column::Domain)
            .all(&self.db)
            .await
            .map_err(backend)?;

        Ok(models.into_iter().map(to_certificate).collect())
    }

    async fn delete(&self, domain: &str) -> Result<(), StoreError> {
        let result = certificate::Entity::delete_by_id(domain.to_string())
            .exec(&self.db)
            .await
            .map_err(backend)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(domain.to_string()));
        }

        debug!(domain = %domain, "Deleted certificate");
        Ok(())
    }
}
