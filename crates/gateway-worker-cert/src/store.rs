//! Certificate storage
//!
//! One certificate per domain. Writes are atomic per domain: a concurrent
//! reader sees either the previous certificate or the new one.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::Certificate;

/// Certificate storage errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Certificate not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Persistence boundary for certificates
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Insert or replace the certificate for `cert.domain`
    ///
    /// The original `created_at` of an existing record is kept.
    async fn store(&self, cert: &Certificate) -> Result<(), StoreError>;

    async fn retrieve(&self, domain: &str) -> Result<Certificate, StoreError>;

    /// Every committed certificate
    async fn list(&self) -> Result<Vec<Certificate>, StoreError>;

    /// Remove the certificate for `domain` (explicit operator action only)
    async fn delete(&self, domain: &str) -> Result<(), StoreError>;
}

/// In-memory certificate store
#[derive(Debug, Default)]
pub struct InMemoryCertificateStore {
    certificates: RwLock<HashMap<String, Certificate>>,
}

impl InMemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CertificateStore for InMemoryCertificateStore {
    async fn store(&self, cert: &Certificate) -> Result<(), StoreError> {
        let mut certificates = self.certificates.write();

        let mut record = cert.clone();
        if let Some(existing) = certificates.get(&cert.domain) {
            record.created_at = existing.created_at;
        }

        debug!(domain = %cert.domain, expires_at = %cert.expires_at, "Stored certificate");
        certificates.insert(cert.domain.clone(), record);
        Ok(())
    }

    async fn retrieve(&self, domain: &str) -> Result<Certificate, StoreError> {
        self.certificates
            .read()
            .get(domain)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(domain.to_string()))
    }

    async fn list(&self) -> Result<Vec<Certificate>, StoreError> {
        let mut certificates: Vec<_> = self.certificates.read().values().cloned().collect();
        certificates.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(certificates)
    }

    async fn delete(&self, domain: &str) -> Result<(), StoreError> {
        match self.certificates.write().remove(domain) {
            Some(_) => {
                debug!(domain = %domain, "Deleted certificate");
                Ok(())
            }
            None => Err(StoreError::NotFound(domain.to_string())),
        }
    }
}
