//! Job handlers for certificate work

use async_trait::async_trait;
use gateway_worker_queue::{Job, JobError, JobHandler};
use std::sync::Arc;
use tracing::{info, warn};

use crate::manager::DOMAIN_KEY;
use crate::{CertificateManager, CertificateState, CertificateStore, CertificateValidator};

/// `certificate_renewal`
pub struct CertificateRenewalHandler {
    manager: Arc<CertificateManager>,
}

impl CertificateRenewalHandler {
    pub fn new(manager: Arc<CertificateManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl JobHandler for CertificateRenewalHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        self.manager.renew(job).await
    }

    async fn on_terminal_failure(&self, job: &Job, error: &JobError) {
        warn!(
            domain = job.payload_str(DOMAIN_KEY).unwrap_or("<none>"),
            error = %error,
            "Renewal job failed terminally; domain will be picked up by the next sweep"
        );
        self.manager.release_job(job);
    }
}

/// `certificate_validation`: validate a stored certificate on demand
pub struct CertificateValidationHandler {
    store: Arc<dyn CertificateStore>,
    validator: Arc<dyn CertificateValidator>,
}

impl CertificateValidationHandler {
    pub fn new(store: Arc<dyn CertificateStore>, validator: Arc<dyn CertificateValidator>) -> Self {
        Self { store, validator }
    }
}

#[async_trait]
impl JobHandler for CertificateValidationHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let domain = job
            .payload_str(DOMAIN_KEY)
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| JobError::fatal("certificate_validation job is missing domain"))?;

        let cert = match self.store.retrieve(domain).await {
            Ok(cert) => cert,
            Err(e) if e.is_not_found() => return Err(JobError::fatal(e.to_string())),
            Err(e) => return Err(JobError::retryable(e.to_string())),
        };

        self.validator
            .validate(&cert)
            .map_err(|e| JobError::fatal(format!("{}: {}", domain, e)))?;

        let remaining = self.validator.check_expiration(&cert);
        info!(
            domain = %domain,
            certificate_type = %cert.certificate_type,
            state = %CertificateState::classify(remaining),
            seconds_until_expiry = remaining.num_seconds(),
            "Certificate validated"
        );

        Ok(())
    }
}
