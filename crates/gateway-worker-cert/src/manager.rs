//! Certificate lifecycle manager
//!
//! A timer-driven sweep classifies every stored certificate and dispatches
//! renewal jobs; it never talks to the authority or the gateways itself. The
//! renewal work runs inside queue workers through [`CertificateManager::renew`]:
//!
//! ```text
//! authority ─ok─▶ validate ─ok─▶ store ─ok─▶ deploy ─▶ done
//!     │              │             │
//!     └──────────────┴─────────────┴──▶ temporary certificate ─▶ deploy_temporary
//!                                                                   │
//!                                                      fails ─▶ critical alert
//! ```
//!
//! At most one renewal per domain is in flight at any time; the in-flight map
//! records which job owns the domain.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gateway_worker_gateway::DistributionError;
use gateway_worker_queue::{Job, JobError, JobQueue, JobType, QueueError};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::self_signed::{generate_self_signed_certificate, SelfSignedError};
use crate::{
    Alert, AlertSink, Certificate, CertificateDistributor, CertificateState, CertificateStatus,
    CertificateStore, CertificateType, CertificateValidator, RenewalAuthority, StoreError,
    TemporaryCertificate, TemporaryStatus, TracingAlertSink, TEMPORARY_VALIDITY_DAYS,
};

/// Payload key carrying the domain of certificate jobs
pub const DOMAIN_KEY: &str = "domain";

/// Shortest sweep interval the monitor runs with
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Time between sweeps
    pub sweep_interval: Duration,
    /// Retry budget of dispatched renewal jobs
    pub renewal_max_retries: u32,
    /// Validity of temporary fallback certificates
    pub temporary_validity_days: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(24 * 60 * 60),
            renewal_max_retries: 3,
            temporary_validity_days: TEMPORARY_VALIDITY_DAYS,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Renewal already in flight for {domain} (job {job_id})")]
    RenewalInFlight { domain: String, job_id: Uuid },
}

impl LifecycleError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LifecycleError::Store(e) if e.is_not_found())
    }
}

/// A renewal job submitted by a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchedRenewal {
    pub domain: String,
    pub state: CertificateState,
    pub priority: i32,
    pub job_id: Uuid,
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub dispatched: Vec<DispatchedRenewal>,
    /// Domains skipped because a renewal was already running
    pub already_in_flight: Vec<String>,
    /// Domains whose job the queue refused
    pub rejected: Vec<String>,
}

pub struct CertificateManager {
    store: Arc<dyn CertificateStore>,
    validator: Arc<dyn CertificateValidator>,
    authority: Arc<dyn RenewalAuthority>,
    distributor: Arc<dyn CertificateDistributor>,
    alerts: Arc<dyn AlertSink>,
    queue: JobQueue,
    config: LifecycleConfig,
    /// domain -> owning renewal job
    in_flight: Mutex<HashMap<String, Uuid>>,
    temporary: DashMap<String, (TemporaryCertificate, DateTime<Utc>)>,
}

impl CertificateManager {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        validator: Arc<dyn CertificateValidator>,
        authority: Arc<dyn RenewalAuthority>,
        distributor: Arc<dyn CertificateDistributor>,
        queue: JobQueue,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            validator,
            authority,
            distributor,
            alerts: Arc::new(TracingAlertSink),
            queue,
            config,
            in_flight: Mutex::new(HashMap::new()),
            temporary: DashMap::new(),
        }
    }

    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Sweep on a fixed interval until `cancel` fires; the first sweep runs immediately
    pub async fn run_monitor(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            "Certificate monitor started"
        );

        let period = if self.config.sweep_interval.is_zero() {
            warn!(
                min_secs = MIN_SWEEP_INTERVAL.as_secs(),
                "Sweep interval of zero raised to the minimum"
            );
            MIN_SWEEP_INTERVAL
        } else {
            self.config.sweep_interval
        };

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Certificate sweep failed");
                    }
                }
            }
        }

        info!("Certificate monitor stopped");
    }

    pub async fn sweep(&self) -> Result<SweepReport, LifecycleError> {
        self.sweep_at(Utc::now()).await
    }

    /// Classify every stored certificate as of `now` and dispatch renewals
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, LifecycleError> {
        let certificates = self.store.list().await?;
        info!(certificates = certificates.len(), "Certificate sweep started");

        let mut report = SweepReport {
            examined: certificates.len(),
            ..Default::default()
        };

        for cert in certificates {
            let state = CertificateState::classify(self.validator.check_expiration_at(&cert, now));
            let Some(priority) = state.renewal_priority() else {
                continue;
            };

            match self.dispatch_renewal(&cert.domain, state, priority) {
                Ok(job_id) => report.dispatched.push(DispatchedRenewal {
                    domain: cert.domain,
                    state,
                    priority,
                    job_id,
                }),
                Err(LifecycleError::RenewalInFlight { .. }) => {
                    report.already_in_flight.push(cert.domain)
                }
                Err(e) => {
                    warn!(domain = %cert.domain, error = %e, "Renewal job not dispatched");
                    report.rejected.push(cert.domain);
                }
            }
        }

        info!(
            examined = report.examined,
            dispatched = report.dispatched.len(),
            in_flight = report.already_in_flight.len(),
            rejected = report.rejected.len(),
            "Certificate sweep finished"
        );

        Ok(report)
    }

    fn dispatch_renewal(
        &self,
        domain: &str,
        state: CertificateState,
        priority: i32,
    ) -> Result<Uuid, LifecycleError> {
        let mut in_flight = self.in_flight.lock();

        if let Some(job_id) = in_flight.get(domain) {
            debug!(domain = %domain, job_id = %job_id, "Renewal already in flight");
            return Err(LifecycleError::RenewalInFlight {
                domain: domain.to_string(),
                job_id: *job_id,
            });
        }

        let job = Job::new(JobType::CertificateRenewal, Map::new())
            .with_priority(priority)
            .with_max_retries(self.config.renewal_max_retries)
            .with_payload_entry(DOMAIN_KEY, domain)
            .with_payload_entry("state", state.as_str());
        let job_id = job.id;

        self.queue.submit(job)?;
        in_flight.insert(domain.to_string(), job_id);

        info!(
            domain = %domain,
            state = %state,
            priority,
            job_id = %job_id,
            "Renewal job dispatched"
        );

        Ok(job_id)
    }

    /// Run one attempt of a renewal job
    pub async fn renew(&self, job: &Job) -> Result<(), JobError> {
        let domain = job_domain(job)?;

        {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(domain).copied() {
                Some(owner) if owner != job.id => {
                    info!(
                        domain = %domain,
                        owner = %owner,
                        "Renewal already in flight for domain, skipping"
                    );
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    in_flight.insert(domain.to_string(), job.id);
                }
            }
        }

        let result = self.run_renewal(domain, job).await;

        if !matches!(result, Err(JobError::Retryable(_))) {
            self.release(domain, job.id);
        }

        result
    }

    /// Release a domain held by a job that ended terminally
    pub fn release_job(&self, job: &Job) {
        if let Some(domain) = job.payload_str(DOMAIN_KEY) {
            self.release(domain, job.id);
        }
    }

    fn release(&self, domain: &str, job_id: Uuid) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(domain) == Some(&job_id) {
            in_flight.remove(domain);
            debug!(domain = %domain, job_id = %job_id, "Released in-flight domain");
        }
    }

    async fn run_renewal(&self, domain: &str, job: &Job) -> Result<(), JobError> {
        if job.retry_count > 0 {
            if let Some(stored) = self.renewed_by_earlier_attempt(domain, job).await {
                info!(domain = %domain, "Certificate already renewed by an earlier attempt, redeploying");
                return self.deploy_renewed(&stored, job).await;
            }
        }

        let renewed = match self.authority.renew_certificate(domain).await {
            Ok(cert) => cert,
            Err(err) if err.is_transient() && job.can_retry() => {
                warn!(
                    domain = %domain,
                    authority = self.authority.name(),
                    attempt = job.attempt(),
                    max_retries = job.max_retries,
                    error = %err,
                    "Renewal attempt failed"
                );
                return Err(JobError::retryable(err.to_string()));
            }
            Err(err) => {
                return self
                    .fall_back(domain, format!("renewal authority error: {}", err))
                    .await
            }
        };

        if !renewed.domain.eq_ignore_ascii_case(domain) {
            return self
                .fall_back(
                    domain,
                    format!("authority returned certificate for {}", renewed.domain),
                )
                .await;
        }
        if renewed.certificate_type == CertificateType::Temporary {
            return self
                .fall_back(domain, "authority returned a temporary certificate".to_string())
                .await;
        }

        if let Err(err) = self.validator.validate(&renewed) {
            return self
                .fall_back(domain, format!("renewed certificate failed validation: {}", err))
                .await;
        }

        if let Err(err) = self.store.store(&renewed).await {
            return self
                .fall_back(domain, format!("failed to store renewed certificate: {}", err))
                .await;
        }

        info!(
            domain = %domain,
            authority = self.authority.name(),
            expires_at = %renewed.expires_at,
            "Certificate renewed"
        );

        self.deploy_renewed(&renewed, job).await
    }

    async fn renewed_by_earlier_attempt(&self, domain: &str, job: &Job) -> Option<Certificate> {
        let stored = self.store.retrieve(domain).await.ok()?;
        let state = CertificateState::classify(self.validator.check_expiration(&stored));
        (stored.updated_at > job.created_at && state == CertificateState::Valid).then_some(stored)
    }

    async fn deploy_renewed(&self, cert: &Certificate, job: &Job) -> Result<(), JobError> {
        let instances = self.distributor.instances();

        match self.distributor.deploy(cert, &instances).await {
            Ok(report) => {
                self.clear_temporary(&cert.domain);
                info!(
                    domain = %cert.domain,
                    instances = report.succeeded.len(),
                    "Certificate deployed"
                );
                Ok(())
            }
            Err(err @ DistributionError::Partial { .. }) => {
                self.clear_temporary(&cert.domain);
                warn!(domain = %cert.domain, error = %err, "Certificate deployed to a subset of instances");
                Ok(())
            }
            Err(err) => {
                error!(
                    domain = %cert.domain,
                    attempt = job.attempt(),
                    max_retries = job.max_retries,
                    error = %err,
                    "Certificate deployment reached no instance"
                );
                Err(JobError::retryable(err.to_string()))
            }
        }
    }

    fn clear_temporary(&self, domain: &str) {
        if self.temporary.remove(domain).is_some() {
            info!(domain = %domain, "Temporary certificate superseded");
        }
    }

    async fn fall_back(&self, domain: &str, reason: String) -> Result<(), JobError> {
        warn!(domain = %domain, reason = %reason, "Renewal failed, issuing temporary certificate");

        let temp = match self.issue_temporary(domain, &reason) {
            Ok(temp) => temp,
            Err(e) => {
                let detail = format!("{}; temporary certificate generation failed: {}", reason, e);
                self.alerts
                    .raise(Alert::critical(
                        domain,
                        "Domain has no deployable certificate",
                        detail.clone(),
                    ))
                    .await;
                return Err(JobError::fatal(detail));
            }
        };

        match self.distributor.deploy_temporary(&temp).await {
            Ok(_) | Err(DistributionError::Partial { .. }) => {
                let expires_at = temp.certificate.expires_at;
                self.temporary
                    .insert(domain.to_string(), (temp, Utc::now()));
                self.alerts
                    .raise(Alert::warning(
                        domain,
                        "Serving temporary certificate",
                        format!("{} (temporary certificate expires {})", reason, expires_at),
                    ))
                    .await;
                Ok(())
            }
            Err(err) => {
                let detail = format!("{}; temporary certificate deployment failed: {}", reason, err);
                self.alerts
                    .raise(Alert::critical(
                        domain,
                        "Domain has no deployable certificate",
                        detail.clone(),
                    ))
                    .await;
                Err(JobError::fatal(detail))
            }
        }
    }

    fn issue_temporary(
        &self,
        domain: &str,
        reason: &str,
    ) -> Result<TemporaryCertificate, SelfSignedError> {
        let generated = generate_self_signed_certificate(domain, self.config.temporary_validity_days)?;

        Ok(TemporaryCertificate {
            certificate: Certificate::new(
                domain,
                generated.pem_cert,
                generated.pem_key,
                generated.not_after,
                CertificateType::Temporary,
            ),
            reason: reason.to_string(),
        })
    }

    /// Status of the stored certificate for `domain`, computed now
    pub async fn get_certificate_status(
        &self,
        domain: &str,
    ) -> Result<CertificateStatus, LifecycleError> {
        let cert = self.store.retrieve(domain).await?;
        let remaining = self.validator.check_expiration(&cert);

        let temporary = self.temporary.get(domain).map(|entry| {
            let (temp, issued_at) = entry.value();
            TemporaryStatus {
                reason: temp.reason.clone(),
                expires_at: temp.certificate.expires_at,
                issued_at: *issued_at,
            }
        });

        Ok(CertificateStatus {
            domain: cert.domain,
            certificate_type: cert.certificate_type,
            expires_at: cert.expires_at,
            seconds_until_expiry: remaining.num_seconds(),
            state: CertificateState::classify(remaining),
            temporary,
            renewal_in_flight: self.in_flight.lock().contains_key(domain),
        })
    }

    /// Temporary certificate currently deployed for `domain`
    pub fn temporary_certificate(&self, domain: &str) -> Option<TemporaryCertificate> {
        self.temporary.get(domain).map(|entry| entry.value().0.clone())
    }

    pub fn in_flight_domains(&self) -> Vec<String> {
        let mut domains: Vec<_> = self.in_flight.lock().keys().cloned().collect();
        domains.sort();
        domains
    }

    /// Forget every in-flight renewal after workers were aborted
    pub fn abandon_in_flight(&self) -> Vec<String> {
        let abandoned: Vec<(String, Uuid)> = self.in_flight.lock().drain().collect();

        for (domain, job_id) in &abandoned {
            warn!(domain = %domain, job_id = %job_id, "Renewal abandoned");
        }

        abandoned.into_iter().map(|(domain, _)| domain).collect()
    }
}

fn job_domain(job: &Job) -> Result<&str, JobError> {
    job.payload_str(DOMAIN_KEY)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| JobError::fatal(format!("{} job is missing {}", job.job_type, DOMAIN_KEY)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_domain_required() {
        let job = Job::new(JobType::CertificateRenewal, Map::new());
        assert!(!job_domain(&job).unwrap_err().is_retryable());

        let blank = job.clone().with_payload_entry(DOMAIN_KEY, "  ");
        assert!(job_domain(&blank).is_err());

        let ok = job.with_payload_entry(DOMAIN_KEY, "api.example.com");
        assert_eq!(job_domain(&ok).unwrap(), "api.example.com");
    }

    #[test]
    fn test_lifecycle_defaults() {
        let config = LifecycleConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(86_400));
        assert_eq!(config.renewal_max_retries, 3);
        assert_eq!(config.temporary_validity_days, 14);
    }
}
