//! Scripted collaborators for tests and dry runs

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::self_signed::generate_self_signed_certificate;
use crate::{Alert, AlertSink, AuthorityError, Certificate, CertificateType, RenewalAuthority};

/// What a [`ScriptedAuthority`] does on a call
#[derive(Debug, Clone)]
pub enum AuthorityBehaviour {
    /// Issue a self-signed certificate valid for this many days
    Issue { validity_days: u32 },
    /// Issue a certificate whose subject does not cover the domain
    IssueMismatched,
    /// Issue a valid certificate for a different domain
    IssueFor(String),
    Fail(AuthorityError),
}

/// Authority that follows a script, then a default behaviour
pub struct ScriptedAuthority {
    default: AuthorityBehaviour,
    script: Mutex<VecDeque<AuthorityBehaviour>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedAuthority {
    pub fn new(default: AuthorityBehaviour) -> Self {
        Self {
            default,
            script: Mutex::new(VecDeque::new()),
            delay: None,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn issuing(validity_days: u32) -> Self {
        Self::new(AuthorityBehaviour::Issue { validity_days })
    }

    pub fn failing(error: AuthorityError) -> Self {
        Self::new(AuthorityBehaviour::Fail(error))
    }

    /// Queue a one-off behaviour ahead of the default
    pub fn then(self, behaviour: AuthorityBehaviour) -> Self {
        self.script.lock().push_back(behaviour);
        self
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Domains requested so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Highest number of overlapping calls observed
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenewalAuthority for ScriptedAuthority {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn renew_certificate(&self, domain: &str) -> Result<Certificate, AuthorityError> {
        self.calls.lock().push(domain.to_string());
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let behaviour = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        let result = match behaviour {
            AuthorityBehaviour::Issue { validity_days } => issue(domain, domain, validity_days),
            AuthorityBehaviour::IssueMismatched => issue("mismatch.invalid", domain, 90),
            AuthorityBehaviour::IssueFor(other) => issue(&other, &other, 90),
            AuthorityBehaviour::Fail(error) => Err(error),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn issue(subject: &str, domain: &str, validity_days: u32) -> Result<Certificate, AuthorityError> {
    let generated = generate_self_signed_certificate(subject, validity_days)
        .map_err(|e| AuthorityError::Protocol(e.to_string()))?;

    Ok(Certificate::new(
        domain,
        generated.pem_cert,
        generated.pem_key,
        generated.not_after,
        CertificateType::Production,
    ))
}

/// Collects raised alerts
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn raise(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }
}
