//! Operator alerts
//!
//! Alerts are distinct from ordinary job failures: they mark conditions an
//! operator must act on, such as a domain left without any deployable
//! certificate.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{error, warn};

/// Log target for alerts
pub const ALERT_TARGET: &str = "gateway_worker::alert";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Degraded but serving (e.g., a temporary certificate is deployed)
    Warning,
    /// A domain has no valid certificate deployed anywhere
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Warning => f.write_str("warning"),
            AlertSeverity::Critical => f.write_str("critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub domain: String,
    pub summary: String,
    pub detail: String,
}

impl Alert {
    pub fn warning(
        domain: impl Into<String>,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            severity: AlertSeverity::Warning,
            domain: domain.into(),
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    pub fn critical(
        domain: impl Into<String>,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            severity: AlertSeverity::Critical,
            domain: domain.into(),
            summary: summary.into(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: Alert);
}

/// Emits alerts as log events on [`ALERT_TARGET`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn raise(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Critical => error!(
                target: ALERT_TARGET,
                severity = %alert.severity,
                domain = %alert.domain,
                detail = %alert.detail,
                "{}",
                alert.summary
            ),
            AlertSeverity::Warning => warn!(
                target: ALERT_TARGET,
                severity = %alert.severity,
                domain = %alert.domain,
                detail = %alert.detail,
                "{}",
                alert.summary
            ),
        }
    }
}
