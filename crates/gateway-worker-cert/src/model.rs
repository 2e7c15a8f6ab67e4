//! Certificate model and expiry classification

use chrono::{DateTime, Duration, Utc};
use gateway_worker_gateway::CertificateBundle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Validity window of temporary fallback certificates
pub const TEMPORARY_VALIDITY_DAYS: u32 = 14;

/// Remaining lifetime at or below which a certificate is `expiring`
pub const EXPIRING_THRESHOLD_DAYS: i64 = 7;

/// Remaining lifetime at or below which a certificate is `renewal_due`
pub const RENEWAL_THRESHOLD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateType {
    Production,
    Staging,
    /// Self-signed fallback deployed while renewal is failing
    Temporary,
}

impl CertificateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateType::Production => "production",
            CertificateType::Staging => "staging",
            CertificateType::Temporary => "temporary",
        }
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(CertificateType::Production),
            "staging" => Ok(CertificateType::Staging),
            "temporary" => Ok(CertificateType::Temporary),
            other => Err(format!("Unknown certificate type: {}", other)),
        }
    }
}

/// A certificate for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub domain: String,
    /// PEM chain, leaf first
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub expires_at: DateTime<Utc>,
    pub certificate_type: CertificateType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    pub fn new(
        domain: impl Into<String>,
        certificate_pem: impl Into<String>,
        private_key_pem: impl Into<String>,
        expires_at: DateTime<Utc>,
        certificate_type: CertificateType,
    ) -> Self {
        let now = Utc::now();
        Self {
            domain: domain.into(),
            certificate_pem: certificate_pem.into(),
            private_key_pem: private_key_pem.into(),
            expires_at,
            certificate_type,
            created_at: now,
            updated_at: now,
        }
    }

    /// Wire form pushed to Gateway instances
    pub fn to_bundle(&self) -> CertificateBundle {
        CertificateBundle {
            domain: self.domain.clone(),
            certificate_pem: self.certificate_pem.clone(),
            private_key_pem: self.private_key_pem.clone(),
            expires_at: self.expires_at,
            certificate_type: self.certificate_type.as_str().to_string(),
        }
    }
}

/// A self-signed stand-in deployed when renewal fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryCertificate {
    pub certificate: Certificate,
    /// Why renewal fell back to a temporary certificate
    pub reason: String,
}

impl TemporaryCertificate {
    pub fn domain(&self) -> &str {
        &self.certificate.domain
    }
}

/// Classification of a certificate by remaining lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateState {
    Expired,
    Expiring,
    RenewalDue,
    Valid,
}

impl CertificateState {
    /// Classify a remaining lifetime
    ///
    /// `<= 0` expired, `<= 7d` expiring, `<= 30d` renewal_due, otherwise valid.
    pub fn classify(remaining: Duration) -> Self {
        if remaining <= Duration::zero() {
            CertificateState::Expired
        } else if remaining <= Duration::days(EXPIRING_THRESHOLD_DAYS) {
            CertificateState::Expiring
        } else if remaining <= Duration::days(RENEWAL_THRESHOLD_DAYS) {
            CertificateState::RenewalDue
        } else {
            CertificateState::Valid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateState::Expired => "expired",
            CertificateState::Expiring => "expiring",
            CertificateState::RenewalDue => "renewal_due",
            CertificateState::Valid => "valid",
        }
    }

    /// Job priority for a renewal in this state (lower runs first)
    pub fn renewal_priority(&self) -> Option<i32> {
        match self {
            CertificateState::Expired => Some(10),
            CertificateState::Expiring => Some(50),
            CertificateState::RenewalDue => Some(100),
            CertificateState::Valid => None,
        }
    }
}

impl fmt::Display for CertificateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active temporary deployment for a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemporaryStatus {
    pub reason: String,
    pub expires_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}

/// Read-time projection of a stored certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateStatus {
    pub domain: String,
    pub certificate_type: CertificateType,
    pub expires_at: DateTime<Utc>,
    /// Negative once expired
    pub seconds_until_expiry: i64,
    pub state: CertificateState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary: Option<TemporaryStatus>,
    pub renewal_in_flight: bool,
}
