//! Self-signed development authority
//!
//! **Do not use in production.** Issues self-signed `staging` certificates so
//! the full renewal pipeline can run without an ACME directory.

use async_trait::async_trait;
use tracing::info;

use super::{validate_domain, AuthorityError, RenewalAuthority};
use crate::self_signed::{generate_self_signed_certificate, SelfSignedError};
use crate::{Certificate, CertificateType};

/// Default validity of development certificates
pub const DEVELOPMENT_VALIDITY_DAYS: u32 = 90;

#[derive(Debug, Clone)]
pub struct SelfSignedAuthority {
    validity_days: u32,
}

impl SelfSignedAuthority {
    pub fn new() -> Self {
        Self::with_validity_days(DEVELOPMENT_VALIDITY_DAYS)
    }

    pub fn with_validity_days(validity_days: u32) -> Self {
        Self { validity_days }
    }
}

impl Default for SelfSignedAuthority {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenewalAuthority for SelfSignedAuthority {
    fn name(&self) -> &'static str {
        "self-signed"
    }

    async fn renew_certificate(&self, domain: &str) -> Result<Certificate, AuthorityError> {
        validate_domain(domain)?;

        let generated =
            generate_self_signed_certificate(domain, self.validity_days).map_err(|e| match e {
                SelfSignedError::InvalidDomain(msg) => AuthorityError::InvalidDomain(msg),
                other => AuthorityError::Protocol(other.to_string()),
            })?;

        info!(domain = %domain, expires_at = %generated.not_after, "Issued self-signed certificate");

        Ok(Certificate::new(
            domain,
            generated.pem_cert,
            generated.pem_key,
            generated.not_after,
            CertificateType::Staging,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CertificateValidator, X509Validator};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_issues_valid_staging_certificate() {
        let authority = SelfSignedAuthority::new();
        let cert = authority.renew_certificate("api.example.com").await.unwrap();

        assert_eq!(cert.certificate_type, CertificateType::Staging);
        assert!(cert.expires_at > Utc::now() + Duration::days(89));
        assert_eq!(X509Validator::new().validate(&cert), Ok(()));
    }

    #[tokio::test]
    async fn test_rejects_invalid_domain() {
        let authority = SelfSignedAuthority::new();
        assert!(matches!(
            authority.renew_certificate("bad domain").await,
            Err(AuthorityError::InvalidDomain(_))
        ));
    }
}
