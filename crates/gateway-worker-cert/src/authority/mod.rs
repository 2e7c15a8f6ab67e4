//! Renewal authorities
//!
//! An authority turns a domain name into fresh certificate material. Calls are
//! slow and fallible, so they only ever run inside queue workers.

pub mod acme;
pub mod development;

use async_trait::async_trait;
use thiserror::Error;

use crate::Certificate;

pub use acme::{AcmeAuthority, AcmeConfig, Http01ChallengeStore};
pub use development::SelfSignedAuthority;

/// Structured renewal failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("Rate limited by certificate authority: {0}")]
    RateLimited(String),

    #[error("Domain validation failed: {0}")]
    ValidationFailed(String),

    #[error("Certificate authority unreachable: {0}")]
    Unreachable(String),

    #[error("Timed out waiting for certificate authority")]
    Timeout,

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Certificate authority protocol error: {0}")]
    Protocol(String),

    #[error("Authority not configured: {0}")]
    NotConfigured(String),
}

impl AuthorityError {
    /// Failures worth retrying with the same request
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthorityError::RateLimited(_) | AuthorityError::Unreachable(_) | AuthorityError::Timeout
        )
    }
}

/// Issues or renews certificates for a domain
#[async_trait]
pub trait RenewalAuthority: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn renew_certificate(&self, domain: &str) -> Result<Certificate, AuthorityError>;
}

/// Reject names no authority would issue for
pub fn validate_domain(domain: &str) -> Result<(), AuthorityError> {
    if domain.is_empty() {
        return Err(AuthorityError::InvalidDomain(
            "Domain cannot be empty".to_string(),
        ));
    }

    if domain.contains(char::is_whitespace) {
        return Err(AuthorityError::InvalidDomain(
            "Domain cannot contain spaces".to_string(),
        ));
    }

    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(AuthorityError::InvalidDomain(
            "Domain cannot start or end with a dot".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_domain() {
        assert!(validate_domain("example.com").is_ok());
        assert!(validate_domain("sub.example.com").is_ok());
        assert!(validate_domain("").is_err());
        assert!(validate_domain("invalid domain.com").is_err());
        assert!(validate_domain(".example.com").is_err());
        assert!(validate_domain("example.com.").is_err());
    }

    #[test]
    fn test_transient_errors() {
        assert!(AuthorityError::RateLimited("too many orders".into()).is_transient());
        assert!(AuthorityError::Unreachable("connection refused".into()).is_transient());
        assert!(AuthorityError::Timeout.is_transient());
        assert!(!AuthorityError::ValidationFailed("bad token".into()).is_transient());
        assert!(!AuthorityError::InvalidDomain("".into()).is_transient());
        assert!(!AuthorityError::Protocol("malformed".into()).is_transient());
    }
}
