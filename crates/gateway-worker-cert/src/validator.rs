//! Certificate validation
//!
//! Pure checks over certificate material: no network access, no clock other
//! than the `now` passed in (or `Utc::now()` for the convenience wrappers).

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use x509_parser::extensions::GeneralName;

use crate::Certificate;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Certificate domain is empty")]
    EmptyDomain,

    #[error("Certificate PEM is empty")]
    EmptyCertificate,

    #[error("Private key PEM is empty")]
    EmptyPrivateKey,

    #[error("Certificate expires ({expires_at}) before it was created ({created_at})")]
    ExpiryBeforeCreation {
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    },

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Certificate does not cover {domain} (names: {})", .names.join(", "))]
    DomainMismatch { domain: String, names: Vec<String> },

    #[error("Recorded expiry {recorded} is later than the certificate's notAfter {not_after}")]
    ExpiryMismatch {
        recorded: DateTime<Utc>,
        not_after: DateTime<Utc>,
    },
}

/// Checks certificate material and computes remaining lifetime
pub trait CertificateValidator: Send + Sync {
    /// Structural and cryptographic-format checks
    fn validate(&self, cert: &Certificate) -> Result<(), ValidationError>;

    /// `expires_at - now`; negative once expired
    fn check_expiration_at(&self, cert: &Certificate, now: DateTime<Utc>) -> Duration {
        cert.expires_at - now
    }

    fn check_expiration(&self, cert: &Certificate) -> Duration {
        self.check_expiration_at(cert, Utc::now())
    }
}

/// Leaf certificate details extracted from a PEM chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafInfo {
    pub not_after: DateTime<Utc>,
    /// DNS SANs, or the subject CN when the certificate has none
    pub names: Vec<String>,
}

/// Parse the first certificate of a PEM chain
pub fn parse_leaf(certificate_pem: &str) -> Result<LeafInfo, ValidationError> {
    let chain = rustls_pemfile::certs(&mut certificate_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ValidationError::InvalidCertificate(format!("Failed to read PEM: {}", e)))?;

    let leaf = chain.first().ok_or_else(|| {
        ValidationError::InvalidCertificate("No certificate found in PEM".to_string())
    })?;

    let (_, x509) = x509_parser::parse_x509_certificate(leaf.as_ref())
        .map_err(|e| ValidationError::InvalidCertificate(format!("Failed to parse X.509: {}", e)))?;

    let not_after_ts = x509.validity().not_after.timestamp();
    let not_after = DateTime::from_timestamp(not_after_ts, 0).ok_or_else(|| {
        ValidationError::InvalidCertificate(format!("Invalid notAfter timestamp {}", not_after_ts))
    })?;

    let mut names: Vec<String> = match x509.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        Ok(None) => Vec::new(),
        Err(e) => {
            return Err(ValidationError::InvalidCertificate(format!(
                "Malformed subjectAltName: {}",
                e
            )))
        }
    };

    if names.is_empty() {
        if let Some(cn) = x509
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
        {
            names.push(cn.to_string());
        }
    }

    Ok(LeafInfo { not_after, names })
}

/// Whether certificate name `name` covers `domain`
///
/// Wildcards match exactly one leftmost label.
pub fn name_matches(name: &str, domain: &str) -> bool {
    if name.eq_ignore_ascii_case(domain) {
        return true;
    }

    match (name.strip_prefix("*."), domain.split_once('.')) {
        (Some(suffix), Some((label, rest))) => {
            !label.is_empty() && label != "*" && rest.eq_ignore_ascii_case(suffix)
        }
        _ => false,
    }
}

/// Validator backed by rustls-pemfile and x509-parser
#[derive(Debug, Clone, Copy, Default)]
pub struct X509Validator;

impl X509Validator {
    pub fn new() -> Self {
        Self
    }
}

impl CertificateValidator for X509Validator {
    fn validate(&self, cert: &Certificate) -> Result<(), ValidationError> {
        let domain = cert.domain.trim();
        if domain.is_empty() {
            return Err(ValidationError::EmptyDomain);
        }
        if cert.certificate_pem.trim().is_empty() {
            return Err(ValidationError::EmptyCertificate);
        }
        if cert.private_key_pem.trim().is_empty() {
            return Err(ValidationError::EmptyPrivateKey);
        }
        if cert.expires_at <= cert.created_at {
            return Err(ValidationError::ExpiryBeforeCreation {
                expires_at: cert.expires_at,
                created_at: cert.created_at,
            });
        }

        let leaf = parse_leaf(&cert.certificate_pem)?;

        match rustls_pemfile::private_key(&mut cert.private_key_pem.as_bytes()) {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(ValidationError::InvalidPrivateKey(
                    "No private key found in PEM".to_string(),
                ))
            }
            Err(e) => return Err(ValidationError::InvalidPrivateKey(e.to_string())),
        }

        if !leaf.names.iter().any(|name| name_matches(name, domain)) {
            return Err(ValidationError::DomainMismatch {
                domain: domain.to_string(),
                names: leaf.names,
            });
        }

        if cert.expires_at.timestamp() > leaf.not_after.timestamp() {
            return Err(ValidationError::ExpiryMismatch {
                recorded: cert.expires_at,
                not_after: leaf.not_after,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::self_signed::generate_self_signed_certificate;
    use crate::CertificateType;

    fn certificate_for(subject: &str, domain: &str) -> Certificate {
        let generated = generate_self_signed_certificate(subject, 30).unwrap();
        Certificate::new(
            domain,
            generated.pem_cert,
            generated.pem_key,
            generated.not_after,
            CertificateType::Production,
        )
    }

    #[test]
    fn test_valid_certificate_passes() {
        let cert = certificate_for("api.example.com", "api.example.com");
        assert_eq!(X509Validator::new().validate(&cert), Ok(()));
    }

    #[test]
    fn test_wildcard_covers_single_label() {
        let cert = certificate_for("*.example.com", "api.example.com");
        assert_eq!(X509Validator::new().validate(&cert), Ok(()));

        let too_deep = certificate_for("*.example.com", "v1.api.example.com");
        assert!(matches!(
            X509Validator::new().validate(&too_deep),
            Err(ValidationError::DomainMismatch { .. })
        ));
    }

    #[test]
    fn test_domain_mismatch() {
        let cert = certificate_for("other.example.org", "api.example.com");
        match X509Validator::new().validate(&cert) {
            Err(ValidationError::DomainMismatch { domain, names }) => {
                assert_eq!(domain, "api.example.com");
                assert_eq!(names, vec!["other.example.org".to_string()]);
            }
            other => panic!("expected domain mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_structural_checks() {
        let validator = X509Validator::new();
        let base = certificate_for("api.example.com", "api.example.com");

        let mut cert = base.clone();
        cert.domain = String::new();
        assert_eq!(validator.validate(&cert), Err(ValidationError::EmptyDomain));

        let mut cert = base.clone();
        cert.private_key_pem = String::new();
        assert_eq!(
            validator.validate(&cert),
            Err(ValidationError::EmptyPrivateKey)
        );

        let mut cert = base.clone();
        cert.certificate_pem = "  ".to_string();
        assert_eq!(
            validator.validate(&cert),
            Err(ValidationError::EmptyCertificate)
        );

        let mut cert = base;
        cert.expires_at = cert.created_at - Duration::seconds(1);
        assert!(matches!(
            validator.validate(&cert),
            Err(ValidationError::ExpiryBeforeCreation { .. })
        ));
    }

    #[test]
    fn test_garbage_material_rejected() {
        let validator = X509Validator::new();
        let base = certificate_for("api.example.com", "api.example.com");

        let mut cert = base.clone();
        cert.certificate_pem = "not a certificate".to_string();
        assert!(matches!(
            validator.validate(&cert),
            Err(ValidationError::InvalidCertificate(_))
        ));

        let mut cert = base;
        cert.private_key_pem = "not a key".to_string();
        assert!(matches!(
            validator.validate(&cert),
            Err(ValidationError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn test_recorded_expiry_must_not_exceed_not_after() {
        let mut cert = certificate_for("api.example.com", "api.example.com");
        cert.expires_at += Duration::days(365);
        assert!(matches!(
            X509Validator::new().validate(&cert),
            Err(ValidationError::ExpiryMismatch { .. })
        ));
    }

    #[test]
    fn test_check_expiration_matches_clock_difference() {
        let validator = X509Validator::new();
        let cert = certificate_for("api.example.com", "api.example.com");
        let now = Utc::now();

        let remaining = validator.check_expiration_at(&cert, now);
        assert_eq!(remaining, cert.expires_at - now);

        let later = validator.check_expiration_at(&cert, now + Duration::hours(1));
        assert_eq!(remaining - later, Duration::hours(1));

        let expired = validator.check_expiration_at(&cert, cert.expires_at + Duration::seconds(1));
        assert!(expired < Duration::zero());
    }

    #[test]
    fn test_name_matching() {
        assert!(name_matches("api.example.com", "API.example.com"));
        assert!(name_matches("*.example.com", "api.example.com"));
        assert!(!name_matches("*.example.com", "example.com"));
        assert!(!name_matches("*.example.com", "a.b.example.com"));
        assert!(name_matches("*.example.com", "*.example.com"));
        assert!(!name_matches("api.example.com", "www.example.com"));
    }
}
