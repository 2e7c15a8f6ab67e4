//! Self-signed certificate generation
//!
//! Used for temporary fallback certificates and by the development authority.
//! The subject is always the domain being served so Gateway instances can
//! present *something* for it while real issuance is failing.

use chrono::{DateTime, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SerialNumber};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelfSignedError {
    #[error("Certificate generation failed: {0}")]
    GenerationFailed(String),

    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Invalid domain for certificate subject: {0}")]
    InvalidDomain(String),
}

/// A self-signed certificate with its private key
#[derive(Debug, Clone)]
pub struct SelfSignedCertificate {
    /// Certificate in PEM format
    pub pem_cert: String,
    /// Private key in PEM format (PKCS#8)
    pub pem_key: String,
    /// Expiry as encoded in the certificate (second precision)
    pub not_after: DateTime<Utc>,
}

/// Generate a self-signed certificate for `domain` valid for `validity_days`
///
/// # Features
/// - CN and SAN set to the domain (wildcards allowed)
/// - ECDSA P-256 key generated by rcgen
/// - Random serial number to avoid collisions between reissues
pub fn generate_self_signed_certificate(
    domain: &str,
    validity_days: u32,
) -> Result<SelfSignedCertificate, SelfSignedError> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(SelfSignedError::InvalidDomain(
            "Domain cannot be empty".to_string(),
        ));
    }

    let mut params = CertificateParams::new(vec![domain.to_string()])
        .map_err(|e| SelfSignedError::InvalidDomain(format!("{}: {}", domain, e)))?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, domain);
    dn.push(DnType::OrganizationName, "Gateway Worker Temporary Certificate");
    params.distinguished_name = dn;

    // Whole seconds so the stored expiry matches notAfter exactly
    let now = Utc::now().timestamp();
    let expires = now + i64::from(validity_days) * 24 * 60 * 60;

    params.not_before = time::OffsetDateTime::from_unix_timestamp(now)
        .map_err(|e| SelfSignedError::GenerationFailed(e.to_string()))?;
    params.not_after = time::OffsetDateTime::from_unix_timestamp(expires)
        .map_err(|e| SelfSignedError::GenerationFailed(e.to_string()))?;

    params.serial_number = Some(SerialNumber::from(rand::random::<u64>()));

    let key_pair =
        KeyPair::generate().map_err(|e| SelfSignedError::KeyGenerationFailed(e.to_string()))?;

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| SelfSignedError::GenerationFailed(e.to_string()))?;

    let not_after = DateTime::from_timestamp(expires, 0).ok_or_else(|| {
        SelfSignedError::GenerationFailed(format!("Invalid expiry timestamp {}", expires))
    })?;

    Ok(SelfSignedCertificate {
        pem_cert: cert.pem(),
        pem_key: key_pair.serialize_pem(),
        not_after,
    })
}
