//! ACME renewal authority (Let's Encrypt compatible)
//!
//! Orders are validated with HTTP-01: key authorizations are published to a
//! shared [`Http01ChallengeStore`] which the worker's HTTP surface serves under
//! `/.well-known/acme-challenge/{token}`. Gateway instances are expected to
//! forward that path to the worker.

use async_trait::async_trait;
use dashmap::DashMap;
use instant_acme::{
    Account, AuthorizationStatus, ChallengeType, Identifier, LetsEncrypt, NewAccount, NewOrder,
    Order, OrderStatus, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{validate_domain, AuthorityError, RenewalAuthority};
use crate::validator::parse_leaf;
use crate::{Certificate, CertificateType};

/// Pending HTTP-01 challenges, token -> key authorization
#[derive(Debug, Clone, Default)]
pub struct Http01ChallengeStore {
    challenges: Arc<DashMap<String, String>>,
}

impl Http01ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, token: &str, key_authorization: &str) {
        debug!(token = %token, "Publishing HTTP-01 challenge");
        self.challenges
            .insert(token.to_string(), key_authorization.to_string());
    }

    pub fn remove(&self, token: &str) {
        self.challenges.remove(token);
    }

    /// Key authorization for a token, if a challenge is pending
    pub fn get(&self, token: &str) -> Option<String> {
        self.challenges.get(token).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

/// ACME configuration
#[derive(Debug, Clone)]
pub struct AcmeConfig {
    /// Contact email for the ACME account
    pub contact_email: String,
    /// Use the Let's Encrypt staging directory
    pub use_staging: bool,
    /// Custom directory URL; overrides `use_staging`
    pub directory_url: Option<String>,
    /// Upper bound on polling the order until ready and for the certificate
    pub order_timeout: Duration,
    /// First delay between order polls
    pub poll_initial_delay: Duration,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            contact_email: String::new(),
            use_staging: false,
            directory_url: None,
            order_timeout: Duration::from_secs(120),
            poll_initial_delay: Duration::from_secs(2),
        }
    }
}

impl AcmeConfig {
    pub fn directory(&self) -> String {
        match &self.directory_url {
            Some(url) => url.clone(),
            None if self.use_staging => LetsEncrypt::Staging.url().to_string(),
            None => LetsEncrypt::Production.url().to_string(),
        }
    }

    fn certificate_type(&self) -> CertificateType {
        if self.use_staging {
            CertificateType::Staging
        } else {
            CertificateType::Production
        }
    }
}

/// Renewal authority backed by an ACME directory
pub struct AcmeAuthority {
    config: AcmeConfig,
    challenges: Http01ChallengeStore,
    account: Mutex<Option<Account>>,
}

impl AcmeAuthority {
    pub fn new(config: AcmeConfig, challenges: Http01ChallengeStore) -> Result<Self, AuthorityError> {
        if config.contact_email.trim().is_empty() {
            return Err(AuthorityError::NotConfigured(
                "ACME contact email is required".to_string(),
            ));
        }

        Ok(Self {
            config,
            challenges,
            account: Mutex::new(None),
        })
    }

    /// Account created on first use and reused afterwards
    async fn account(&self) -> Result<Account, AuthorityError> {
        let mut cached = self.account.lock().await;
        if let Some(account) = cached.as_ref() {
            return Ok(account.clone());
        }

        let directory = self.config.directory();
        let contact = format!("mailto:{}", self.config.contact_email.trim());

        let (account, _credentials) = Account::builder()
            .map_err(map_acme_error)?
            .create(
                &NewAccount {
                    contact: &[contact.as_str()],
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                directory.clone(),
                None,
            )
            .await
            .map_err(map_acme_error)?;

        info!(directory = %directory, "Created ACME account");
        *cached = Some(account.clone());
        Ok(account)
    }

    async fn order_certificate(&self, domain: &str) -> Result<(String, String), AuthorityError> {
        let account = self.account().await?;

        let identifiers = [Identifier::Dns(domain.to_string())];
        let mut order = account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(map_acme_error)?;

        debug!(domain = %domain, "Created ACME order");

        let mut published = Vec::new();
        let result = self.complete_order(domain, &mut order, &mut published).await;

        for token in &published {
            self.challenges.remove(token);
        }

        result
    }

    async fn complete_order(
        &self,
        domain: &str,
        order: &mut Order,
        published: &mut Vec<String>,
    ) -> Result<(String, String), AuthorityError> {
        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(map_acme_error)?;

            match authz.status {
                AuthorizationStatus::Pending => {}
                AuthorizationStatus::Valid => continue,
                status => {
                    return Err(AuthorityError::ValidationFailed(format!(
                        "Authorization for {} is {:?}",
                        domain, status
                    )))
                }
            }

            let mut challenge = authz.challenge(ChallengeType::Http01).ok_or_else(|| {
                AuthorityError::ValidationFailed(format!(
                    "No HTTP-01 challenge offered for {}",
                    domain
                ))
            })?;

            let key_authorization = challenge.key_authorization();
            self.challenges
                .publish(&challenge.token, key_authorization.as_str());
            published.push(challenge.token.clone());

            challenge.set_ready().await.map_err(map_acme_error)?;
        }

        let policy = RetryPolicy::new()
            .timeout(self.config.order_timeout)
            .initial_delay(self.config.poll_initial_delay);

        let status = order.poll_ready(&policy).await.map_err(map_acme_error)?;
        match status {
            OrderStatus::Ready | OrderStatus::Valid => {}
            other => {
                return Err(AuthorityError::ValidationFailed(format!(
                    "Order for {} ended in state {:?}",
                    domain, other
                )))
            }
        }

        // CSR and key are generated by instant-acme
        let private_key_pem = order.finalize().await.map_err(map_acme_error)?;
        let chain_pem = order
            .poll_certificate(&policy)
            .await
            .map_err(map_acme_error)?;

        Ok((chain_pem, private_key_pem))
    }
}

#[async_trait]
impl RenewalAuthority for AcmeAuthority {
    fn name(&self) -> &'static str {
        "acme"
    }

    async fn renew_certificate(&self, domain: &str) -> Result<Certificate, AuthorityError> {
        validate_domain(domain)?;
        if domain.starts_with("*.") {
            return Err(AuthorityError::InvalidDomain(format!(
                "{} is a wildcard; HTTP-01 cannot validate wildcard names",
                domain
            )));
        }

        // Covers both polling phases plus account and order round-trips
        let deadline = self.config.order_timeout * 2 + Duration::from_secs(30);
        let (chain_pem, private_key_pem) =
            tokio::time::timeout(deadline, self.order_certificate(domain))
                .await
                .map_err(|_| AuthorityError::Timeout)??;

        let leaf = parse_leaf(&chain_pem).map_err(|e| AuthorityError::Protocol(e.to_string()))?;

        info!(domain = %domain, expires_at = %leaf.not_after, "ACME certificate issued");

        Ok(Certificate::new(
            domain,
            chain_pem,
            private_key_pem,
            leaf.not_after,
            self.config.certificate_type(),
        ))
    }
}

fn map_acme_error(err: instant_acme::Error) -> AuthorityError {
    match err {
        instant_acme::Error::Api(problem) => {
            let kind = problem.r#type.clone().unwrap_or_default();
            let detail = problem.detail.clone().unwrap_or_else(|| kind.clone());
            classify_problem(&kind, problem.status, detail)
        }
        // Order or certificate polling ran out of attempts
        instant_acme::Error::Timeout(_) => AuthorityError::Timeout,
        other => AuthorityError::Unreachable(other.to_string()),
    }
}

/// Map an RFC 8555 problem document onto an [`AuthorityError`]
fn classify_problem(kind: &str, status: Option<u16>, detail: String) -> AuthorityError {
    const VALIDATION_PROBLEMS: [&str; 7] = [
        "connection",
        "dns",
        "unauthorized",
        "incorrectResponse",
        "caa",
        "rejectedIdentifier",
        "tls",
    ];

    let name = kind.rsplit(':').next().unwrap_or(kind);

    if name == "rateLimited" {
        AuthorityError::RateLimited(detail)
    } else if VALIDATION_PROBLEMS.contains(&name) {
        AuthorityError::ValidationFailed(detail)
    } else if status.is_some_and(|s| s >= 500) || name == "serverInternal" {
        AuthorityError::Unreachable(detail)
    } else {
        AuthorityError::Protocol(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_selection() {
        let production = AcmeConfig::default();
        assert_eq!(production.directory(), LetsEncrypt::Production.url());

        let staging = AcmeConfig {
            use_staging: true,
            ..Default::default()
        };
        assert_eq!(staging.directory(), LetsEncrypt::Staging.url());
        assert_eq!(staging.certificate_type(), CertificateType::Staging);

        let custom = AcmeConfig {
            use_staging: true,
            directory_url: Some("https://localhost:14000/dir".to_string()),
            ..Default::default()
        };
        assert_eq!(custom.directory(), "https://localhost:14000/dir");
    }

    #[test]
    fn test_requires_contact_email() {
        let result = AcmeAuthority::new(AcmeConfig::default(), Http01ChallengeStore::new());
        assert!(matches!(result, Err(AuthorityError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_wildcard_rejected_before_network() {
        let authority = AcmeAuthority::new(
            AcmeConfig {
                contact_email: "ops@example.com".to_string(),
                ..Default::default()
            },
            Http01ChallengeStore::new(),
        )
        .unwrap();

        assert!(matches!(
            authority.renew_certificate("*.example.com").await,
            Err(AuthorityError::InvalidDomain(_))
        ));
    }

    #[test]
    fn test_problem_classification() {
        let detail = || "details".to_string();

        assert_eq!(
            classify_problem("urn:ietf:params:acme:error:rateLimited", Some(429), detail()),
            AuthorityError::RateLimited(detail())
        );
        assert_eq!(
            classify_problem("urn:ietf:params:acme:error:unauthorized", Some(403), detail()),
            AuthorityError::ValidationFailed(detail())
        );
        assert_eq!(
            classify_problem("urn:ietf:params:acme:error:serverInternal", Some(500), detail()),
            AuthorityError::Unreachable(detail())
        );
        assert_eq!(
            classify_problem("urn:ietf:params:acme:error:malformed", Some(400), detail()),
            AuthorityError::Protocol(detail())
        );
    }

    #[test]
    fn test_poll_exhaustion_is_a_timeout() {
        let err = map_acme_error(instant_acme::Error::Timeout(None));
        assert_eq!(err, AuthorityError::Timeout);
        assert!(err.is_transient());
    }

    #[test]
    fn test_challenge_store() {
        let store = Http01ChallengeStore::new();
        let shared = store.clone();

        store.publish("token-1", "token-1.thumbprint");
        assert_eq!(shared.get("token-1").as_deref(), Some("token-1.thumbprint"));
        assert_eq!(shared.len(), 1);

        shared.remove("token-1");
        assert!(store.get("token-1").is_none());
        assert!(store.is_empty());
    }
}
