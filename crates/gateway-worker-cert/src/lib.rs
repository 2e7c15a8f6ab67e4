//! Certificate lifecycle for Gateway instances
//!
//! Keeps every stored domain certificate renewed and deployed:
//! - [`CertificateManager`] sweeps the store and dispatches renewal jobs
//! - [`RenewalAuthority`] issues certificates (ACME, or self-signed in development)
//! - [`CertificateDistributor`] pushes them to Gateway instances
//! - a 14-day self-signed [`TemporaryCertificate`] is deployed when renewal fails

pub mod alert;
pub mod authority;
pub mod distributor;
pub mod handlers;
pub mod manager;
pub mod model;
pub mod self_signed;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validator;

pub use alert::{Alert, AlertSeverity, AlertSink, TracingAlertSink, ALERT_TARGET};
pub use authority::{
    AcmeAuthority, AcmeConfig, AuthorityError, Http01ChallengeStore, RenewalAuthority,
    SelfSignedAuthority,
};
pub use distributor::{CertificateDistributor, GatewayDistributor};
pub use handlers::{CertificateRenewalHandler, CertificateValidationHandler};
pub use manager::{
    CertificateManager, DispatchedRenewal, LifecycleConfig, LifecycleError, SweepReport,
    MIN_SWEEP_INTERVAL,
};
pub use model::{
    Certificate, CertificateState, CertificateStatus, CertificateType, TemporaryCertificate,
    TemporaryStatus, TEMPORARY_VALIDITY_DAYS,
};
pub use self_signed::{generate_self_signed_certificate, SelfSignedCertificate, SelfSignedError};
pub use store::{CertificateStore, InMemoryCertificateStore, StoreError};
pub use validator::{parse_leaf, CertificateValidator, LeafInfo, ValidationError, X509Validator};
