//! Certificate distribution to Gateway instances

use async_trait::async_trait;
use gateway_worker_gateway::{
    fan_out, DistributionError, FanOutReport, GatewayInstance, GatewayPayload, GatewayRegistry,
    GatewayTransport,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{Certificate, TemporaryCertificate};

/// Pushes certificates to Gateway instances
///
/// Partial failure is reported as [`DistributionError::Partial`]; the caller
/// decides whether it is acceptable.
#[async_trait]
pub trait CertificateDistributor: Send + Sync {
    /// Instances currently known to the distributor
    fn instances(&self) -> Vec<GatewayInstance>;

    async fn deploy(
        &self,
        cert: &Certificate,
        instances: &[GatewayInstance],
    ) -> Result<FanOutReport, DistributionError>;

    /// Push a temporary certificate to every known instance
    async fn deploy_temporary(
        &self,
        temp: &TemporaryCertificate,
    ) -> Result<FanOutReport, DistributionError>;
}

/// Distributor over the instance registry and a transport
pub struct GatewayDistributor {
    registry: GatewayRegistry,
    transport: Arc<dyn GatewayTransport>,
}

impl GatewayDistributor {
    pub fn new(registry: GatewayRegistry, transport: Arc<dyn GatewayTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    async fn push(
        &self,
        domain: &str,
        instances: &[GatewayInstance],
        payload: GatewayPayload,
    ) -> Result<FanOutReport, DistributionError> {
        if instances.is_empty() {
            warn!(domain = %domain, kind = payload.kind(), "No gateway instances to deploy to");
            return Ok(FanOutReport::default());
        }

        let report = fan_out(self.transport.as_ref(), instances, &payload).await;
        info!(
            domain = %domain,
            kind = payload.kind(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Certificate push finished"
        );
        report.into_result()
    }
}

#[async_trait]
impl CertificateDistributor for GatewayDistributor {
    fn instances(&self) -> Vec<GatewayInstance> {
        self.registry.list()
    }

    async fn deploy(
        &self,
        cert: &Certificate,
        instances: &[GatewayInstance],
    ) -> Result<FanOutReport, DistributionError> {
        self.push(
            &cert.domain,
            instances,
            GatewayPayload::Certificate(cert.to_bundle()),
        )
        .await
    }

    async fn deploy_temporary(
        &self,
        temp: &TemporaryCertificate,
    ) -> Result<FanOutReport, DistributionError> {
        let instances = self.registry.list();
        self.push(
            temp.domain(),
            &instances,
            GatewayPayload::TemporaryCertificate {
                certificate: temp.certificate.to_bundle(),
                reason: temp.reason.clone(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CertificateType;
    use chrono::{Duration, Utc};
    use gateway_worker_gateway::testing::ScriptedTransport;

    fn setup(transport: ScriptedTransport) -> (GatewayDistributor, Arc<ScriptedTransport>) {
        let registry = GatewayRegistry::from_instances(vec![
            GatewayInstance::new("gw-1", "10.0.0.1:9000"),
            GatewayInstance::new("gw-2", "10.0.0.2:9000"),
        ]);
        let transport = Arc::new(transport);
        (GatewayDistributor::new(registry, transport.clone()), transport)
    }

    fn cert(cert_type: CertificateType) -> Certificate {
        Certificate::new(
            "api.example.com",
            "cert",
            "key",
            Utc::now() + Duration::days(14),
            cert_type,
        )
    }

    #[tokio::test]
    async fn test_deploy_to_all_instances() {
        let (distributor, transport) = setup(ScriptedTransport::new());
        let instances = distributor.instances();

        let report = distributor
            .deploy(&cert(CertificateType::Production), &instances)
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec!["gw-1", "gw-2"]);
        assert_eq!(transport.pushes_of_kind("certificate").len(), 2);
    }

    #[tokio::test]
    async fn test_partial_deploy_surfaces_failed_instance() {
        let (distributor, _) = setup(ScriptedTransport::new().failing("gw-1"));
        let instances = distributor.instances();

        let err = distributor
            .deploy(&cert(CertificateType::Production), &instances)
            .await
            .unwrap_err();

        assert!(err.is_partial());
        assert_eq!(err.failed()[0].instance_id, "gw-1");
    }

    #[tokio::test]
    async fn test_deploy_temporary_carries_reason() {
        let (distributor, transport) = setup(ScriptedTransport::new());
        let temp = TemporaryCertificate {
            certificate: cert(CertificateType::Temporary),
            reason: "authority unreachable".to_string(),
        };

        distributor.deploy_temporary(&temp).await.unwrap();

        let pushes = transport.pushes_of_kind("temporary_certificate");
        assert_eq!(pushes.len(), 2);
        match &pushes[0].1 {
            GatewayPayload::TemporaryCertificate { certificate, reason } => {
                assert_eq!(reason, "authority unreachable");
                assert_eq!(certificate.certificate_type, "temporary");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
