//! `config_update` job handler
//!
//! Pushes an opaque configuration document (WAF rules, routing table, backend
//! pool, security policy) to every registered Gateway instance.

use async_trait::async_trait;
use gateway_worker_queue::{Job, JobError, JobHandler};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    fan_out, ConfigType, ConfigurationUpdate, DistributionError, GatewayPayload, GatewayRegistry,
    GatewayTransport,
};

pub struct ConfigUpdateHandler {
    registry: GatewayRegistry,
    transport: Arc<dyn GatewayTransport>,
}

impl ConfigUpdateHandler {
    pub fn new(registry: GatewayRegistry, transport: Arc<dyn GatewayTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    fn parse(job: &Job) -> Result<ConfigurationUpdate, JobError> {
        let config_type: ConfigType = job
            .payload_str("config_type")
            .ok_or_else(|| JobError::fatal("config_update job is missing config_type"))?
            .parse()
            .map_err(JobError::fatal)?;

        let data = job
            .payload
            .get("data")
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| JobError::fatal("config_update job is missing data"))?;

        let version = job.payload.get("version").and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(ConfigurationUpdate {
            config_type,
            version,
            data,
        })
    }
}

#[async_trait]
impl JobHandler for ConfigUpdateHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let update = Self::parse(job)?;
        let config_type = update.config_type;

        let instances = self.registry.list();
        if instances.is_empty() {
            warn!(config_type = %config_type, "No gateway instances registered, nothing to push");
            return Ok(());
        }

        let payload = GatewayPayload::Configuration(update);
        let report = fan_out(self.transport.as_ref(), &instances, &payload).await;

        match report.into_result() {
            Ok(report) => {
                info!(
                    config_type = %config_type,
                    instances = report.succeeded.len(),
                    "Configuration pushed"
                );
                Ok(())
            }
            Err(err @ DistributionError::Partial { .. }) => {
                warn!(config_type = %config_type, error = %err, "Configuration partially pushed");
                Ok(())
            }
            Err(err) => Err(JobError::retryable(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use crate::GatewayInstance;
    use gateway_worker_queue::JobType;
    use serde_json::{json, Map};

    fn setup(transport: ScriptedTransport) -> (ConfigUpdateHandler, Arc<ScriptedTransport>) {
        let registry = GatewayRegistry::from_instances(vec![
            GatewayInstance::new("gw-1", "10.0.0.1:9000"),
            GatewayInstance::new("gw-2", "10.0.0.2:9000"),
        ]);
        let transport = Arc::new(transport);
        (
            ConfigUpdateHandler::new(registry, transport.clone()),
            transport,
        )
    }

    fn waf_job() -> Job {
        Job::new(JobType::ConfigUpdate, Map::new())
            .with_payload_entry("config_type", "waf")
            .with_payload_entry("version", 12)
            .with_payload_entry("data", json!({"rules": [{"id": 1, "action": "block"}]}))
    }

    #[tokio::test]
    async fn test_pushes_to_every_instance() {
        let (handler, transport) = setup(ScriptedTransport::new());

        handler.handle(&waf_job()).await.unwrap();

        let pushes = transport.pushes_of_kind("configuration");
        assert_eq!(pushes.len(), 2);
        match &pushes[0].1 {
            GatewayPayload::Configuration(update) => {
                assert_eq!(update.config_type, ConfigType::Waf);
                assert_eq!(update.version.as_deref(), Some("12"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_partial_push_is_accepted() {
        let (handler, transport) = setup(ScriptedTransport::new().failing("gw-2"));
        handler.handle(&waf_job()).await.unwrap();
        assert_eq!(transport.pushes().len(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_is_retryable() {
        let (handler, _) = setup(ScriptedTransport::new().failing("gw-1").failing("gw-2"));
        let err = handler.handle(&waf_job()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_bad_payload_is_fatal() {
        let (handler, transport) = setup(ScriptedTransport::new());

        let unknown = Job::new(JobType::ConfigUpdate, Map::new())
            .with_payload_entry("config_type", "geoip")
            .with_payload_entry("data", json!({}));
        assert!(!handler.handle(&unknown).await.unwrap_err().is_retryable());

        let missing_data =
            Job::new(JobType::ConfigUpdate, Map::new()).with_payload_entry("config_type", "routing");
        assert!(!handler.handle(&missing_data).await.unwrap_err().is_retryable());

        assert!(transport.pushes().is_empty());
    }
}
