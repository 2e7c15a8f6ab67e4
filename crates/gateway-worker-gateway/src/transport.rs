//! Transport boundary to Gateway instances

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::{GatewayInstance, GatewayPayload};

/// Transport errors for a single instance
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Push timed out")]
    Timeout,

    #[error("Push request failed: {0}")]
    Request(String),

    #[error("Instance rejected push with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport setup failed: {0}")]
    Setup(String),
}

/// Delivers payloads to one Gateway instance
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn push(
        &self,
        instance: &GatewayInstance,
        payload: &GatewayPayload,
    ) -> Result<(), TransportError>;
}

/// HTTP transport settings
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// Pushes JSON payloads to `<base>/worker/v1/push`
#[derive(Debug, Clone)]
pub struct HttpGatewayTransport {
    client: reqwest::Client,
}

impl HttpGatewayTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("gateway-worker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl GatewayTransport for HttpGatewayTransport {
    async fn push(
        &self,
        instance: &GatewayInstance,
        payload: &GatewayPayload,
    ) -> Result<(), TransportError> {
        let url = instance.push_url();
        debug!(instance_id = %instance.id, url = %url, kind = payload.kind(), "Pushing payload");

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
