//! Concurrent multi-instance delivery with per-instance reporting

use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{GatewayInstance, GatewayPayload, GatewayTransport};

/// One instance that did not accept a push
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceFailure {
    pub instance_id: String,
    pub address: String,
    pub error: String,
}

impl fmt::Display for InstanceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.instance_id, self.address, self.error)
    }
}

fn describe(failed: &[InstanceFailure]) -> String {
    failed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Aggregate delivery failure across instances
#[derive(Debug, Clone, Error)]
pub enum DistributionError {
    /// Some instances accepted the push
    #[error("Push reached {succeeded} instance(s), failed on {}: {}", .failed.len(), describe(.failed))]
    Partial {
        succeeded: usize,
        failed: Vec<InstanceFailure>,
    },

    /// No instance accepted the push
    #[error("Push failed on all {} instance(s): {}", .failed.len(), describe(.failed))]
    AllFailed { failed: Vec<InstanceFailure> },
}

impl DistributionError {
    pub fn failed(&self) -> &[InstanceFailure] {
        match self {
            DistributionError::Partial { failed, .. } | DistributionError::AllFailed { failed } => {
                failed
            }
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, DistributionError::Partial { .. })
    }
}

/// Per-instance outcome of a fan-out
#[derive(Debug, Clone, Default, Serialize)]
pub struct FanOutReport {
    /// Ids of the instances that accepted the push
    pub succeeded: Vec<String>,
    pub failed: Vec<InstanceFailure>,
}

impl FanOutReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Collapse the report into an aggregate result
    ///
    /// An empty fan-out (no instances) is a success.
    pub fn into_result(self) -> Result<FanOutReport, DistributionError> {
        if self.failed.is_empty() {
            Ok(self)
        } else if self.succeeded.is_empty() {
            Err(DistributionError::AllFailed {
                failed: self.failed,
            })
        } else {
            Err(DistributionError::Partial {
                succeeded: self.succeeded.len(),
                failed: self.failed,
            })
        }
    }
}

/// Push `payload` to every instance concurrently
pub async fn fan_out(
    transport: &dyn GatewayTransport,
    instances: &[GatewayInstance],
    payload: &GatewayPayload,
) -> FanOutReport {
    let pushes = instances.iter().map(|instance| async move {
        let result = transport.push(instance, payload).await;
        (instance, result)
    });

    let mut report = FanOutReport::default();
    for (instance, result) in join_all(pushes).await {
        match result {
            Ok(()) => {
                debug!(instance_id = %instance.id, kind = payload.kind(), "Push accepted");
                report.succeeded.push(instance.id.clone());
            }
            Err(e) => {
                warn!(
                    instance_id = %instance.id,
                    address = %instance.address,
                    kind = payload.kind(),
                    error = %e,
                    "Push failed"
                );
                report.failed.push(InstanceFailure {
                    instance_id: instance.id.clone(),
                    address: instance.address.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    report
}
