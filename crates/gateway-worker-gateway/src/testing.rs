//! In-memory transport for tests and dry runs

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

use crate::{GatewayInstance, GatewayPayload, GatewayTransport, TransportError};

/// Records every push and fails for instances marked as failing
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pushes: Mutex<Vec<(String, GatewayPayload)>>,
    failing: Mutex<HashSet<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an instance id as rejecting every push
    pub fn failing(self, instance_id: &str) -> Self {
        self.set_failing(instance_id, true);
        self
    }

    pub fn set_failing(&self, instance_id: &str, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(instance_id.to_string());
        } else {
            set.remove(instance_id);
        }
    }

    /// Accepted pushes as `(instance_id, payload)`
    pub fn pushes(&self) -> Vec<(String, GatewayPayload)> {
        self.pushes.lock().clone()
    }

    /// Accepted pushes whose payload has the given kind
    pub fn pushes_of_kind(&self, kind: &str) -> Vec<(String, GatewayPayload)> {
        self.pushes
            .lock()
            .iter()
            .filter(|(_, payload)| payload.kind() == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl GatewayTransport for ScriptedTransport {
    async fn push(
        &self,
        instance: &GatewayInstance,
        payload: &GatewayPayload,
    ) -> Result<(), TransportError> {
        if self.failing.lock().contains(&instance.id) {
            return Err(TransportError::Request(format!(
                "connection refused by {}",
                instance.address
            )));
        }

        self.pushes
            .lock()
            .push((instance.id.clone(), payload.clone()));
        Ok(())
    }
}
