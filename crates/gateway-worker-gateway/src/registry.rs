//! Registry of Gateway instances known to the worker
//!
//! The registry is seeded from configuration at startup and shared by the
//! certificate distributor and the configuration push handler.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::GatewayInstance;

/// Registry of Gateway instances keyed by instance id
#[derive(Debug, Clone, Default)]
pub struct GatewayRegistry {
    instances: Arc<RwLock<HashMap<String, GatewayInstance>>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with `instances`
    pub fn from_instances(instances: impl IntoIterator<Item = GatewayInstance>) -> Self {
        let registry = Self::new();
        for instance in instances {
            registry.register(instance);
        }
        registry
    }

    /// Register an instance, replacing any previous entry with the same id
    ///
    /// Returns the replaced instance, if any.
    pub fn register(&self, instance: GatewayInstance) -> Option<GatewayInstance> {
        let mut instances = self.instances.write();
        let old = instances.insert(instance.id.clone(), instance.clone());

        if let Some(ref replaced) = old {
            tracing::info!(
                instance_id = %instance.id,
                address = %instance.address,
                old_address = %replaced.address,
                "Replaced gateway instance"
            );
        } else {
            tracing::info!(
                instance_id = %instance.id,
                address = %instance.address,
                "Registered gateway instance"
            );
        }

        old
    }

    /// Remove an instance by id
    pub fn unregister(&self, instance_id: &str) -> Option<GatewayInstance> {
        let removed = self.instances.write().remove(instance_id);

        if removed.is_some() {
            tracing::info!(instance_id = %instance_id, "Unregistered gateway instance");
        } else {
            tracing::warn!(
                instance_id = %instance_id,
                "Attempted to unregister unknown gateway instance"
            );
        }

        removed
    }

    pub fn get(&self, instance_id: &str) -> Option<GatewayInstance> {
        self.instances.read().get(instance_id).cloned()
    }

    /// All registered instances, ordered by id
    pub fn list(&self) -> Vec<GatewayInstance> {
        let mut instances: Vec<_> = self.instances.read().values().cloned().collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        instances
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}
