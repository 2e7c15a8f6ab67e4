//! Gateway instance plumbing for the worker
//!
//! This crate knows which Gateway instances exist ([`GatewayRegistry`]), how to
//! reach one of them ([`GatewayTransport`]) and how to reach all of them at
//! once with per-instance reporting ([`fan_out`]). Certificate distribution
//! and configuration pushes are both built on top of it.

pub mod config_push;
pub mod fanout;
pub mod instance;
pub mod payload;
pub mod registry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use config_push::ConfigUpdateHandler;
pub use fanout::{fan_out, DistributionError, FanOutReport, InstanceFailure};
pub use instance::{GatewayInstance, PUSH_PATH};
pub use payload::{CertificateBundle, ConfigType, ConfigurationUpdate, GatewayPayload};
pub use registry::GatewayRegistry;
pub use transport::{GatewayTransport, HttpGatewayTransport, HttpTransportConfig, TransportError};
