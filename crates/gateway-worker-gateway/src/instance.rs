//! Gateway instance addressing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Path on a Gateway instance that accepts pushed payloads
pub const PUSH_PATH: &str = "/worker/v1/push";

/// A Gateway instance the worker pushes certificates and configuration to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GatewayInstance {
    /// Stable identifier used in logs and failure reports
    pub id: String,
    /// `host:port` or a full base URL (e.g., "https://gw-1.internal:9443")
    pub address: String,
}

impl GatewayInstance {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }

    /// Base URL of the instance; addresses without a scheme use plain HTTP
    pub fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        }
    }

    pub fn push_url(&self) -> String {
        format!("{}{}", self.base_url(), PUSH_PATH)
    }
}

impl fmt::Display for GatewayInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.address)
    }
}

/// Parses `id=address` or a bare `address` (the address doubles as the id)
impl FromStr for GatewayInstance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Gateway instance cannot be empty".to_string());
        }

        match s.split_once('=') {
            Some((id, address)) => {
                let (id, address) = (id.trim(), address.trim());
                if id.is_empty() || address.is_empty() {
                    return Err(format!(
                        "Invalid gateway instance '{}': expected id=address",
                        s
                    ));
                }
                Ok(Self::new(id, address))
            }
            None => Ok(Self::new(s, s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_id() {
        let instance: GatewayInstance = "gw-1=10.0.0.5:9000".parse().unwrap();
        assert_eq!(instance.id, "gw-1");
        assert_eq!(instance.address, "10.0.0.5:9000");
    }

    #[test]
    fn test_parse_bare_address() {
        let instance: GatewayInstance = "10.0.0.6:9000".parse().unwrap();
        assert_eq!(instance.id, "10.0.0.6:9000");
        assert_eq!(instance.address, "10.0.0.6:9000");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<GatewayInstance>().is_err());
        assert!("gw-1=".parse::<GatewayInstance>().is_err());
        assert!("=10.0.0.5:9000".parse::<GatewayInstance>().is_err());
    }

    #[test]
    fn test_push_url() {
        let plain = GatewayInstance::new("gw-1", "10.0.0.5:9000");
        assert_eq!(plain.push_url(), "http://10.0.0.5:9000/worker/v1/push");

        let tls = GatewayInstance::new("gw-2", "https://gw-2.internal:9443/");
        assert_eq!(tls.push_url(), "https://gw-2.internal:9443/worker/v1/push");
    }
}
