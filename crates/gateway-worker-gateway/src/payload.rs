//! Payloads pushed to Gateway instances
//!
//! Serialized as JSON with a `kind` tag, e.g.
//! `{"kind":"certificate","domain":"api.example.com",...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Certificate material as sent over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBundle {
    pub domain: String,
    /// PEM chain, leaf first
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub expires_at: DateTime<Utc>,
    /// "production", "staging" or "temporary"
    pub certificate_type: String,
}

/// Kinds of configuration a Gateway instance accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    Waf,
    Routing,
    Backend,
    Security,
}

impl ConfigType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::Waf => "waf",
            ConfigType::Routing => "routing",
            ConfigType::Backend => "backend",
            ConfigType::Security => "security",
        }
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waf" => Ok(ConfigType::Waf),
            "routing" => Ok(ConfigType::Routing),
            "backend" => Ok(ConfigType::Backend),
            "security" => Ok(ConfigType::Security),
            other => Err(format!("Unknown config type: {}", other)),
        }
    }
}

/// Opaque configuration document for one config type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationUpdate {
    pub config_type: ConfigType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub data: Value,
}

/// Everything the worker can push to an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayPayload {
    Certificate(CertificateBundle),
    TemporaryCertificate {
        #[serde(flatten)]
        certificate: CertificateBundle,
        reason: String,
    },
    Configuration(ConfigurationUpdate),
}

impl GatewayPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayPayload::Certificate(_) => "certificate",
            GatewayPayload::TemporaryCertificate { .. } => "temporary_certificate",
            GatewayPayload::Configuration(_) => "configuration",
        }
    }
}
