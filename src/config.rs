//! Configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration. Every field has a default, so a partial JSON
/// document is enough.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub socket: SocketConfig,
    pub auth: AuthConfig,
}

impl Config {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.socket.validate()
    }
}

/// Expiring cache configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix put in front of every cache key in storage.
    /// Default: "cache:"
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "cache:".to_string(),
        }
    }
}

/// Connection registry configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Liveness ping period in milliseconds.
    /// Default: 15000
    pub ping_interval_ms: u64,

    /// Text frame sent as a ping.
    /// Default: "ping"
    pub ping_payload: String,
}

/// Shortest ping period a connection will use.
pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(10);

impl SocketConfig {
    /// The ping period, never shorter than [`MIN_PING_INTERVAL`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms).max(MIN_PING_INTERVAL)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ping_interval_ms == 0 {
            return Err(Error::Config("socket.ping_interval_ms must be positive".into()));
        }
        Ok(())
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 15_000,
            ping_payload: "ping".to_string(),
        }
    }
}

/// Session normalization configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Custom attributes holding JSON documents.
    pub json_fields: Vec<String>,

    /// Attributes stored under the provider's `custom:` prefix.
    /// Default: ["role"]
    pub custom_fields: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            json_fields: Vec::new(),
            custom_fields: vec!["role".to_string()],
        }
    }
}
