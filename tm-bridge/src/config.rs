//! Configuration for the bridge.

use std::env;
use std::time::Duration;

use crate::tm::Generation;

/// Where and how to reach the field-control server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// `host` or `host:port`
    pub address: String,
    /// Admin password (legacy) or API key (binary)
    pub secret: String,
    pub field_set: u32,
    pub generation: Generation,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            secret: String::new(),
            field_set: 0,
            generation: Generation::Binary,
        }
    }
}

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub connection: ConnectionConfig,
    /// Wait between reconnect attempts
    pub reconnect_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            reconnect_interval: Duration::from_secs(10),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(address) = lookup("TM_ADDRESS") {
            config.connection.address = address;
        }

        if let Some(secret) = lookup("TM_SECRET") {
            config.connection.secret = secret;
        }

        if let Some(field_set) = lookup("TM_FIELD_SET") {
            match field_set.parse() {
                Ok(id) => config.connection.field_set = id,
                Err(_) => tracing::warn!("Ignoring invalid TM_FIELD_SET '{}'", field_set),
            }
        }

        if let Some(protocol) = lookup("TM_PROTOCOL") {
            match protocol.parse() {
                Ok(generation) => config.connection.generation = generation,
                Err(e) => tracing::warn!("Ignoring TM_PROTOCOL: {}", e),
            }
        }

        if let Some(secs) = lookup("TM_RECONNECT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) if s > 0 => config.reconnect_interval = Duration::from_secs(s),
                _ => tracing::warn!("Ignoring invalid TM_RECONNECT_SECS '{}'", secs),
            }
        }

        config
    }
}
