//! # Configuration Settings
//!
//! Defines the configuration structure shared by plugin hosts and plugin
//! processes.

use crate::errors::{Error, Result};
use crate::transport::TransportKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Environment variable prefix for every setting in this module
pub const ENV_PREFIX: &str = "BACKEND_PLUGIN_";

/// Main plugin runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct PluginConfig {
    /// Multiplexer configuration
    #[validate(nested)]
    pub mux: MuxConfig,

    /// Host-side client configuration
    #[validate(nested)]
    pub client: ClientConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl PluginConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            mux: MuxConfig::from_env()?,
            client: ClientConfig::from_env()?,
            observability: ObservabilityConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if self.client.transports.is_empty() {
            return Err(Error::config("At least one plugin transport must be enabled"));
        }

        let mut seen = Vec::new();
        for kind in &self.client.transports {
            if seen.contains(kind) {
                return Err(Error::config(format!("Transport '{}' listed more than once", kind)));
            }
            seen.push(*kind);
        }

        Ok(())
    }
}

/// Sub-connection multiplexer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MuxConfig {
    /// Largest frame accepted on the physical link, in bytes
    #[validate(range(
        min = 1024,
        max = 67108864,
        message = "Max frame size must be between 1KB and 64MB"
    ))]
    pub max_frame_bytes: usize,

    /// How long an accepted broker ID waits for the peer to dial it
    #[validate(range(
        min = 10,
        max = 300000,
        message = "Accept timeout must be between 10ms and 300s"
    ))]
    pub accept_timeout_ms: u64,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1024 * 1024, // 16MB
            accept_timeout_ms: 5000,
        }
    }
}

impl MuxConfig {
    /// Get the accept timeout as Duration
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    /// Create MuxConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_frame_bytes: parse_env("MUX_MAX_FRAME_BYTES")?.unwrap_or(defaults.max_frame_bytes),
            accept_timeout_ms: parse_env("MUX_ACCEPT_TIMEOUT_MS")?
                .unwrap_or(defaults.accept_timeout_ms),
        })
    }
}

/// Host-side plugin client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClientConfig {
    /// How long to wait for the plugin to print its handshake line
    #[validate(range(
        min = 1,
        max = 300,
        message = "Start timeout must be between 1 and 300 seconds"
    ))]
    pub start_timeout_secs: u64,

    /// Run plugins in metadata mode (no live storage access)
    pub metadata_mode: bool,

    /// Transports offered to plugins, in order of preference
    pub transports: Vec<TransportKind>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            start_timeout_secs: 30,
            metadata_mode: false,
            transports: vec![TransportKind::Modern, TransportKind::Legacy],
        }
    }
}

impl ClientConfig {
    /// Get the start timeout as Duration
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// Create ClientConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let transports = match std::env::var(format!("{}TRANSPORTS", ENV_PREFIX)) {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<TransportKind>()
                        .map_err(|e| Error::config(format!("Invalid transport '{}': {}", s, e)))
                })
                .collect::<Result<Vec<_>>>()?,
            Err(_) => defaults.transports,
        };

        Ok(Self {
            start_timeout_secs: parse_env("START_TIMEOUT_SECS")?
                .unwrap_or(defaults.start_timeout_secs),
            metadata_mode: std::env::var(format!("{}METADATA_MODE", ENV_PREFIX))
                .map(|s| s.to_lowercase() == "true" || s == "1")
                .unwrap_or(defaults.metadata_mode),
            transports,
        })
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level filter (trace, debug, info, warn, error or an EnvFilter directive)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Service name attached to log output
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            service_name: "backend-plugin".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Create ObservabilityConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: std::env::var(format!("{}LOG_LEVEL", ENV_PREFIX))
                .unwrap_or(defaults.log_level),
            json_logging: std::env::var(format!("{}LOG_JSON", ENV_PREFIX))
                .map(|s| s.to_lowercase() == "true" || s == "1")
                .unwrap_or(defaults.json_logging),
            service_name: std::env::var(format!("{}SERVICE_NAME", ENV_PREFIX))
                .unwrap_or(defaults.service_name),
        }
    }
}

fn parse_env<T>(suffix: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let name = format!("{}{}", ENV_PREFIX, suffix);
    match std::env::var(&name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PluginConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mux.accept_timeout(), Duration::from_secs(5));
        assert_eq!(config.client.start_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_frame_size_validation() {
        let mut config = PluginConfig::default();
        config.mux.max_frame_bytes = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_frame_bytes"));
    }

    #[test]
    fn test_transport_list_validation() {
        let mut config = PluginConfig::default();
        config.client.transports.clear();
        assert!(config.validate().is_err());

        config.client.transports = vec![TransportKind::Legacy, TransportKind::Legacy];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_empty_log_level_rejected() {
        let mut config = PluginConfig::default();
        config.observability.log_level = String::new();
        assert!(config.validate().is_err());
    }
}
