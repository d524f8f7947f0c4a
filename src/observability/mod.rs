//! # Observability Infrastructure
//!
//! Structured logging for plugin hosts and plugin processes, and a tracing
//! layer for the gRPC services of the modern transport.

pub mod grpc_tracing;
pub mod logging;

pub use grpc_tracing::GrpcTracingLayer;
pub use logging::{init_logging, PLUGIN_STDERR_TARGET};

use crate::config::PluginConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging from a full plugin configuration and log the effective
/// runtime settings.
pub fn init_observability(config: &PluginConfig) -> Result<()> {
    init_logging(&config.observability)?;

    info!(
        service_name = %config.observability.service_name,
        max_frame_bytes = config.mux.max_frame_bytes,
        accept_timeout_ms = config.mux.accept_timeout_ms,
        metadata_mode = config.client.metadata_mode,
        "Observability initialized successfully"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let config = PluginConfig::default();
        let _ = init_observability(&config);
        let err = init_observability(&config).unwrap_err();
        assert!(err.to_string().contains("Failed to install tracing subscriber"));
    }

    #[test]
    fn test_invalid_level_is_config_error() {
        let mut config = PluginConfig::default();
        config.observability.log_level = "kv=loud".to_string();
        assert!(matches!(init_observability(&config), Err(crate::Error::Config { .. })));
    }
}
