//! # Structured Logging
//!
//! Subscriber setup and span helpers. Plugin processes reserve stdout for the
//! handshake line, so every subscriber installed here writes to stderr; the
//! host picks those lines up and re-emits them under
//! [`PLUGIN_STDERR_TARGET`].

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Tracing target used when the host re-emits a plugin's stderr output
pub const PLUGIN_STDERR_TARGET: &str = "backend_plugin::plugin_stderr";

/// Create a tracing span for a cross-process backend call.
///
/// ```rust,ignore
/// let span = plugin_span!("handle_request", "modern", path = %req.path);
/// ```
#[macro_export]
macro_rules! plugin_span {
    ($operation:expr, $transport:expr) => {
        tracing::debug_span!(
            "plugin_call",
            operation = %$operation,
            transport = %$transport
        )
    };
    ($operation:expr, $transport:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "plugin_call",
            operation = %$operation,
            transport = %$transport,
            $($field)*
        )
    };
}

/// Create a tracing span for a broker sub-connection.
#[macro_export]
macro_rules! broker_span {
    ($broker_id:expr, $service:expr) => {
        tracing::debug_span!("broker_stream", broker_id = $broker_id, service = %$service)
    };
}

/// Install the global `tracing` subscriber.
///
/// Returns an error if a global subscriber is already set.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let builder =
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(true);

    let result = if config.json_logging {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| Error::config(format!("Failed to install tracing subscriber: {}", e)))?;

    tracing::debug!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json_logging = config.json_logging,
        "Logging initialized"
    );
    Ok(())
}
