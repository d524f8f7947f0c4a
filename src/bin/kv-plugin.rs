use std::sync::Arc;

use backend_plugin::{
    mock::MockBackend,
    observability::init_observability,
    process::{serve, ServeConfig},
    transport::TransportKind,
    PluginConfig, Result,
};
use clap::Parser;
use tracing::{error, info};

/// Reference key/value backend served as a plugin.
#[derive(Parser)]
#[command(name = "kv-plugin")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Log level filter, overriding BACKEND_PLUGIN_LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,

    /// Transports to offer; defaults to every supported one
    #[arg(long = "transport", value_delimiter = ',')]
    transports: Vec<TransportKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = PluginConfig::from_env()?;
    if let Some(level) = args.log_level {
        settings.observability.log_level = level;
    }
    settings.observability.json_logging |= args.json;
    settings.observability.service_name = "kv-plugin".to_string();
    init_observability(&settings)?;

    let mut config = ServeConfig { mux: settings.mux, ..Default::default() };
    if !args.transports.is_empty() {
        config.transports = args.transports;
    }
    info!(transports = ?config.transports, "Starting kv plugin");

    if let Err(e) = serve(Arc::new(MockBackend::factory()), config).await {
        error!(error = %e, "Plugin exited with error");
        return Err(e);
    }
    Ok(())
}
