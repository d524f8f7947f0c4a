//! # Plugin Process Lifecycle
//!
//! Spawning plugin binaries, the handshake that selects a transport, and the
//! `serve` entry point plugin binaries call from `main`.
//!
//! ```rust,ignore
//! // host
//! let plugin = PluginClient::start(&runner, &config).await?;
//! let backend = plugin.dispense()?;
//! backend.setup(&ctx, backend_config).await?;
//!
//! // plugin binary
//! process::serve(Arc::new(factory), ServeConfig::from_env()?).await?;
//! ```

pub mod client;
pub mod handshake;
pub mod serve;

pub use client::PluginClient;
pub use handshake::{
    HandshakeConfig, HandshakeLine, Network, CORE_PROTOCOL_VERSION, MAGIC_COOKIE_KEY,
    MAGIC_COOKIE_VALUE, METADATA_MODE_ENV, PROTOCOL_VERSIONS_ENV,
};
pub use serve::{serve, serve_connection, ServeConfig};
