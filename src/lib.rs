//! # Backend Plugin
//!
//! Out-of-process backend plugins for a secrets platform. Secret engines and
//! auth methods run as separate OS processes; the host spawns them, performs
//! a handshake and then drives them through the same [`Backend`] contract a
//! built-in backend implements.
//!
//! ## Architecture
//!
//! ```text
//! Host                                        Plugin process
//! Backend handle ──┐                      ┌── BackendServer ── your Backend
//!   (transport)    │  mux session (frames) │        │
//! Resource shims ◄─┴──────────────────────┴──► shim clients
//! (Storage, Logger, SystemView)
//! ```
//!
//! ## Core Components
//!
//! - **Domain model** ([`logical`]): requests, responses, the [`Backend`]
//!   trait and the host resources a backend uses
//! - **Translation** ([`translate`]): conversions to and from the wire shapes
//! - **Connection broker** ([`mux`]): framed stream multiplexing and broker IDs
//! - **RPC** ([`rpc`]): the legacy transport's request/reply and notifications
//!   over one stream
//! - **Resource shims** ([`shims`]): Storage, Logger and SystemView proxies
//! - **Transports** ([`transport`]): the legacy Backend protocol and the
//!   modern one, whose services are `tonic` gRPC services on broker streams
//! - **Middleware** ([`middleware`]): tracing wrapper for any backend
//! - **Process lifecycle** ([`process`]): spawn, handshake, dispense, serve
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use backend_plugin::{logical::*, process::PluginClient, PluginConfig};
//! use std::sync::Arc;
//!
//! # async fn run(
//! #     runner: PluginRunner,
//! #     storage: StorageView,
//! # ) -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let config = PluginConfig::from_env()?;
//! let plugin = PluginClient::start(&runner, &config).await?;
//! let backend = plugin.dispense()?;
//!
//! let ctx = Context::background();
//! backend
//!     .setup(&ctx, BackendConfig {
//!         storage_view: storage,
//!         logger: Arc::new(TracingLogger::new("kv", LogLevel::Info)),
//!         system: Arc::new(StaticSystemView::default()),
//!         config: Default::default(),
//!     })
//!     .await?;
//! let resp = backend.handle_request(&ctx, Request::new(Operation::Read, "kv/foo")).await?;
//! # let _ = resp;
//! backend.cleanup(&ctx).await;
//! plugin.kill().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod logical;
pub mod middleware;
pub mod mock;
pub mod mux;
pub mod observability;
pub mod process;
pub mod rpc;
pub mod shims;
pub mod translate;
pub mod transport;

// Re-export commonly used types and traits
pub use config::PluginConfig;
pub use errors::{Error, Result};
pub use logical::{Backend, BackendConfig, BackendFactory, Context, LogicalError};
pub use middleware::TracingBackend;
pub use process::{serve, PluginClient, ServeConfig};
pub use transport::{PluginBackend, TransportKind};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
