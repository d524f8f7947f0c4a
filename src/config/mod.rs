//! # Configuration Management
//!
//! Runtime settings for plugin hosts and plugin processes. Every setting has
//! a default and can be overridden through `BACKEND_PLUGIN_*` environment
//! variables.

pub mod settings;

pub use settings::{ClientConfig, MuxConfig, ObservabilityConfig, PluginConfig, ENV_PREFIX};
