//! # Backend Transports
//!
//! The two wire protocols that carry the Backend service between host and
//! plugin. The protocol is chosen during the handshake; afterwards both are
//! used through the [`PluginBackend`] handle, which implements
//! [`Backend`] the same way a local backend does.

pub mod legacy;
pub mod modern;
pub mod protocol;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::logical::{
    self, Backend, BackendConfig, BackendType, Context, ExistenceCheck, Logger, Paths, Request,
    Response, SystemView,
};

/// Wire protocol spoken with a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Per-request storage streams and flattened errors.
    Legacy,
    /// Shared resource stream, typed errors, deadlines and cancellation.
    Modern,
}

impl TransportKind {
    /// Protocol version announced in the handshake.
    pub fn protocol_version(self) -> u32 {
        match self {
            TransportKind::Legacy => 4,
            TransportKind::Modern => 5,
        }
    }

    pub fn from_protocol_version(version: u32) -> Option<Self> {
        match version {
            4 => Some(TransportKind::Legacy),
            5 => Some(TransportKind::Modern),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Legacy => f.write_str("legacy"),
            TransportKind::Modern => f.write_str("modern"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "legacy" | "4" => Ok(TransportKind::Legacy),
            "modern" | "5" => Ok(TransportKind::Modern),
            other => Err(format!("unknown transport '{}', expected legacy or modern", other)),
        }
    }
}

/// Host-side handle to a plugin backend over whichever transport was negotiated.
pub enum PluginBackend {
    Legacy(legacy::BackendClient),
    Modern(modern::BackendClient),
}

impl PluginBackend {
    pub fn transport(&self) -> TransportKind {
        match self {
            PluginBackend::Legacy(_) => TransportKind::Legacy,
            PluginBackend::Modern(_) => TransportKind::Modern,
        }
    }

    pub fn metadata_mode(&self) -> bool {
        match self {
            PluginBackend::Legacy(client) => client.metadata_mode(),
            PluginBackend::Modern(client) => client.metadata_mode(),
        }
    }

    fn inner(&self) -> &dyn Backend {
        match self {
            PluginBackend::Legacy(client) => client,
            PluginBackend::Modern(client) => client,
        }
    }
}

impl fmt::Debug for PluginBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginBackend")
            .field("transport", &self.transport())
            .field("metadata_mode", &self.metadata_mode())
            .finish()
    }
}

#[async_trait]
impl Backend for PluginBackend {
    async fn handle_request(
        &self,
        ctx: &Context,
        req: Request,
    ) -> logical::Result<Option<Response>> {
        self.inner().handle_request(ctx, req).await
    }

    async fn handle_existence_check(
        &self,
        ctx: &Context,
        req: Request,
    ) -> logical::Result<ExistenceCheck> {
        self.inner().handle_existence_check(ctx, req).await
    }

    async fn special_paths(&self) -> Option<Paths> {
        self.inner().special_paths().await
    }

    fn system(&self) -> Option<Arc<dyn SystemView>> {
        self.inner().system()
    }

    fn logger(&self) -> Option<Arc<dyn Logger>> {
        self.inner().logger()
    }

    async fn setup(&self, ctx: &Context, config: BackendConfig) -> logical::Result<()> {
        self.inner().setup(ctx, config).await
    }

    async fn initialize(&self, ctx: &Context) -> logical::Result<()> {
        self.inner().initialize(ctx).await
    }

    async fn invalidate_key(&self, ctx: &Context, key: &str) {
        self.inner().invalidate_key(ctx, key).await
    }

    async fn cleanup(&self, ctx: &Context) {
        self.inner().cleanup(ctx).await
    }

    async fn backend_type(&self) -> BackendType {
        self.inner().backend_type().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_versions() {
        assert_eq!(TransportKind::Legacy.protocol_version(), 4);
        assert_eq!(TransportKind::Modern.protocol_version(), 5);
        assert_eq!(TransportKind::from_protocol_version(5), Some(TransportKind::Modern));
        assert_eq!(TransportKind::from_protocol_version(3), None);
    }

    #[test]
    fn test_transport_kind_parsing() {
        assert_eq!("Modern".parse::<TransportKind>().unwrap(), TransportKind::Modern);
        assert_eq!("4".parse::<TransportKind>().unwrap(), TransportKind::Legacy);
        assert!("grpc".parse::<TransportKind>().is_err());
        assert_eq!(TransportKind::Legacy.to_string(), "legacy");
    }
}
