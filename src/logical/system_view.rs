//! Read-only view of host configuration exposed to backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::error::{LogicalError, Result};
use super::response::ResponseWrapInfo;
use super::DataMap;

/// Replication role of the host cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationState {
    #[default]
    Unknown,
    PerformancePrimary,
    PerformanceSecondary,
    PerformanceStandby,
    DrPrimary,
    DrSecondary,
}

/// How to launch a registered plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRunner {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub sha256: Vec<u8>,
    pub builtin: bool,
}

/// Host configuration a backend may consult.
#[async_trait]
pub trait SystemView: Send + Sync {
    /// Default lease TTL for the mount.
    async fn default_lease_ttl(&self) -> Duration;

    /// Maximum lease TTL for the mount.
    async fn max_lease_ttl(&self) -> Duration;

    /// Whether `token` has sudo capability on `path`.
    async fn sudo_privilege(&self, path: &str, token: &str) -> bool;

    /// Whether the mount is tainted (being unmounted or remounted).
    async fn tainted(&self) -> bool;

    async fn caching_disabled(&self) -> bool;

    async fn replication_state(&self) -> ReplicationState;

    /// Wrap `data` in a response-wrapping token valid for `ttl`.
    async fn response_wrap_data(
        &self,
        data: &DataMap,
        ttl: Duration,
        jwt: bool,
    ) -> Result<ResponseWrapInfo>;

    async fn mlock_enabled(&self) -> bool;

    /// Whether the mount is local to this cluster (not replicated).
    async fn local_mount(&self) -> bool;

    async fn lookup_plugin(&self, name: &str) -> Result<PluginRunner>;
}

/// System view answering from fixed values.
///
/// The default value is the empty view handed to plugins in metadata mode.
#[derive(Debug, Clone, Default)]
pub struct StaticSystemView {
    pub default_lease_ttl: Duration,
    pub max_lease_ttl: Duration,
    pub sudo_privilege: bool,
    pub tainted: bool,
    pub caching_disabled: bool,
    pub replication_state: ReplicationState,
    pub mlock_enabled: bool,
    pub local_mount: bool,
    pub plugins: HashMap<String, PluginRunner>,
}

#[async_trait]
impl SystemView for StaticSystemView {
    async fn default_lease_ttl(&self) -> Duration {
        self.default_lease_ttl
    }

    async fn max_lease_ttl(&self) -> Duration {
        self.max_lease_ttl
    }

    async fn sudo_privilege(&self, _path: &str, _token: &str) -> bool {
        self.sudo_privilege
    }

    async fn tainted(&self) -> bool {
        self.tainted
    }

    async fn caching_disabled(&self) -> bool {
        self.caching_disabled
    }

    async fn replication_state(&self) -> ReplicationState {
        self.replication_state
    }

    async fn response_wrap_data(
        &self,
        _data: &DataMap,
        _ttl: Duration,
        _jwt: bool,
    ) -> Result<ResponseWrapInfo> {
        Err(LogicalError::other("response wrapping is not implemented by a static system view"))
    }

    async fn mlock_enabled(&self) -> bool {
        self.mlock_enabled
    }

    async fn local_mount(&self) -> bool {
        self.local_mount
    }

    async fn lookup_plugin(&self, name: &str) -> Result<PluginRunner> {
        self.plugins
            .get(name)
            .cloned()
            .ok_or_else(|| LogicalError::other(format!("no plugin found with name '{}'", name)))
    }
}
