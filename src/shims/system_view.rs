//! SystemView proxy and its serving side.
//!
//! The advisory reads fail open: a transport failure logs a warning and
//! returns the zero value. `response_wrap_data` propagates its error, and
//! `lookup_plugin` is refused locally without a round trip.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::logical::{
    self, Context, DataMap, LogicalError, PluginRunner, ReplicationState, ResponseWrapInfo,
    SystemView,
};
use crate::rpc::{answer, decode_body, encode_body, RpcClient, RpcStatus, Service};
use crate::translate::{
    decode_map, encode_map, response_wrap_info_from_wire, response_wrap_info_to_wire,
    WireResponseWrapInfo,
};

pub const METHOD_DEFAULT_LEASE_TTL: &str = "SystemView.DefaultLeaseTTL";
pub const METHOD_MAX_LEASE_TTL: &str = "SystemView.MaxLeaseTTL";
pub const METHOD_SUDO_PRIVILEGE: &str = "SystemView.SudoPrivilege";
pub const METHOD_TAINTED: &str = "SystemView.Tainted";
pub const METHOD_CACHING_DISABLED: &str = "SystemView.CachingDisabled";
pub const METHOD_REPLICATION_STATE: &str = "SystemView.ReplicationState";
pub const METHOD_RESPONSE_WRAP_DATA: &str = "SystemView.ResponseWrapData";
pub const METHOD_MLOCK_ENABLED: &str = "SystemView.MlockEnabled";
pub const METHOD_LOCAL_MOUNT: &str = "SystemView.LocalMount";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TtlReply {
    pub ttl: Duration,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FlagReply {
    pub value: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SudoArgs {
    pub path: String,
    pub token: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReplicationStateReply {
    pub state: ReplicationState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WrapArgs {
    pub data: String,
    pub ttl: Duration,
    pub jwt: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WrapReply {
    #[serde(default)]
    pub wrap_info: Option<WireResponseWrapInfo>,
    #[serde(default)]
    pub err: String,
}

impl WrapReply {
    /// The wrap info, or the error the host reported.
    pub fn into_result(self) -> logical::Result<ResponseWrapInfo> {
        if !self.err.is_empty() {
            return Err(LogicalError::from_message(self.err));
        }
        self.wrap_info
            .map(response_wrap_info_from_wire)
            .ok_or_else(|| LogicalError::other("response wrapping returned no wrap info"))
    }
}

#[derive(Clone)]
pub struct SystemViewClient {
    rpc: RpcClient,
}

impl SystemViewClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn close(&self) {
        self.rpc.close();
    }

    async fn advisory<Req, Resp>(&self, method: &str, args: &Req) -> Resp
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de> + Default,
    {
        match self.rpc.call(method, args).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(method, error = %e, "System view query failed; using default");
                Resp::default()
            }
        }
    }
}

#[async_trait]
impl SystemView for SystemViewClient {
    async fn default_lease_ttl(&self) -> Duration {
        self.advisory::<_, TtlReply>(METHOD_DEFAULT_LEASE_TTL, &()).await.ttl
    }

    async fn max_lease_ttl(&self) -> Duration {
        self.advisory::<_, TtlReply>(METHOD_MAX_LEASE_TTL, &()).await.ttl
    }

    async fn sudo_privilege(&self, path: &str, token: &str) -> bool {
        let args = SudoArgs { path: path.to_string(), token: token.to_string() };
        self.advisory::<_, FlagReply>(METHOD_SUDO_PRIVILEGE, &args).await.value
    }

    async fn tainted(&self) -> bool {
        self.advisory::<_, FlagReply>(METHOD_TAINTED, &()).await.value
    }

    async fn caching_disabled(&self) -> bool {
        self.advisory::<_, FlagReply>(METHOD_CACHING_DISABLED, &()).await.value
    }

    async fn replication_state(&self) -> ReplicationState {
        self.advisory::<_, ReplicationStateReply>(METHOD_REPLICATION_STATE, &()).await.state
    }

    async fn response_wrap_data(
        &self,
        data: &DataMap,
        ttl: Duration,
        jwt: bool,
    ) -> logical::Result<ResponseWrapInfo> {
        let args = WrapArgs { data: encode_map(Some(data))?, ttl, jwt };
        let reply: WrapReply =
            self.rpc.call(METHOD_RESPONSE_WRAP_DATA, &args).await?;
        reply.into_result()
    }

    async fn mlock_enabled(&self) -> bool {
        self.advisory::<_, FlagReply>(METHOD_MLOCK_ENABLED, &()).await.value
    }

    async fn local_mount(&self) -> bool {
        self.advisory::<_, FlagReply>(METHOD_LOCAL_MOUNT, &()).await.value
    }

    async fn lookup_plugin(&self, _name: &str) -> logical::Result<PluginRunner> {
        Err(LogicalError::LookupPluginUnsupported)
    }
}

/// Serves a local [`SystemView`] to the peer process.
pub struct SystemViewServer {
    system: Arc<dyn SystemView>,
}

impl SystemViewServer {
    pub fn new(system: Arc<dyn SystemView>) -> Self {
        Self { system }
    }

    /// Handle a `SystemView.*` method; `None` when the method is not ours.
    pub async fn dispatch(&self, method: &str, body: Value) -> Option<Result<Value, RpcStatus>> {
        let result = match method {
            METHOD_DEFAULT_LEASE_TTL => encode_body(&self.default_lease_ttl().await),
            METHOD_MAX_LEASE_TTL => encode_body(&self.max_lease_ttl().await),
            METHOD_SUDO_PRIVILEGE => answer(body, |args| self.sudo_privilege(args)).await,
            METHOD_TAINTED => encode_body(&self.tainted().await),
            METHOD_CACHING_DISABLED => encode_body(&self.caching_disabled().await),
            METHOD_REPLICATION_STATE => encode_body(&self.replication_state().await),
            METHOD_RESPONSE_WRAP_DATA => match decode_body(body) {
                Ok(args) => match self.response_wrap_data(args).await {
                    Ok(reply) => encode_body(&reply),
                    Err(status) => Err(status),
                },
                Err(status) => Err(status),
            },
            METHOD_MLOCK_ENABLED => encode_body(&self.mlock_enabled().await),
            METHOD_LOCAL_MOUNT => encode_body(&self.local_mount().await),
            _ => return None,
        };
        Some(result)
    }

    pub async fn default_lease_ttl(&self) -> TtlReply {
        TtlReply { ttl: self.system.default_lease_ttl().await }
    }

    pub async fn max_lease_ttl(&self) -> TtlReply {
        TtlReply { ttl: self.system.max_lease_ttl().await }
    }

    pub async fn sudo_privilege(&self, args: SudoArgs) -> FlagReply {
        FlagReply { value: self.system.sudo_privilege(&args.path, &args.token).await }
    }

    pub async fn tainted(&self) -> FlagReply {
        FlagReply { value: self.system.tainted().await }
    }

    pub async fn caching_disabled(&self) -> FlagReply {
        FlagReply { value: self.system.caching_disabled().await }
    }

    pub async fn replication_state(&self) -> ReplicationStateReply {
        ReplicationStateReply { state: self.system.replication_state().await }
    }

    pub async fn mlock_enabled(&self) -> FlagReply {
        FlagReply { value: self.system.mlock_enabled().await }
    }

    pub async fn local_mount(&self) -> FlagReply {
        FlagReply { value: self.system.local_mount().await }
    }

    /// Wrapping failures travel in the reply; only undecodable data is refused.
    pub async fn response_wrap_data(&self, args: WrapArgs) -> Result<WrapReply, RpcStatus> {
        let data = decode_map(&args.data)
            .map_err(|e| RpcStatus::invalid_argument(e.to_string()))?
            .unwrap_or_default();
        let reply = match self.system.response_wrap_data(&data, args.ttl, args.jwt).await {
            Ok(info) => {
                WrapReply { wrap_info: Some(response_wrap_info_to_wire(&info)), err: String::new() }
            }
            Err(e) => WrapReply { wrap_info: None, err: e.to_string() },
        };
        Ok(reply)
    }
}

#[async_trait]
impl Service for SystemViewServer {
    fn name(&self) -> &'static str {
        "system_view"
    }

    async fn call(&self, _ctx: Context, method: &str, body: Value) -> Result<Value, RpcStatus> {
        self.dispatch(method, body).await.unwrap_or_else(|| Err(RpcStatus::unknown_method(method)))
    }
}
