//! Plugin side of the legacy transport.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::logical::{
    Backend, BackendConfig, BackendFactory, Context, LogicalError, NoopStorage, StaticSystemView,
    StorageView, SystemView,
};
use crate::mux::Broker;
use crate::rpc::{decode_body, encode_body, RpcClient, RpcStatus, Service, StatusCode};
use crate::shims::{LoggerClient, StorageClient, SystemViewClient};
use crate::transport::protocol::{
    ErrorReply, ExistenceCheckReply, HandleRequestReply, InvalidateKeyArgs, LegacyRequestArgs,
    LegacySetupArgs, SpecialPathsReply, TypeReply, METHOD_CLEANUP, METHOD_HANDLE_EXISTENCE_CHECK,
    METHOD_HANDLE_REQUEST, METHOD_INITIALIZE, METHOD_INVALIDATE_KEY, METHOD_SETUP,
    METHOD_SPECIAL_PATHS, METHOD_TYPE,
};
use crate::translate::{error_to_flat, request_from_wire, response_to_wire, FlatError};

struct ServerState {
    backend: Arc<dyn Backend>,
    shims: Vec<RpcClient>,
}

/// Serves a plugin's backend to the host over the legacy transport.
pub struct BackendServer {
    broker: Arc<Broker>,
    factory: Arc<dyn BackendFactory>,
    metadata_mode: bool,
    state: RwLock<Option<ServerState>>,
}

impl BackendServer {
    pub fn new(broker: Arc<Broker>, factory: Arc<dyn BackendFactory>, metadata_mode: bool) -> Self {
        Self { broker, factory, metadata_mode, state: RwLock::new(None) }
    }

    async fn backend(&self) -> Result<Arc<dyn Backend>, RpcStatus> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| Arc::clone(&s.backend))
            .ok_or_else(|| RpcStatus::new(StatusCode::Unavailable, "backend is not set up"))
    }

    fn dial(&self, id: u32) -> Result<RpcClient, RpcStatus> {
        self.broker
            .dial(id)
            .map(|channel| RpcClient::new(channel))
            .map_err(|e| RpcStatus::new(StatusCode::Unavailable, e.to_string()))
    }

    async fn setup(&self, ctx: Context, body: Value) -> Result<Value, RpcStatus> {
        let args: LegacySetupArgs = decode_body(body)?;
        let logger = self.dial(args.logger_id)?;
        let mut shims = vec![logger.clone()];

        // In metadata mode the backend never reaches host storage or host state.
        let (storage_view, system): (StorageView, Arc<dyn SystemView>) = if self.metadata_mode {
            (Arc::new(NoopStorage), Arc::new(StaticSystemView::default()))
        } else {
            let storage = self.dial(args.storage_id)?;
            let system = self.dial(args.sys_view_id)?;
            shims.push(storage.clone());
            shims.push(system.clone());
            (Arc::new(StorageClient::new(storage)), Arc::new(SystemViewClient::new(system)))
        };

        let config = BackendConfig {
            storage_view,
            logger: Arc::new(LoggerClient::new(logger)),
            system,
            config: args.config,
        };

        let reply = match self.factory.create(ctx, config).await {
            Ok(backend) => {
                *self.state.write().await = Some(ServerState { backend, shims });
                info!(metadata_mode = self.metadata_mode, "Legacy backend set up");
                ErrorReply { err: None }
            }
            Err(e) => {
                shims.iter().for_each(RpcClient::close);
                ErrorReply { err: Some(error_to_flat(&e)) }
            }
        };
        encode_body(&reply)
    }

    async fn handle_request(&self, ctx: Context, body: Value) -> Result<Value, RpcStatus> {
        let args: LegacyRequestArgs = decode_body(body)?;
        let backend = self.backend().await?;
        if self.metadata_mode {
            return encode_body(&HandleRequestReply {
                response: None,
                err: Some(error_to_flat(&LogicalError::ServerInMetadataMode)),
            });
        }

        let storage = StorageClient::new(self.dial(args.storage_id)?);
        let mut req =
            request_from_wire(args.request).map_err(|e| RpcStatus::invalid_argument(e.to_string()))?;
        req.storage = Some(Arc::new(storage.clone()));

        let result = backend.handle_request(&ctx, req).await;
        storage.close();

        let reply: HandleRequestReply<FlatError> = match result {
            Ok(response) => HandleRequestReply {
                response: response
                    .as_ref()
                    .map(response_to_wire)
                    .transpose()
                    .map_err(|e| RpcStatus::internal(e.to_string()))?,
                err: None,
            },
            Err(e) => HandleRequestReply { response: None, err: Some(error_to_flat(&e)) },
        };
        encode_body(&reply)
    }

    async fn handle_existence_check(&self, ctx: Context, body: Value) -> Result<Value, RpcStatus> {
        let args: LegacyRequestArgs = decode_body(body)?;
        let backend = self.backend().await?;
        if self.metadata_mode {
            return encode_body(&ExistenceCheckReply {
                found: false,
                exists: false,
                err: Some(error_to_flat(&LogicalError::ServerInMetadataMode)),
            });
        }

        let storage = StorageClient::new(self.dial(args.storage_id)?);
        let mut req =
            request_from_wire(args.request).map_err(|e| RpcStatus::invalid_argument(e.to_string()))?;
        req.storage = Some(Arc::new(storage.clone()));

        let result = backend.handle_existence_check(&ctx, req).await;
        storage.close();

        let reply: ExistenceCheckReply<FlatError> = match result {
            Ok(check) => ExistenceCheckReply { found: check.found, exists: check.exists, err: None },
            Err(e) => ExistenceCheckReply { found: false, exists: false, err: Some(error_to_flat(&e)) },
        };
        encode_body(&reply)
    }

    async fn cleanup(&self, ctx: Context) -> Result<Value, RpcStatus> {
        let state = self.state.write().await.take();
        if let Some(state) = state {
            state.backend.cleanup(&ctx).await;
            state.shims.iter().for_each(RpcClient::close);
        }
        encode_body(&ErrorReply::<FlatError>::default())
    }
}

#[async_trait]
impl Service for BackendServer {
    fn name(&self) -> &'static str {
        "backend"
    }

    async fn call(&self, ctx: Context, method: &str, body: Value) -> Result<Value, RpcStatus> {
        match method {
            METHOD_SETUP => self.setup(ctx, body).await,
            METHOD_HANDLE_REQUEST => self.handle_request(ctx, body).await,
            METHOD_HANDLE_EXISTENCE_CHECK => self.handle_existence_check(ctx, body).await,
            METHOD_SPECIAL_PATHS => {
                let paths = self.backend().await?.special_paths().await;
                encode_body(&SpecialPathsReply { paths })
            }
            METHOD_TYPE => {
                let backend_type = self.backend().await?.backend_type().await;
                encode_body(&TypeReply { backend_type })
            }
            METHOD_INITIALIZE => {
                let err = self.backend().await?.initialize(&ctx).await.err();
                encode_body(&ErrorReply { err: err.as_ref().map(error_to_flat) })
            }
            METHOD_CLEANUP => self.cleanup(ctx).await,
            other => Err(RpcStatus::unknown_method(other)),
        }
    }

    async fn notify(&self, method: &str, body: Value) {
        if method != METHOD_INVALIDATE_KEY {
            debug!(method, "Ignoring unknown backend notification");
            return;
        }
        if self.metadata_mode {
            return;
        }
        let args: InvalidateKeyArgs = match decode_body(body) {
            Ok(args) => args,
            Err(e) => {
                debug!(error = %e.message, "Malformed invalidation");
                return;
            }
        };
        match self.backend().await {
            Ok(backend) => backend.invalidate_key(&Context::background(), &args.key).await,
            Err(e) => debug!(error = %e.message, "Invalidation before setup"),
        }
    }
}
