//! Host side of the legacy transport.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, Instrument};

use crate::logical::{
    self, Backend, BackendConfig, BackendType, Context, ExistenceCheck, Logger, NoopStorage,
    Paths, Request, Response, StaticSystemView, StorageView, SystemView,
};
use crate::mux::{Broker, ServeHandle};
use crate::plugin_span;
use crate::rpc::RpcClient;
use crate::shims::{LoggerServer, StorageServer, SystemViewServer};
use crate::transport::protocol::{
    ErrorReply, ExistenceCheckReply, HandleRequestReply, InvalidateKeyArgs, LegacyRequestArgs,
    LegacySetupArgs, SpecialPathsReply, TypeReply, METHOD_CLEANUP, METHOD_HANDLE_EXISTENCE_CHECK,
    METHOD_HANDLE_REQUEST, METHOD_INVALIDATE_KEY, METHOD_SETUP, METHOD_SPECIAL_PATHS, METHOD_TYPE,
};
use crate::transport::TransportKind;
use crate::translate::{error_from_flat, request_to_wire, response_from_wire, FlatError};

struct SetupState {
    storage: StorageView,
    logger: Arc<dyn Logger>,
    system: Arc<dyn SystemView>,
    handles: Vec<ServeHandle>,
}

/// [`Backend`] handle whose calls go to a plugin over the legacy transport.
///
/// Every request gets its own storage stream bound to the request's storage
/// view, so concurrent requests never share storage. The protocol carries no
/// deadlines, so a call runs to completion once sent.
pub struct BackendClient {
    rpc: RpcClient,
    broker: Arc<Broker>,
    metadata_mode: bool,
    setup: RwLock<Option<SetupState>>,
    special_paths: OnceCell<Option<Paths>>,
    backend_type: OnceCell<BackendType>,
    cleaned_up: AtomicBool,
}

impl BackendClient {
    pub fn new(rpc: RpcClient, broker: Arc<Broker>, metadata_mode: bool) -> Self {
        Self {
            rpc,
            broker,
            metadata_mode,
            setup: RwLock::new(None),
            special_paths: OnceCell::new(),
            backend_type: OnceCell::new(),
            cleaned_up: AtomicBool::new(false),
        }
    }

    pub fn metadata_mode(&self) -> bool {
        self.metadata_mode
    }

    fn setup_storage(&self) -> Option<StorageView> {
        self.setup.read().ok()?.as_ref().map(|s| Arc::clone(&s.storage))
    }

    /// Serve `storage` on a fresh broker stream for the duration of one call.
    fn serve_request_storage(&self, req: &Request) -> ServeHandle {
        let storage = req
            .storage
            .clone()
            .or_else(|| self.setup_storage())
            .unwrap_or_else(|| Arc::new(NoopStorage));
        let id = self.broker.next_id();
        self.broker.accept_and_serve(
            id,
            Arc::new(StorageServer::new(storage)),
        )
    }

    async fn send_request(&self, req: Request) -> logical::Result<Option<Response>> {
        let request = request_to_wire(&req)?;
        let storage = self.serve_request_storage(&req);
        let args = LegacyRequestArgs { storage_id: storage.id(), request };
        let result = self
            .rpc
            .call::<_, HandleRequestReply<FlatError>>(METHOD_HANDLE_REQUEST, &args)
            .await;
        storage.close();

        let reply = result?;
        if let Some(err) = reply.err {
            return Err(error_from_flat(err));
        }
        Ok(reply.response.map(response_from_wire).transpose()?)
    }

    async fn send_existence_check(&self, req: Request) -> logical::Result<ExistenceCheck> {
        let request = request_to_wire(&req)?;
        let storage = self.serve_request_storage(&req);
        let args = LegacyRequestArgs { storage_id: storage.id(), request };
        let result = self
            .rpc
            .call::<_, ExistenceCheckReply<FlatError>>(METHOD_HANDLE_EXISTENCE_CHECK, &args)
            .await;
        storage.close();

        let reply = result?;
        if let Some(err) = reply.err {
            return Err(error_from_flat(err));
        }
        Ok(ExistenceCheck { found: reply.found, exists: reply.exists })
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn handle_request(
        &self,
        _ctx: &Context,
        req: Request,
    ) -> logical::Result<Option<Response>> {
        if self.metadata_mode {
            return Err(logical::LogicalError::ClientInMetadataMode);
        }

        let span = plugin_span!("handle_request", TransportKind::Legacy, path = %req.path);
        self.send_request(req).instrument(span).await
    }

    async fn handle_existence_check(
        &self,
        _ctx: &Context,
        req: Request,
    ) -> logical::Result<ExistenceCheck> {
        if self.metadata_mode {
            return Err(logical::LogicalError::ClientInMetadataMode);
        }

        let span = plugin_span!("handle_existence_check", TransportKind::Legacy, path = %req.path);
        self.send_existence_check(req).instrument(span).await
    }

    async fn special_paths(&self) -> Option<Paths> {
        let fetched = self
            .special_paths
            .get_or_try_init(|| async {
                self.rpc
                    .call::<_, SpecialPathsReply>(METHOD_SPECIAL_PATHS, &())
                    .await
                    .map(|reply| reply.paths)
            })
            .await;
        match fetched {
            Ok(paths) => paths.clone(),
            Err(e) => {
                debug!(error = %e, "Failed to fetch special paths");
                None
            }
        }
    }

    fn system(&self) -> Option<Arc<dyn SystemView>> {
        self.setup.read().ok()?.as_ref().map(|s| Arc::clone(&s.system))
    }

    fn logger(&self) -> Option<Arc<dyn Logger>> {
        self.setup.read().ok()?.as_ref().map(|s| Arc::clone(&s.logger))
    }

    async fn setup(&self, _ctx: &Context, config: BackendConfig) -> logical::Result<()> {
        let (storage, system): (StorageView, Arc<dyn SystemView>) = if self.metadata_mode {
            (Arc::new(NoopStorage), Arc::new(StaticSystemView::default()))
        } else {
            (Arc::clone(&config.storage_view), Arc::clone(&config.system))
        };

        let storage_id = self.broker.next_id();
        let logger_id = self.broker.next_id();
        let sys_view_id = self.broker.next_id();
        let handles = vec![
            self.broker.accept_and_serve(
                storage_id,
                Arc::new(StorageServer::new(Arc::clone(&storage))),
            ),
            self.broker.accept_and_serve(
                logger_id,
                Arc::new(LoggerServer::new(Arc::clone(&config.logger))),
            ),
            self.broker.accept_and_serve(
                sys_view_id,
                Arc::new(SystemViewServer::new(Arc::clone(&system))),
            ),
        ];

        // Recorded before the call so cleanup can stop the streams after a
        // failed setup.
        if let Ok(mut state) = self.setup.write() {
            *state = Some(SetupState {
                storage,
                logger: config.logger,
                system: config.system,
                handles,
            });
        }

        let args = LegacySetupArgs { storage_id, logger_id, sys_view_id, config: config.config };
        let reply: ErrorReply<FlatError> = self.rpc.call(METHOD_SETUP, &args).await?;
        match reply.err {
            Some(err) => Err(error_from_flat(err)),
            None => Ok(()),
        }
    }

    async fn invalidate_key(&self, _ctx: &Context, key: &str) {
        if self.metadata_mode {
            return;
        }
        let args = InvalidateKeyArgs { key: key.to_string() };
        if let Err(e) = self.rpc.notify(METHOD_INVALIDATE_KEY, &args) {
            debug!(key, error = %e, "Failed to send key invalidation");
        }
    }

    async fn cleanup(&self, _ctx: &Context) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.rpc.call::<_, ErrorReply<FlatError>>(METHOD_CLEANUP, &()).await {
            debug!(error = %e, "Plugin cleanup call failed");
        }
        if let Ok(state) = self.setup.read() {
            if let Some(state) = state.as_ref() {
                state.handles.iter().for_each(ServeHandle::close);
            }
        }
        self.rpc.close();
    }

    async fn backend_type(&self) -> BackendType {
        let fetched = self
            .backend_type
            .get_or_try_init(|| async {
                self.rpc
                    .call::<_, TypeReply>(METHOD_TYPE, &())
                    .await
                    .map(|reply| reply.backend_type)
            })
            .await;
        match fetched {
            Ok(backend_type) => *backend_type,
            Err(e) => {
                debug!(error = %e, "Failed to fetch backend type");
                BackendType::Unknown
            }
        }
    }
}
