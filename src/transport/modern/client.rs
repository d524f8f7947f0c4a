//! Host side of the modern transport.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;
use tonic::Status;
use tracing::{debug, Instrument};

use super::proto::backend_client::BackendClient as BackendStub;
use super::proto::{Empty, ErrorReply, InvalidateKeyArgs, RequestArgs, SetupArgs};
use super::resources::serve_resources;
use super::{connect_lazy, status_to_error};
use crate::errors::{Error, Result};
use crate::logical::{
    self, Backend, BackendConfig, BackendType, Context, ExistenceCheck, Logger, LogicalError,
    NoopStorage, Paths, Request, Response, StaticSystemView, StorageView, SystemView,
};
use crate::mux::{Broker, Channel, ServeHandle, BACKEND_STREAM_ID};
use crate::plugin_span;
use crate::rpc::StatusCode;
use crate::transport::protocol::{
    METHOD_CLEANUP, METHOD_HANDLE_EXISTENCE_CHECK, METHOD_HANDLE_REQUEST, METHOD_INITIALIZE,
    METHOD_INVALIDATE_KEY, METHOD_SETUP, METHOD_SPECIAL_PATHS, METHOD_TYPE,
};
use crate::transport::TransportKind;
use crate::translate::{error_from_wire, request_to_wire, response_from_wire};

type Grpc = BackendStub<tonic::transport::Channel>;

struct SetupState {
    logger: Arc<dyn Logger>,
    system: Arc<dyn SystemView>,
    resources: ServeHandle,
}

/// [`Backend`] handle whose calls go to a plugin over the modern transport.
///
/// Calls carry the context deadline and are aborted on the plugin when the
/// context is cancelled.
pub struct BackendClient {
    grpc: Grpc,
    broker: Arc<Broker>,
    metadata_mode: bool,
    max_message_bytes: usize,
    setup: RwLock<Option<SetupState>>,
    special_paths: OnceCell<Option<Paths>>,
    backend_type: OnceCell<BackendType>,
    cleaned_up: AtomicBool,
}

impl BackendClient {
    /// Client for the Backend service on `channel`, the primary broker stream.
    pub fn new(
        channel: Channel,
        broker: Arc<Broker>,
        metadata_mode: bool,
        max_message_bytes: usize,
    ) -> Self {
        let grpc = BackendStub::new(connect_lazy(channel))
            .max_decoding_message_size(max_message_bytes)
            .max_encoding_message_size(max_message_bytes);
        Self {
            grpc,
            broker,
            metadata_mode,
            max_message_bytes,
            setup: RwLock::new(None),
            special_paths: OnceCell::new(),
            backend_type: OnceCell::new(),
            cleaned_up: AtomicBool::new(false),
        }
    }

    pub fn metadata_mode(&self) -> bool {
        self.metadata_mode
    }

    /// One unary call bounded by `ctx`. Dropping the call resets its stream.
    async fn unary<M, T, F, Fut>(&self, ctx: &Context, method: &str, args: M, call: F) -> Result<T>
    where
        F: FnOnce(Grpc, tonic::Request<M>) -> Fut,
        Fut: Future<Output = std::result::Result<tonic::Response<T>, Status>>,
    {
        if self.broker.session().is_closed() {
            return Err(Error::transport(format!("connection closed before {}", method)));
        }
        let mut request = tonic::Request::new(args);
        if let Some(remaining) = ctx.remaining() {
            if remaining.is_zero() {
                return Err(Error::DeadlineExceeded { method: method.to_string() });
            }
            request.set_timeout(remaining);
        }
        if ctx.is_cancelled() {
            return Err(Error::Cancelled { method: method.to_string() });
        }

        tokio::select! {
            result = call(self.grpc.clone(), request) => result
                .map(tonic::Response::into_inner)
                .map_err(|status| status_to_error(method, status)),
            _ = ctx.done() => Err(if ctx.is_cancelled() {
                Error::Cancelled { method: method.to_string() }
            } else {
                Error::DeadlineExceeded { method: method.to_string() }
            }),
        }
    }

    async fn send_request(&self, ctx: &Context, req: Request) -> logical::Result<Option<Response>> {
        let args = RequestArgs { request: request_to_wire(&req)? };
        let reply = self
            .unary(ctx, METHOD_HANDLE_REQUEST, args, |mut c, r| async move {
                c.handle_request(r).await
            })
            .await?;
        if let Some(err) = reply.err {
            return Err(error_from_wire(err));
        }
        Ok(reply.response.map(response_from_wire).transpose()?)
    }

    async fn send_existence_check(&self, ctx: &Context, req: Request) -> logical::Result<ExistenceCheck> {
        let args = RequestArgs { request: request_to_wire(&req)? };
        let reply = self
            .unary(ctx, METHOD_HANDLE_EXISTENCE_CHECK, args, |mut c, r| async move {
                c.handle_existence_check(r).await
            })
            .await?;
        if let Some(err) = reply.err {
            return Err(error_from_wire(err));
        }
        Ok(ExistenceCheck { found: reply.found, exists: reply.exists })
    }

    fn close_resources(&self) {
        if let Ok(state) = self.setup.read() {
            if let Some(state) = state.as_ref() {
                state.resources.close();
            }
        }
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn handle_request(
        &self,
        ctx: &Context,
        req: Request,
    ) -> logical::Result<Option<Response>> {
        if self.metadata_mode {
            return Err(LogicalError::ClientInMetadataMode);
        }
        let span = plugin_span!("handle_request", TransportKind::Modern, path = %req.path);
        self.send_request(ctx, req).instrument(span).await
    }

    async fn handle_existence_check(
        &self,
        ctx: &Context,
        req: Request,
    ) -> logical::Result<ExistenceCheck> {
        if self.metadata_mode {
            return Err(LogicalError::ClientInMetadataMode);
        }
        let span = plugin_span!("handle_existence_check", TransportKind::Modern, path = %req.path);
        self.send_existence_check(ctx, req).instrument(span).await
    }

    async fn special_paths(&self) -> Option<Paths> {
        let fetched = self
            .special_paths
            .get_or_try_init(|| async {
                self.unary(&Context::background(), METHOD_SPECIAL_PATHS, Empty {}, |mut c, r| async move {
                    c.special_paths(r).await
                })
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

    async fn setup(&self, ctx: &Context, config: BackendConfig) -> logical::Result<()> {
        // In metadata mode the plugin must not reach live storage or host state.
        let (storage, system): (StorageView, Arc<dyn SystemView>) = if self.metadata_mode {
            (Arc::new(NoopStorage), Arc::new(StaticSystemView::default()))
        } else {
            (Arc::clone(&config.storage_view), Arc::clone(&config.system))
        };

        let broker_id = self.broker.next_id();
        let resources =
            serve_resources(&self.broker, broker_id, storage, system, self.max_message_bytes);
        if let Ok(mut state) = self.setup.write() {
            if let Some(previous) = state.replace(SetupState {
                logger: config.logger,
                system: config.system,
                resources,
            }) {
                previous.resources.close();
            }
        }

        let args = SetupArgs { broker_id, config: config.config };
        let reply = self
            .unary(ctx, METHOD_SETUP, args, |mut c, r| async move { c.setup(r).await })
            .await?;
        match reply.err {
            Some(err) => Err(error_from_wire(err)),
            None => Ok(()),
        }
    }

    async fn initialize(&self, ctx: &Context) -> logical::Result<()> {
        let result = self
            .unary(ctx, METHOD_INITIALIZE, Empty {}, |mut c, r| async move { c.initialize(r).await })
            .await;
        match result {
            Ok(ErrorReply { err: Some(err) }) => Err(error_from_wire(err)),
            Ok(ErrorReply { err: None }) => Ok(()),
            // Plugins built before Initialize existed do not know the method.
            Err(Error::Rpc { code: StatusCode::UnknownMethod, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn invalidate_key(&self, ctx: &Context, key: &str) {
        if self.metadata_mode {
            return;
        }
        let args = InvalidateKeyArgs { key: key.to_string() };
        let result = self
            .unary(ctx, METHOD_INVALIDATE_KEY, args, |mut c, r| async move {
                c.invalidate_key(r).await
            })
            .await;
        if let Err(e) = result {
            debug!(key, error = %e, "Failed to send key invalidation");
        }
    }

    async fn cleanup(&self, ctx: &Context) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        let result = self
            .unary(ctx, METHOD_CLEANUP, Empty {}, |mut c, r| async move { c.cleanup(r).await })
            .await;
        if let Err(e) = result {
            debug!(error = %e, "Plugin cleanup call failed");
        }
        self.close_resources();
        self.broker.session().close_stream(BACKEND_STREAM_ID);
    }

    async fn backend_type(&self) -> BackendType {
        let fetched = self
            .backend_type
            .get_or_try_init(|| async {
                self.unary(&Context::background(), METHOD_TYPE, Empty {}, |mut c, r| async move {
                    c.backend_type(r).await
                })
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
