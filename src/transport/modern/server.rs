//! Plugin side of the modern transport.

use std::sync::Arc;
use tokio::sync::RwLock;
use tonic::transport::Server;
use tonic::{Request as GrpcRequest, Response as GrpcResponse, Status};
use tracing::{debug, info, Instrument};

use super::proto::backend_server::{self, BackendServer as BackendService};
use super::proto::{
    Empty, ErrorReply, ExistenceCheckReply, HandleRequestReply, InvalidateKeyArgs, RequestArgs,
    SetupArgs, SpecialPathsReply, TypeReply,
};
use super::resources::resource_clients;
use super::{request_context, single_connection, stream_ended, within};
use crate::errors::{Error, Result};
use crate::logical::{
    Backend, BackendConfig, BackendFactory, Context, LogicalError, NoopStorage, Request,
    StaticSystemView, StorageView, SystemView, TracingLogger,
};
use crate::mux::{Broker, Channel};
use crate::observability::GrpcTracingLayer;
use crate::translate::{error_to_wire, request_from_wire, response_to_wire};

struct ServerState {
    backend: Arc<dyn Backend>,
    storage: StorageView,
    resources: Option<u32>,
}

/// Serves a plugin's backend to the host over the modern transport.
pub struct BackendServer {
    broker: Arc<Broker>,
    factory: Arc<dyn BackendFactory>,
    metadata_mode: bool,
    max_message_bytes: usize,
    state: RwLock<Option<ServerState>>,
}

impl BackendServer {
    pub fn new(
        broker: Arc<Broker>,
        factory: Arc<dyn BackendFactory>,
        metadata_mode: bool,
        max_message_bytes: usize,
    ) -> Self {
        Self { broker, factory, metadata_mode, max_message_bytes, state: RwLock::new(None) }
    }

    async fn backend(&self) -> std::result::Result<(Arc<dyn Backend>, StorageView), Status> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| (Arc::clone(&s.backend), Arc::clone(&s.storage)))
            .ok_or_else(|| Status::failed_precondition("backend is not set up"))
    }

    fn request(&self, args: RequestArgs, storage: StorageView) -> std::result::Result<Request, Status> {
        let mut req =
            request_from_wire(args.request).map_err(|e| Status::invalid_argument(e.to_string()))?;
        req.storage = Some(storage);
        Ok(req)
    }

    fn close_resources(&self, resources: Option<u32>) {
        if let Some(id) = resources {
            self.broker.session().close_stream(id);
        }
    }

    async fn run_setup(&self, ctx: Context, args: SetupArgs) -> ErrorReply {
        // In metadata mode the host serves nothing worth reaching.
        let (storage, system, resources): (StorageView, Arc<dyn SystemView>, Option<u32>) =
            if self.metadata_mode {
                (Arc::new(NoopStorage), Arc::new(StaticSystemView::default()), None)
            } else {
                match self.broker.dial(args.broker_id) {
                    Ok(channel) => {
                        let (storage, system) = resource_clients(channel, self.max_message_bytes);
                        (Arc::new(storage), Arc::new(system), Some(args.broker_id))
                    }
                    Err(e) => {
                        return ErrorReply {
                            err: Some(error_to_wire(&LogicalError::Transport(e.to_string()))),
                        }
                    }
                }
            };

        let config = BackendConfig {
            storage_view: Arc::clone(&storage),
            logger: Arc::new(TracingLogger::default()),
            system,
            config: args.config,
        };
        match self.factory.create(ctx, config).await {
            Ok(backend) => {
                let previous =
                    self.state.write().await.replace(ServerState { backend, storage, resources });
                if let Some(previous) = previous {
                    self.close_resources(previous.resources);
                }
                info!(metadata_mode = self.metadata_mode, "Modern backend set up");
                ErrorReply { err: None }
            }
            Err(e) => {
                self.close_resources(resources);
                ErrorReply { err: Some(error_to_wire(&e)) }
            }
        }
    }
}

#[tonic::async_trait]
impl backend_server::Backend for BackendServer {
    async fn setup(
        &self,
        request: GrpcRequest<SetupArgs>,
    ) -> std::result::Result<GrpcResponse<ErrorReply>, Status> {
        let ctx = request_context(&request);
        let args = request.into_inner();
        let reply = within(&ctx, async { Ok::<_, Status>(self.run_setup(ctx.clone(), args).await) })
            .await?;
        Ok(GrpcResponse::new(reply))
    }

    async fn handle_request(
        &self,
        request: GrpcRequest<RequestArgs>,
    ) -> std::result::Result<GrpcResponse<HandleRequestReply>, Status> {
        let ctx = request_context(&request);
        let (backend, storage) = self.backend().await?;
        if self.metadata_mode {
            return Ok(GrpcResponse::new(HandleRequestReply {
                response: None,
                err: Some(error_to_wire(&LogicalError::ServerInMetadataMode)),
            }));
        }

        let req = self.request(request.into_inner(), storage)?;
        let result = within(&ctx, async { Ok::<_, Status>(backend.handle_request(&ctx, req).await) })
            .await?;
        let reply = match result {
            Ok(response) => HandleRequestReply {
                response: response
                    .as_ref()
                    .map(response_to_wire)
                    .transpose()
                    .map_err(|e| Status::internal(e.to_string()))?,
                err: None,
            },
            Err(e) => HandleRequestReply { response: None, err: Some(error_to_wire(&e)) },
        };
        Ok(GrpcResponse::new(reply))
    }

    async fn handle_existence_check(
        &self,
        request: GrpcRequest<RequestArgs>,
    ) -> std::result::Result<GrpcResponse<ExistenceCheckReply>, Status> {
        let ctx = request_context(&request);
        let (backend, storage) = self.backend().await?;
        if self.metadata_mode {
            return Ok(GrpcResponse::new(ExistenceCheckReply {
                found: false,
                exists: false,
                err: Some(error_to_wire(&LogicalError::ServerInMetadataMode)),
            }));
        }

        let req = self.request(request.into_inner(), storage)?;
        let result = within(&ctx, async {
            Ok::<_, Status>(backend.handle_existence_check(&ctx, req).await)
        })
        .await?;
        let reply = match result {
            Ok(check) => ExistenceCheckReply { found: check.found, exists: check.exists, err: None },
            Err(e) => ExistenceCheckReply { found: false, exists: false, err: Some(error_to_wire(&e)) },
        };
        Ok(GrpcResponse::new(reply))
    }

    async fn special_paths(
        &self,
        _: GrpcRequest<Empty>,
    ) -> std::result::Result<GrpcResponse<SpecialPathsReply>, Status> {
        let paths = self.backend().await?.0.special_paths().await;
        Ok(GrpcResponse::new(SpecialPathsReply { paths }))
    }

    async fn backend_type(
        &self,
        _: GrpcRequest<Empty>,
    ) -> std::result::Result<GrpcResponse<TypeReply>, Status> {
        let backend_type = self.backend().await?.0.backend_type().await;
        Ok(GrpcResponse::new(TypeReply { backend_type }))
    }

    async fn initialize(
        &self,
        request: GrpcRequest<Empty>,
    ) -> std::result::Result<GrpcResponse<ErrorReply>, Status> {
        let ctx = request_context(&request);
        let backend = self.backend().await?.0;
        let err = within(&ctx, async { Ok::<_, Status>(backend.initialize(&ctx).await.err()) }).await?;
        Ok(GrpcResponse::new(ErrorReply { err: err.as_ref().map(error_to_wire) }))
    }

    async fn invalidate_key(
        &self,
        request: GrpcRequest<InvalidateKeyArgs>,
    ) -> std::result::Result<GrpcResponse<Empty>, Status> {
        if self.metadata_mode {
            return Ok(GrpcResponse::new(Empty {}));
        }
        let ctx = request_context(&request);
        let args = request.into_inner();
        match self.backend().await {
            Ok((backend, _)) => backend.invalidate_key(&ctx, &args.key).await,
            Err(_) => debug!(key = %args.key, "Invalidation before setup"),
        }
        Ok(GrpcResponse::new(Empty {}))
    }

    async fn cleanup(
        &self,
        request: GrpcRequest<Empty>,
    ) -> std::result::Result<GrpcResponse<ErrorReply>, Status> {
        let ctx = request_context(&request);
        let state = self.state.write().await.take();
        if let Some(state) = state {
            state.backend.cleanup(&ctx).await;
            self.close_resources(state.resources);
        }
        Ok(GrpcResponse::new(ErrorReply { err: None }))
    }
}

/// Serve `server` on the primary broker stream until the host closes it.
pub async fn serve(server: BackendServer, channel: Channel) -> Result<()> {
    let limit = server.max_message_bytes;
    let id = channel.id();
    let service = BackendService::new(server)
        .max_decoding_message_size(limit)
        .max_encoding_message_size(limit);
    let (io, ended) = channel.into_io();
    Server::builder()
        .layer(GrpcTracingLayer::new())
        .add_service(service)
        .serve_with_incoming_shutdown(single_connection(io), stream_ended(ended))
        .instrument(tracing::debug_span!("backend_service", stream_id = id))
        .await
        .map_err(|e| Error::transport(format!("backend service failed: {}", e)))
}
