//! Storage and SystemView over gRPC.
//!
//! The host serves both services on one broker stream it accepts during
//! setup; the plugin dials that stream and wraps the generated stubs in the
//! logical [`Storage`] and [`SystemView`] traits.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, warn, Instrument};

use super::proto::{
    storage_client::StorageClient, storage_server, system_view_client::SystemViewClient,
    system_view_server, Empty, ErrReply, FlagReply, GetReply, KeyArgs, ListArgs, ListReply,
    PutArgs, ReplicationStateReply, SudoArgs, TtlReply, WrapArgs, WrapReply,
};
use super::{connect_lazy, single_connection, status_to_error, stream_ended};
use crate::broker_span;
use crate::logical::{
    self, DataMap, LogicalError, PluginRunner, ReplicationState, ResponseWrapInfo, Storage,
    StorageEntry, SystemView,
};
use crate::mux::{Broker, Channel, ServeHandle};
use crate::observability::GrpcTracingLayer;
use crate::shims::storage::check;
use crate::shims::{StorageServer, SystemViewServer};
use crate::translate::{encode_map, storage_entry_from_wire, storage_entry_to_wire};

/// Host storage answered over gRPC.
pub struct StorageService {
    inner: StorageServer,
}

impl StorageService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { inner: StorageServer::new(storage) }
    }
}

#[tonic::async_trait]
impl storage_server::Storage for StorageService {
    async fn list(&self, request: Request<ListArgs>) -> Result<Response<ListReply>, Status> {
        Ok(Response::new(self.inner.list(request.into_inner()).await))
    }

    async fn get(&self, request: Request<KeyArgs>) -> Result<Response<GetReply>, Status> {
        Ok(Response::new(self.inner.get(request.into_inner()).await))
    }

    async fn put(&self, request: Request<PutArgs>) -> Result<Response<ErrReply>, Status> {
        Ok(Response::new(self.inner.put(request.into_inner()).await))
    }

    async fn delete(&self, request: Request<KeyArgs>) -> Result<Response<ErrReply>, Status> {
        Ok(Response::new(self.inner.delete(request.into_inner()).await))
    }
}

/// Host system view answered over gRPC.
pub struct SystemViewService {
    inner: SystemViewServer,
}

impl SystemViewService {
    pub fn new(system: Arc<dyn SystemView>) -> Self {
        Self { inner: SystemViewServer::new(system) }
    }
}

#[tonic::async_trait]
impl system_view_server::SystemView for SystemViewService {
    async fn default_lease_ttl(&self, _: Request<Empty>) -> Result<Response<TtlReply>, Status> {
        Ok(Response::new(self.inner.default_lease_ttl().await))
    }

    async fn max_lease_ttl(&self, _: Request<Empty>) -> Result<Response<TtlReply>, Status> {
        Ok(Response::new(self.inner.max_lease_ttl().await))
    }

    async fn sudo_privilege(&self, request: Request<SudoArgs>) -> Result<Response<FlagReply>, Status> {
        Ok(Response::new(self.inner.sudo_privilege(request.into_inner()).await))
    }

    async fn tainted(&self, _: Request<Empty>) -> Result<Response<FlagReply>, Status> {
        Ok(Response::new(self.inner.tainted().await))
    }

    async fn caching_disabled(&self, _: Request<Empty>) -> Result<Response<FlagReply>, Status> {
        Ok(Response::new(self.inner.caching_disabled().await))
    }

    async fn replication_state(
        &self,
        _: Request<Empty>,
    ) -> Result<Response<ReplicationStateReply>, Status> {
        Ok(Response::new(self.inner.replication_state().await))
    }

    async fn response_wrap_data(
        &self,
        request: Request<WrapArgs>,
    ) -> Result<Response<WrapReply>, Status> {
        self.inner
            .response_wrap_data(request.into_inner())
            .await
            .map(Response::new)
            .map_err(|status| Status::invalid_argument(status.message))
    }

    async fn mlock_enabled(&self, _: Request<Empty>) -> Result<Response<FlagReply>, Status> {
        Ok(Response::new(self.inner.mlock_enabled().await))
    }

    async fn local_mount(&self, _: Request<Empty>) -> Result<Response<FlagReply>, Status> {
        Ok(Response::new(self.inner.local_mount().await))
    }
}

/// Accept the plugin on broker stream `id` and serve `storage` and `system`
/// on it until the stream ends.
pub fn serve_resources(
    broker: &Broker,
    id: u32,
    storage: Arc<dyn Storage>,
    system: Arc<dyn SystemView>,
    max_message_bytes: usize,
) -> ServeHandle {
    let session = broker.session().clone();
    let serving = session.clone();
    let storage = storage_server::StorageServer::new(StorageService::new(storage))
        .max_decoding_message_size(max_message_bytes)
        .max_encoding_message_size(max_message_bytes);
    let system = system_view_server::SystemViewServer::new(SystemViewService::new(system))
        .max_decoding_message_size(max_message_bytes)
        .max_encoding_message_size(max_message_bytes);

    let task = tokio::spawn(
        async move {
            let channel = match serving.accept(id).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(error = %e, "Broker stream was never dialed");
                    return;
                }
            };
            debug!("Broker stream accepted");
            let (io, ended) = channel.into_io();
            let served = Server::builder()
                .layer(GrpcTracingLayer::new())
                .add_service(storage)
                .add_service(system)
                .serve_with_incoming_shutdown(single_connection(io), stream_ended(ended))
                .await;
            match served {
                Ok(()) => debug!("Broker stream finished"),
                Err(e) => debug!(error = %e, "Resource server stopped"),
            }
        }
        .instrument(broker_span!(id, "storage+system_view")),
    );
    ServeHandle::new(id, session, task)
}

/// Stubs for the host's resources on a dialed broker stream.
pub fn resource_clients(
    channel: Channel,
    max_message_bytes: usize,
) -> (GrpcStorage, GrpcSystemView) {
    let grpc = connect_lazy(channel);
    let storage = StorageClient::new(grpc.clone())
        .max_decoding_message_size(max_message_bytes)
        .max_encoding_message_size(max_message_bytes);
    let system = SystemViewClient::new(grpc)
        .max_decoding_message_size(max_message_bytes)
        .max_encoding_message_size(max_message_bytes);
    (GrpcStorage { client: storage }, GrpcSystemView { client: system })
}

/// [`Storage`] backed by the host over gRPC.
#[derive(Clone)]
pub struct GrpcStorage {
    client: StorageClient<tonic::transport::Channel>,
}

#[async_trait]
impl Storage for GrpcStorage {
    async fn list(&self, prefix: &str) -> logical::Result<Vec<String>> {
        let args = ListArgs { prefix: prefix.to_string() };
        let reply = self
            .client
            .clone()
            .list(args)
            .await
            .map_err(|s| status_to_error("Storage.List", s))?
            .into_inner();
        check(reply.err)?;
        Ok(reply.keys)
    }

    async fn get(&self, key: &str) -> logical::Result<Option<StorageEntry>> {
        let args = KeyArgs { key: key.to_string() };
        let reply = self
            .client
            .clone()
            .get(args)
            .await
            .map_err(|s| status_to_error("Storage.Get", s))?
            .into_inner();
        check(reply.err)?;
        Ok(reply.entry.map(storage_entry_from_wire))
    }

    async fn put(&self, entry: &StorageEntry) -> logical::Result<()> {
        let args = PutArgs { entry: storage_entry_to_wire(entry) };
        let reply = self
            .client
            .clone()
            .put(args)
            .await
            .map_err(|s| status_to_error("Storage.Put", s))?
            .into_inner();
        check(reply.err)
    }

    async fn delete(&self, key: &str) -> logical::Result<()> {
        let args = KeyArgs { key: key.to_string() };
        let reply = self
            .client
            .clone()
            .delete(args)
            .await
            .map_err(|s| status_to_error("Storage.Delete", s))?
            .into_inner();
        check(reply.err)
    }
}

/// [`SystemView`] backed by the host over gRPC.
///
/// Advisory reads fail open with a warning and the zero value.
#[derive(Clone)]
pub struct GrpcSystemView {
    client: SystemViewClient<tonic::transport::Channel>,
}

impl GrpcSystemView {
    fn advisory<T: Default>(method: &str, result: Result<Response<T>, Status>) -> T {
        match result {
            Ok(reply) => reply.into_inner(),
            Err(status) => {
                warn!(method, error = %status.message(), "System view query failed; using default");
                T::default()
            }
        }
    }
}

#[async_trait]
impl SystemView for GrpcSystemView {
    async fn default_lease_ttl(&self) -> Duration {
        let result = self.client.clone().default_lease_ttl(Empty {}).await;
        Self::advisory("SystemView.DefaultLeaseTTL", result).ttl
    }

    async fn max_lease_ttl(&self) -> Duration {
        let result = self.client.clone().max_lease_ttl(Empty {}).await;
        Self::advisory("SystemView.MaxLeaseTTL", result).ttl
    }

    async fn sudo_privilege(&self, path: &str, token: &str) -> bool {
        let args = SudoArgs { path: path.to_string(), token: token.to_string() };
        let result = self.client.clone().sudo_privilege(args).await;
        Self::advisory("SystemView.SudoPrivilege", result).value
    }

    async fn tainted(&self) -> bool {
        let result = self.client.clone().tainted(Empty {}).await;
        Self::advisory("SystemView.Tainted", result).value
    }

    async fn caching_disabled(&self) -> bool {
        let result = self.client.clone().caching_disabled(Empty {}).await;
        Self::advisory("SystemView.CachingDisabled", result).value
    }

    async fn replication_state(&self) -> ReplicationState {
        let result = self.client.clone().replication_state(Empty {}).await;
        Self::advisory("SystemView.ReplicationState", result).state
    }

    async fn response_wrap_data(
        &self,
        data: &DataMap,
        ttl: Duration,
        jwt: bool,
    ) -> logical::Result<ResponseWrapInfo> {
        let args = WrapArgs { data: encode_map(Some(data))?, ttl, jwt };
        let reply = self
            .client
            .clone()
            .response_wrap_data(args)
            .await
            .map_err(|s| status_to_error("SystemView.ResponseWrapData", s))?;
        reply.into_inner().into_result()
    }

    async fn mlock_enabled(&self) -> bool {
        let result = self.client.clone().mlock_enabled(Empty {}).await;
        Self::advisory("SystemView.MlockEnabled", result).value
    }

    async fn local_mount(&self) -> bool {
        let result = self.client.clone().local_mount(Empty {}).await;
        Self::advisory("SystemView.LocalMount", result).value
    }

    async fn lookup_plugin(&self, _name: &str) -> logical::Result<PluginRunner> {
        Err(LogicalError::LookupPluginUnsupported)
    }
}
