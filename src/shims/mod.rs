//! # Resource Shims
//!
//! Proxies that let a plugin use the host's [`Storage`](crate::logical::Storage),
//! [`Logger`](crate::logical::Logger) and [`SystemView`](crate::logical::SystemView)
//! as if they were local, together with the services that answer them on the
//! host. Each proxy owns the RPC client of the stream it was built on. The
//! serving halves expose one typed method per call, which the modern
//! transport's gRPC services reuse.

pub mod logger;
pub mod storage;
pub mod system_view;

pub use logger::{LoggerClient, LoggerServer};
pub use storage::{StorageClient, StorageServer};
pub use system_view::{SystemViewClient, SystemViewServer};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MuxConfig;
    use crate::logical::{
        DataMap, InmemStorage, LogLevel, Logger, LogicalError, ReplicationState, StaticSystemView,
        Storage, StorageEntry, SystemView, TracingLogger,
    };
    use crate::mux::Session;
    use crate::rpc::{serve, RpcClient, Service};
    use std::sync::Arc;
    use std::time::Duration;

    fn link(service: Arc<dyn Service>) -> (RpcClient, Session) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let config = MuxConfig::default();
        let host = Session::new(a, &config);
        let plugin = Session::new(b, &config);
        tokio::spawn(async move {
            if let Ok(channel) = host.accept(1).await {
                serve(channel, service).await;
            }
        });
        (RpcClient::new(plugin.open(1).unwrap()), plugin)
    }

    #[tokio::test]
    async fn test_storage_proxy_matches_local_semantics() {
        let backing = Arc::new(InmemStorage::new());
        let (rpc, _session) = link(Arc::new(StorageServer::new(backing.clone())));
        let storage = StorageClient::new(rpc);

        assert_eq!(storage.get("missing").await.unwrap(), None);
        let entry = StorageEntry { key: "a/b".into(), value: vec![0, 1, 255], seal_wrap: true };
        storage.put(&entry).await.unwrap();
        assert_eq!(storage.get("a/b").await.unwrap(), Some(entry.clone()));
        assert_eq!(backing.get("a/b").await.unwrap(), Some(entry));
        assert_eq!(storage.list("").await.unwrap(), vec!["a/"]);

        storage.delete("a/b").await.unwrap();
        assert_eq!(storage.get("a/b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_system_view_proxy_reads() {
        let system = StaticSystemView {
            default_lease_ttl: Duration::from_secs(3600),
            max_lease_ttl: Duration::from_secs(7200),
            sudo_privilege: true,
            replication_state: ReplicationState::PerformanceSecondary,
            local_mount: true,
            ..Default::default()
        };
        let (rpc, _session) = link(Arc::new(SystemViewServer::new(Arc::new(system))));
        let view = SystemViewClient::new(rpc);

        assert_eq!(view.default_lease_ttl().await, Duration::from_secs(3600));
        assert_eq!(view.max_lease_ttl().await, Duration::from_secs(7200));
        assert!(view.sudo_privilege("sys/mounts", "token").await);
        assert_eq!(view.replication_state().await, ReplicationState::PerformanceSecondary);
        assert!(view.local_mount().await);
        assert!(!view.tainted().await);
    }

    #[tokio::test]
    async fn test_system_view_fails_open_and_refuses_lookup() {
        let (rpc, session) = link(Arc::new(SystemViewServer::new(Arc::new(StaticSystemView {
            tainted: true,
            ..Default::default()
        }))));
        let view = SystemViewClient::new(rpc);
        assert!(view.tainted().await);

        assert_eq!(view.lookup_plugin("kv").await.unwrap_err(), LogicalError::LookupPluginUnsupported);

        session.close();
        assert!(!view.tainted().await);
        assert_eq!(view.default_lease_ttl().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_response_wrap_error_propagates() {
        let (rpc, _session) =
            link(Arc::new(SystemViewServer::new(Arc::new(StaticSystemView::default()))));
        let view = SystemViewClient::new(rpc);
        let err = view
            .response_wrap_data(&DataMap::new(), Duration::from_secs(60), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not implemented"));
    }

    #[tokio::test]
    async fn test_logger_proxy_levels() {
        let local = Arc::new(TracingLogger::new("kv", LogLevel::Warn));
        let (rpc, session) = link(Arc::new(LoggerServer::new(local.clone())));
        let logger = LoggerClient::new(rpc);

        assert!(!logger.is_info().await);
        logger.set_level(LogLevel::Debug);
        logger.info("hello");
        assert!(logger.is_debug().await);
        assert_eq!(local.level(), LogLevel::Debug);

        session.close();
        logger.error("dropped without failing");
        assert!(!logger.is_warn().await);
    }
}
