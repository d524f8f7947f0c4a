//! Metadata mode on both transports.

mod common;

use backend_plugin::logical::{
    Backend, BackendConfig, BackendType, Context, LogicalError, StorageEntry,
};
use backend_plugin::mock::MockBackend;
use backend_plugin::TransportKind;
use common::{read, write, Harness};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TRANSPORTS: [TransportKind; 2] = [TransportKind::Legacy, TransportKind::Modern];

#[tokio::test]
async fn test_client_refuses_data_operations() {
    for transport in TRANSPORTS {
        let h = Harness::start_with(transport, true, true).await;
        let ctx = Context::background();
        assert!(h.backend.metadata_mode());

        let err = h.backend.handle_request(&ctx, write("kv/a", json!({"x": 1}))).await.unwrap_err();
        assert_eq!(err, LogicalError::ClientInMetadataMode, "{}", transport);

        let err = h.backend.handle_existence_check(&ctx, read("kv/a")).await.unwrap_err();
        assert_eq!(err, LogicalError::ClientInMetadataMode, "{}", transport);
        assert!(h.storage.is_empty().await);
    }
}

#[tokio::test]
async fn test_metadata_queries_still_work() {
    for transport in TRANSPORTS {
        let h = Harness::start_with(transport, true, true).await;

        let paths = h.backend.special_paths().await.unwrap();
        assert_eq!(paths.unauthenticated, vec!["login"], "{}", transport);
        assert_eq!(h.backend.backend_type().await, BackendType::Logical);
        assert_eq!(h.mock.config_value("mount"), Some("kv".to_string()));
    }
}

#[tokio::test]
async fn test_invalidation_is_skipped() {
    for transport in TRANSPORTS {
        let h = Harness::start_with(transport, true, true).await;
        h.backend.invalidate_key(&Context::background(), "internal").await;

        // A later call on the same stream would have observed the notification.
        h.backend.backend_type().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.mock.invalidations(), 0, "{}", transport);
    }
}

#[tokio::test]
async fn test_server_in_metadata_mode_refuses_data_operations() {
    for transport in TRANSPORTS {
        let h = Harness::start_with(transport, false, true).await;
        let ctx = Context::background();

        let err = h.backend.handle_request(&ctx, read("kv/a")).await.unwrap_err();
        assert_eq!(err, LogicalError::ServerInMetadataMode, "{}", transport);

        let err = h.backend.handle_existence_check(&ctx, read("kv/a")).await.unwrap_err();
        assert_eq!(err, LogicalError::ServerInMetadataMode, "{}", transport);

        assert_eq!(h.backend.backend_type().await, BackendType::Logical);
    }
}

#[tokio::test]
async fn test_plugin_in_metadata_mode_gets_no_host_state() {
    for transport in TRANSPORTS {
        let seen_ttl = Arc::new(Mutex::new(None));
        let factory = {
            let seen_ttl = Arc::clone(&seen_ttl);
            move |ctx: Context, config: BackendConfig| {
                let seen_ttl = Arc::clone(&seen_ttl);
                async move {
                    config.storage_view.put(&StorageEntry::new("written-at-setup", b"x".to_vec())).await?;
                    let ttl = config.system.default_lease_ttl().await;
                    *seen_ttl.lock().unwrap() = Some(ttl);

                    let backend = Arc::new(MockBackend::new());
                    backend.setup(&ctx, config).await?;
                    Ok::<Arc<dyn Backend>, LogicalError>(backend)
                }
            }
        };

        let mock = Arc::new(MockBackend::new());
        let h = Harness::connect_with_factory(transport, false, true, mock, Arc::new(factory));
        h.backend.setup(&Context::background(), h.backend_config()).await.unwrap();

        // The host view would have answered an hour.
        assert_eq!(*seen_ttl.lock().unwrap(), Some(Duration::ZERO), "{}", transport);
        assert!(h.storage.is_empty().await, "{}", transport);
    }
}
