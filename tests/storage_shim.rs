//! Storage proxy over a broker stream.

use async_trait::async_trait;
use backend_plugin::config::MuxConfig;
use backend_plugin::logical::{self, InmemStorage, LogicalError, Storage, StorageEntry};
use backend_plugin::mux::Session;
use backend_plugin::rpc::{serve, RpcClient};
use backend_plugin::shims::{StorageClient, StorageServer};
use std::sync::Arc;

/// Storage that refuses every operation.
struct DenyingStorage;

#[async_trait]
impl Storage for DenyingStorage {
    async fn list(&self, _prefix: &str) -> logical::Result<Vec<String>> {
        Err(LogicalError::PermissionDenied)
    }

    async fn get(&self, _key: &str) -> logical::Result<Option<StorageEntry>> {
        Err(LogicalError::other("disk on fire"))
    }

    async fn put(&self, _entry: &StorageEntry) -> logical::Result<()> {
        Err(LogicalError::other("read-only"))
    }

    async fn delete(&self, _key: &str) -> logical::Result<()> {
        Err(LogicalError::Unrecoverable)
    }
}

/// Serve `storage` on one end and return a client plus the client's session.
fn connect(storage: Arc<dyn Storage>) -> (StorageClient, Session) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let config = MuxConfig::default();
    let host = Session::new(a, &config);
    let plugin = Session::new(b, &config);

    tokio::spawn(async move {
        let channel = host.accept(1).await.unwrap();
        serve(channel, Arc::new(StorageServer::new(storage))).await;
        host.close();
    });

    let channel = plugin.open(1).unwrap();
    (StorageClient::new(RpcClient::new(channel)), plugin)
}

#[tokio::test]
async fn test_basic_operations() {
    let backing = Arc::new(InmemStorage::new());
    let (client, _session) = connect(backing.clone());

    assert_eq!(client.get("missing").await.unwrap(), None);

    client.put(&StorageEntry::new("config", b"{\"ttl\":30}".to_vec())).await.unwrap();
    let entry = client.get("config").await.unwrap().unwrap();
    assert_eq!(entry.key, "config");
    assert_eq!(entry.value, b"{\"ttl\":30}");
    assert!(!entry.seal_wrap);

    client.delete("config").await.unwrap();
    assert_eq!(client.get("config").await.unwrap(), None);
    assert!(backing.is_empty().await);
}

#[tokio::test]
async fn test_nested_list() {
    let (client, _session) = connect(Arc::new(InmemStorage::new()));
    for key in ["roles/admin", "roles/reader", "roles/nested/deep", "config", "creds/one"] {
        client.put(&StorageEntry::new(key, b"x".to_vec())).await.unwrap();
    }

    assert_eq!(client.list("").await.unwrap(), vec!["config", "creds/", "roles/"]);
    assert_eq!(client.list("roles/").await.unwrap(), vec!["admin", "nested/", "reader"]);
    assert!(client.list("missing/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_binary_and_seal_wrapped_values() {
    let backing = Arc::new(InmemStorage::new());
    let (client, _session) = connect(backing.clone());

    let value: Vec<u8> = (0..=255u8).collect();
    let entry = StorageEntry { key: "blob".to_string(), value: value.clone(), seal_wrap: true };
    client.put(&entry).await.unwrap();

    assert_eq!(client.get("blob").await.unwrap(), Some(entry.clone()));
    assert_eq!(backing.get("blob").await.unwrap(), Some(entry));
}

#[tokio::test]
async fn test_errors_propagate() {
    let (client, _session) = connect(Arc::new(DenyingStorage));

    assert_eq!(client.list("").await.unwrap_err(), LogicalError::PermissionDenied);
    assert_eq!(client.delete("k").await.unwrap_err(), LogicalError::Unrecoverable);
    assert_eq!(client.get("k").await.unwrap_err(), LogicalError::other("disk on fire"));

    let err = client.put(&StorageEntry::new("k", b"v".to_vec())).await.unwrap_err();
    assert_eq!(err.to_string(), "read-only");
    assert!(!err.is_transport());
}

#[tokio::test]
async fn test_closed_session_is_transport_error() {
    let (client, session) = connect(Arc::new(InmemStorage::new()));
    client.put(&StorageEntry::new("k", b"v".to_vec())).await.unwrap();

    session.close();
    let err = client.get("k").await.unwrap_err();
    assert!(err.is_transport(), "unexpected error {:?}", err);
}

#[tokio::test]
async fn test_single_put_lists_at_root_and_reads_back_equal() {
    let (client, _session) = connect(Arc::new(InmemStorage::new()));
    let entry = StorageEntry { key: "foo".into(), value: vec![0, 1, 2], seal_wrap: true };
    client.put(&entry).await.unwrap();

    assert_eq!(client.list("").await.unwrap(), vec!["foo"]);
    assert_eq!(client.get("foo").await.unwrap(), Some(entry));
    assert_eq!(client.get("bar").await.unwrap(), None);
}
