//! Spawning the reference plugin binary through the full handshake.

mod common;

use backend_plugin::logical::{
    Backend, BackendConfig, Context, InmemStorage, LogLevel, LogicalError, PluginRunner,
    TracingLogger,
};
use backend_plugin::process::{PluginClient, MAGIC_COOKIE_KEY};
use backend_plugin::{Error, PluginBackend, PluginConfig, TransportKind};
use common::{read, system_view, write};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

fn runner() -> PluginRunner {
    PluginRunner {
        name: "kv".to_string(),
        command: env!("CARGO_BIN_EXE_kv-plugin").to_string(),
        args: vec!["--log-level".to_string(), "debug".to_string()],
        ..Default::default()
    }
}

/// Set up a dispensed backend the way a host mounts it.
async fn mount(plugin: &PluginClient) -> (PluginBackend, Arc<InmemStorage>) {
    let storage = Arc::new(InmemStorage::new());
    let config = BackendConfig {
        storage_view: storage.clone(),
        logger: Arc::new(TracingLogger::new("kv", LogLevel::Debug)),
        system: Arc::new(system_view()),
        config: Default::default(),
    };
    let backend = plugin.dispense().unwrap();
    backend.setup(&Context::background(), config).await.unwrap();
    (backend, storage)
}

#[tokio::test]
async fn test_spawned_plugin_serves_requests() {
    let plugin = PluginClient::start(&runner(), &PluginConfig::default()).await.unwrap();
    assert_eq!(plugin.transport(), TransportKind::Modern);
    assert!(!plugin.metadata_mode());

    let (backend, storage) = mount(&plugin).await;
    let ctx = Context::background();
    backend.handle_request(&ctx, write("kv/app", json!({"token": "abc"}))).await.unwrap();
    let resp = backend.handle_request(&ctx, read("kv/app")).await.unwrap().unwrap();
    assert_eq!(resp.get("token"), Some(&json!("abc")));
    assert_eq!(storage.len().await, 1);

    // Only one backend per plugin.
    assert!(plugin.dispense().is_err());

    backend.cleanup(&ctx).await;
    plugin.kill().await.unwrap();
}

#[tokio::test]
async fn test_legacy_only_host_negotiates_legacy() {
    let mut config = PluginConfig::default();
    config.client.transports = vec![TransportKind::Legacy];

    let plugin = PluginClient::start(&runner(), &config).await.unwrap();
    assert_eq!(plugin.transport(), TransportKind::Legacy);

    let (backend, _storage) = mount(&plugin).await;
    let err = backend.handle_request(&Context::background(), read("errors/permission-denied")).await;
    assert_eq!(err.unwrap_err(), LogicalError::PermissionDenied);
    plugin.kill().await.unwrap();
}

#[tokio::test]
async fn test_kill_fails_later_calls() {
    let plugin = PluginClient::start(&runner(), &PluginConfig::default()).await.unwrap();
    let (backend, _storage) = mount(&plugin).await;

    plugin.kill().await.unwrap();
    assert!(plugin.is_closed());
    let err = backend.handle_request(&Context::background(), read("kv/app")).await.unwrap_err();
    assert!(err.is_transport(), "unexpected error {:?}", err);

    // Killing twice is harmless.
    tokio_test::assert_ok!(plugin.kill().await);
}

#[tokio::test]
async fn test_checksum_is_verified() {
    let binary = std::fs::read(env!("CARGO_BIN_EXE_kv-plugin")).unwrap();

    let mut good = runner();
    good.sha256 = Sha256::digest(&binary).to_vec();
    let plugin = PluginClient::start(&good, &PluginConfig::default()).await.unwrap();
    plugin.kill().await.unwrap();

    let mut bad = runner();
    bad.sha256 = vec![0u8; 32];
    let err = PluginClient::start(&bad, &PluginConfig::default()).await.err().unwrap();
    assert!(matches!(err, Error::Process { .. }), "unexpected error {:?}", err);
    assert!(err.to_string().contains("checksums did not match"));
}

#[tokio::test]
async fn test_missing_binary_is_process_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut missing = runner();
    missing.command = dir.path().join("no-such-plugin").display().to_string();

    let err = PluginClient::start(&missing, &PluginConfig::default()).await.err().unwrap();
    assert!(err.to_string().contains("failed to start plugin 'kv'"));
}

#[tokio::test]
async fn test_binary_refuses_to_run_by_hand() {
    let output = tokio::time::timeout(
        Duration::from_secs(30),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_kv-plugin"))
            .env_remove(MAGIC_COOKIE_KEY)
            .output(),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not meant to be executed directly"), "stderr: {}", stderr);
}
