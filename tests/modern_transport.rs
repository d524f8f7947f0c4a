//! Modern transport behaviour between a host and an in-process plugin.

mod common;

use backend_plugin::logical::{
    Backend, BackendType, Context, ExistenceCheck, InmemStorage, LogicalError, Operation, Request,
    Storage, StorageEntry,
};
use backend_plugin::mock::{named_error, INTERNAL_KEY};
use backend_plugin::TransportKind;
use common::{eventually, read, write, Harness, SpanRecorder, ERROR_KINDS};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_kv_round_trip() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();
    assert_eq!(h.backend.transport(), TransportKind::Modern);

    h.backend.handle_request(&ctx, write("kv/db/creds", json!({"password": "hunter2"}))).await.unwrap();
    h.backend.handle_request(&ctx, write("kv/db/root", json!({"password": "toor"}))).await.unwrap();
    h.backend.handle_request(&ctx, write("kv/top", json!({"n": 1}))).await.unwrap();

    let resp = h.backend.handle_request(&ctx, read("kv/db/creds")).await.unwrap().unwrap();
    assert_eq!(resp.get("password"), Some(&json!("hunter2")));

    let listed = h
        .backend
        .handle_request(&ctx, Request::new(Operation::List, "kv/"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(listed.get("keys"), Some(&json!(["db/", "top"])));

    assert_eq!(h.backend.handle_request(&ctx, read("kv/nothing")).await.unwrap(), None);
}

#[tokio::test]
async fn test_requests_use_setup_storage() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();

    // Storage views attached to a request stay on the host.
    let local = Arc::new(InmemStorage::new());
    let req = write("kv/shared", json!({"v": 1})).with_storage(local.clone());
    h.backend.handle_request(&ctx, req).await.unwrap();

    assert!(local.is_empty().await);
    assert!(h.storage.get("shared").await.unwrap().is_some());
}

#[tokio::test]
async fn test_errors_keep_identity() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();

    for kind in ERROR_KINDS {
        let err = h
            .backend
            .handle_request(&ctx, read(&format!("errors/{}", kind)))
            .await
            .unwrap_err();
        assert_eq!(err, named_error(kind), "error kind {}", kind);
        assert!(!err.is_transport());
    }
}

#[tokio::test]
async fn test_existence_check() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();

    let check = h.backend.handle_existence_check(&ctx, read("kv/missing")).await.unwrap();
    assert_eq!(check, ExistenceCheck::found(false));

    h.storage.put(&StorageEntry::new("present", b"{}".to_vec())).await.unwrap();
    let check = h.backend.handle_existence_check(&ctx, read("kv/present")).await.unwrap();
    assert_eq!(check, ExistenceCheck::found(true));

    let check = h.backend.handle_existence_check(&ctx, read("system/ttl")).await.unwrap();
    assert_eq!(check, ExistenceCheck::not_found());
}

#[tokio::test]
async fn test_invalidate_then_read() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();

    h.backend.handle_request(&ctx, write("internal", json!({"value": "cached"}))).await.unwrap();
    h.storage.put(&StorageEntry::json(INTERNAL_KEY, &"fresh").unwrap()).await.unwrap();

    h.backend.invalidate_key(&ctx, INTERNAL_KEY).await;
    let resp = h.backend.handle_request(&ctx, read("internal")).await.unwrap().unwrap();
    assert_eq!(resp.get("value"), Some(&json!("fresh")));
}

#[tokio::test]
async fn test_system_view_over_shared_stream() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();

    let ttl = h.backend.handle_request(&ctx, read("system/ttl")).await.unwrap().unwrap();
    assert_eq!(ttl.get("default_lease_ttl"), Some(&json!(3600)));

    let err = h.backend.handle_request(&ctx, read("system/lookup")).await.unwrap_err();
    assert_eq!(err, LogicalError::LookupPluginUnsupported);

    // The plugin logs locally at info; debug stays off whatever the host uses.
    let log = write("log", json!({"level": "debug", "message": "local"}));
    let resp = h.backend.handle_request(&ctx, log).await.unwrap().unwrap();
    assert_eq!(resp.get("enabled"), Some(&json!(false)));
}

#[tokio::test]
async fn test_deadline_aborts_plugin_call() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background().with_timeout(Duration::from_millis(50));

    let err = h
        .backend
        .handle_request(&ctx, write("slow", json!({"ms": 2000})))
        .await
        .unwrap_err();
    assert!(err.is_transport(), "unexpected error {:?}", err);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.mock.slow_calls(), (1, 0));

    // The link survives an aborted call.
    let check = h.backend.handle_existence_check(&Context::background(), read("kv/x")).await;
    tokio_test::assert_ok!(check);
}

#[tokio::test]
async fn test_cancellation_aborts_plugin_call() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = h
        .backend
        .handle_request(&ctx, write("slow", json!({"ms": 2000})))
        .await
        .unwrap_err();
    assert!(err.is_transport());
    let mock = Arc::clone(&h.mock);
    assert!(eventually(|| mock.slow_calls().0 == 1).await);
    assert_eq!(h.mock.slow_calls().1, 0);
}

#[tokio::test]
async fn test_dropped_call_is_cancelled() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();

    let call = h.backend.handle_request(&ctx, write("slow", json!({"ms": 500})));
    let timed_out = tokio::time::timeout(Duration::from_millis(50), call).await;
    assert!(timed_out.is_err());

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(h.mock.slow_calls(), (1, 0));
}

#[tokio::test]
async fn test_special_paths_type_and_initialize() {
    let h = Harness::start(TransportKind::Modern).await;
    let paths = h.backend.special_paths().await.unwrap();
    assert_eq!(paths.root, vec!["root/*"]);
    assert_eq!(paths.unauthenticated, vec!["login"]);
    assert_eq!(h.backend.backend_type().await, BackendType::Logical);
    tokio_test::assert_ok!(h.backend.initialize(&Context::background()).await);
}

#[tokio::test]
async fn test_failed_setup_reports_error() {
    let h = Harness::connect(TransportKind::Modern, false, false);
    let mut config = h.backend_config();
    config.config.insert("fail_setup".to_string(), "true".to_string());

    let err = h.backend.setup(&Context::background(), config).await.unwrap_err();
    assert_eq!(err, LogicalError::other("setup refused by configuration"));

    // Cleanup after a partial setup still completes.
    h.backend.cleanup(&Context::background()).await;
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();

    h.backend.cleanup(&ctx).await;
    h.backend.cleanup(&ctx).await;
    assert_eq!(h.mock.cleanups(), 1);

    // Closing the Backend stream lets the plugin's server finish.
    let served = tokio::time::timeout(Duration::from_secs(5), h.server).await;
    assert!(matches!(served, Ok(Ok(Ok(())))));
}

#[tokio::test]
async fn test_killed_plugin_fails_outstanding_calls() {
    let h = Arc::new(Harness::start(TransportKind::Modern).await);

    let caller = Arc::clone(&h);
    let pending = tokio::spawn(async move {
        caller
            .backend
            .handle_request(&Context::background(), write("slow", json!({"ms": 5000})))
            .await
    });
    let mock = Arc::clone(&h.mock);
    assert!(eventually(|| mock.slow_calls().0 == 1).await);

    h.plugin.kill().await.unwrap();
    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_oversized_request_fails_only_that_call() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();

    let big = write("kv/big", json!({"blob": "x".repeat(17 << 20)}));
    let err = h.backend.handle_request(&ctx, big).await.unwrap_err();
    assert!(err.is_transport(), "unexpected error {:?}", err);
    assert!(h.storage.is_empty().await);

    h.backend.handle_request(&ctx, write("kv/small", json!({"n": 1}))).await.unwrap();
    let resp = h.backend.handle_request(&ctx, read("kv/small")).await.unwrap().unwrap();
    assert_eq!(resp.get("n"), Some(&json!(1)));
    assert!(!h.plugin.is_closed());
}

#[tokio::test]
async fn test_oversized_storage_reply_fails_only_that_call() {
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();

    h.storage.put(&StorageEntry::new("big", vec![b'x'; 17 << 20])).await.unwrap();
    assert!(h.backend.handle_request(&ctx, read("kv/big")).await.is_err());

    h.backend.handle_request(&ctx, write("kv/small", json!({"n": 2}))).await.unwrap();
    let resp = h.backend.handle_request(&ctx, read("kv/small")).await.unwrap().unwrap();
    assert_eq!(resp.get("n"), Some(&json!(2)));
}

#[tokio::test]
async fn test_plugin_calls_open_a_span() {
    let recorder = SpanRecorder::default();
    let _guard = recorder.install();
    let h = Harness::start(TransportKind::Modern).await;
    let ctx = Context::background();

    h.backend.handle_existence_check(&ctx, read("kv/missing")).await.unwrap();
    assert!(recorder.saw_plugin_call("handle_existence_check"), "{:?}", recorder.spans());
    assert!(!recorder.saw_plugin_call("handle_request"));

    h.backend.handle_request(&ctx, read("kv/missing")).await.unwrap();
    assert!(recorder.saw_plugin_call("handle_request"));
}
