//! Common test utilities for all integration tests.
//!
//! Wires a host and an in-process plugin together over an in-memory duplex
//! link, so transport tests run without spawning a binary.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use backend_plugin::config::MuxConfig;
use backend_plugin::logical::{
    Backend, BackendConfig, BackendFactory, Context, DataMap, InmemStorage, LogLevel, Operation,
    ReplicationState, Request, StaticSystemView, TracingLogger,
};
use backend_plugin::mock::MockBackend;
use backend_plugin::process::{serve_connection, PluginClient};
use backend_plugin::{PluginBackend, Result, TransportKind};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context as LayerContext, Layer};

/// A host connected to a plugin serving [`MockBackend`].
pub struct Harness {
    pub plugin: PluginClient,
    pub backend: PluginBackend,
    pub mock: Arc<MockBackend>,
    pub storage: Arc<InmemStorage>,
    pub server: JoinHandle<Result<()>>,
}

impl Harness {
    /// Start a plugin and set up its backend.
    pub async fn start(transport: TransportKind) -> Self {
        Self::start_with(transport, false, false).await
    }

    /// Start with explicit metadata-mode flags for each side.
    pub async fn start_with(transport: TransportKind, host_metadata: bool, plugin_metadata: bool) -> Self {
        let harness = Self::connect(transport, host_metadata, plugin_metadata);
        harness.backend.setup(&Context::background(), harness.backend_config()).await.unwrap();
        harness
    }

    /// Start a plugin without calling setup.
    pub fn connect(transport: TransportKind, host_metadata: bool, plugin_metadata: bool) -> Self {
        let mock = Arc::new(MockBackend::new());
        let factory = Arc::new(MockBackend::shared_factory(Arc::clone(&mock)));
        Self::connect_with_factory(transport, host_metadata, plugin_metadata, mock, factory)
    }

    /// Start a plugin whose backends come from `factory`.
    pub fn connect_with_factory(
        transport: TransportKind,
        host_metadata: bool,
        plugin_metadata: bool,
        mock: Arc<MockBackend>,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        let (host_io, plugin_io) = tokio::io::duplex(1024 * 1024);
        let server = tokio::spawn(async move {
            serve_connection(plugin_io, factory, transport, plugin_metadata, &MuxConfig::default()).await
        });

        let plugin =
            PluginClient::from_stream("kv", host_io, transport, host_metadata, &MuxConfig::default());
        let backend = plugin.dispense().unwrap();

        Self { plugin, backend, mock, storage: Arc::new(InmemStorage::new()), server }
    }

    pub fn backend_config(&self) -> BackendConfig {
        let mut config = HashMap::new();
        config.insert("mount".to_string(), "kv".to_string());
        BackendConfig {
            storage_view: self.storage.clone(),
            logger: Arc::new(TracingLogger::new("kv", LogLevel::Debug)),
            system: Arc::new(system_view()),
            config,
        }
    }
}

pub fn system_view() -> StaticSystemView {
    StaticSystemView {
        default_lease_ttl: Duration::from_secs(3600),
        max_lease_ttl: Duration::from_secs(86400),
        replication_state: ReplicationState::PerformancePrimary,
        ..Default::default()
    }
}

pub fn data(value: Value) -> DataMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

pub fn read(path: &str) -> Request {
    Request::new(Operation::Read, path)
}

pub fn write(path: &str, value: Value) -> Request {
    Request::new(Operation::Update, path).with_data(data(value))
}

/// Wait until `check` holds or the timeout passes.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Error kinds the reference backend can be asked to return.
pub const ERROR_KINDS: &[&str] = &[
    "unsupported-operation",
    "unsupported-path",
    "invalid-request",
    "permission-denied",
    "multi-authz-pending",
    "unrecoverable",
    "rate-limited",
    "coded",
    "bad-request",
    "user",
    "something-else",
];

/// Records every span opened while installed, as `name field=value ...`.
#[derive(Clone, Default)]
pub struct SpanRecorder {
    spans: Arc<Mutex<Vec<String>>>,
}

impl SpanRecorder {
    /// Install as the thread's default subscriber until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        use tracing_subscriber::layer::SubscriberExt;
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn spans(&self) -> Vec<String> {
        self.spans.lock().unwrap().clone()
    }

    /// Whether a `plugin_call` span for `operation` was opened.
    pub fn saw_plugin_call(&self, operation: &str) -> bool {
        let expected = format!("operation={}", operation);
        self.spans()
            .iter()
            .any(|span| span.starts_with("plugin_call") && span.split(' ').any(|f| f == expected))
    }
}

struct FieldText(String);

impl Visit for FieldText {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let _ = write!(self.0, " {}={:?}", field.name(), value);
    }
}

impl<S: Subscriber> Layer<S> for SpanRecorder {
    fn on_new_span(&self, attrs: &Attributes<'_>, _: &Id, _: LayerContext<'_, S>) {
        let mut fields = FieldText(attrs.metadata().name().to_string());
        attrs.record(&mut fields);
        self.spans.lock().unwrap().push(fields.0);
    }
}
