//! # Reference Backend
//!
//! A small in-tree backend used by the bundled `kv-plugin` binary and by the
//! integration tests. It exercises every part of the backend contract:
//!
//! | Path              | Behaviour                                                  |
//! |-------------------|------------------------------------------------------------|
//! | `kv/<key>`        | read, create, update, delete and list against storage      |
//! | `internal`        | value cached in memory, dropped by `invalidate_key`        |
//! | `errors/<kind>`   | returns the named error                                    |
//! | `system/<query>`  | answers from the system view (`ttl`, `sudo`, `replication`, `lookup`, `wrap`) |
//! | `log`             | writes `message` at `level` through the backend logger     |
//! | `slow`            | sleeps for `ms` milliseconds, honouring the call context   |

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::logical::{
    Backend, BackendConfig, BackendFactory, BackendType, Context, DataMap, ExistenceCheck,
    LogLevel, Logger, LogicalError, Operation, Paths, Request, Response, Result, StorageEntry,
    StorageView, SystemView,
};

/// Storage key backing the `internal` path.
pub const INTERNAL_KEY: &str = "internal";

const KV_PREFIX: &str = "kv/";

/// In-tree reference backend.
#[derive(Default)]
pub struct MockBackend {
    config: RwLock<Option<BackendConfig>>,
    internal: tokio::sync::RwLock<Option<String>>,
    invalidations: AtomicUsize,
    cleanups: AtomicUsize,
    slow_started: AtomicUsize,
    slow_completed: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory building a fresh backend for every setup.
    pub fn factory() -> impl BackendFactory {
        |ctx: Context, config: BackendConfig| async move {
            let backend = Arc::new(MockBackend::new());
            backend.setup(&ctx, config).await?;
            Ok::<Arc<dyn Backend>, LogicalError>(backend)
        }
    }

    /// Factory handing out `backend` itself, so tests can inspect it.
    pub fn shared_factory(backend: Arc<MockBackend>) -> impl BackendFactory {
        move |ctx: Context, config: BackendConfig| {
            let backend = Arc::clone(&backend);
            async move {
                backend.setup(&ctx, config).await?;
                Ok::<Arc<dyn Backend>, LogicalError>(backend)
            }
        }
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    /// `slow` requests started and completed, in that order.
    pub fn slow_calls(&self) -> (usize, usize) {
        (self.slow_started.load(Ordering::SeqCst), self.slow_completed.load(Ordering::SeqCst))
    }

    /// Configuration value passed at setup.
    pub fn config_value(&self, key: &str) -> Option<String> {
        self.config.read().ok()?.as_ref()?.config.get(key).cloned()
    }

    fn setup_config(&self) -> Result<BackendConfig> {
        self.config
            .read()
            .ok()
            .and_then(|c| c.clone())
            .ok_or_else(|| LogicalError::other("backend is not set up"))
    }

    fn storage(&self, req: &Request) -> Result<StorageView> {
        match &req.storage {
            Some(storage) => Ok(Arc::clone(storage)),
            None => Ok(self.setup_config()?.storage_view),
        }
    }

    async fn handle_kv(&self, req: &Request, key: &str) -> Result<Option<Response>> {
        let storage = self.storage(req)?;
        match req.operation {
            Operation::Read => match storage.get(key).await? {
                Some(entry) => Ok(Some(Response::with_data(entry.decode_json()?))),
                None => Ok(None),
            },
            Operation::Create | Operation::Update => {
                let data = req.data.clone().unwrap_or_default();
                if data.is_empty() {
                    return Err(LogicalError::BadRequest("no data provided".to_string()));
                }
                storage.put(&StorageEntry::json(key, &data)?).await?;
                Ok(None)
            }
            Operation::Delete => {
                storage.delete(key).await?;
                Ok(None)
            }
            Operation::List => {
                let keys = storage.list(key).await?;
                Ok(Some(Response::with_data(data(json!({ "keys": keys })))))
            }
            _ => Err(LogicalError::UnsupportedOperation),
        }
    }

    async fn handle_internal(&self, req: &Request) -> Result<Option<Response>> {
        match req.operation {
            Operation::Read => {
                let cached = self.internal.read().await.clone();
                let value = match cached {
                    Some(value) => Some(value),
                    None => {
                        let loaded = match self.storage(req)?.get(INTERNAL_KEY).await? {
                            Some(entry) => Some(entry.decode_json::<String>()?),
                            None => None,
                        };
                        *self.internal.write().await = loaded.clone();
                        loaded
                    }
                };
                Ok(Some(Response::with_data(data(json!({ "value": value })))))
            }
            Operation::Update | Operation::Create => {
                let value = req
                    .get("value")
                    .and_then(Value::as_str)
                    .ok_or_else(|| LogicalError::BadRequest("missing 'value'".to_string()))?
                    .to_string();
                self.storage(req)?.put(&StorageEntry::json(INTERNAL_KEY, &value)?).await?;
                *self.internal.write().await = Some(value);
                Ok(None)
            }
            _ => Err(LogicalError::UnsupportedOperation),
        }
    }

    async fn handle_system(&self, req: &Request, query: &str) -> Result<Option<Response>> {
        let system = self.setup_config()?.system;
        let body = match query {
            "ttl" => json!({
                "default_lease_ttl": system.default_lease_ttl().await.as_secs(),
                "max_lease_ttl": system.max_lease_ttl().await.as_secs(),
            }),
            "sudo" => json!({
                "sudo": system.sudo_privilege(&req.path, &req.client_token).await,
            }),
            "replication" => json!({
                "replication_state": system.replication_state().await,
                "tainted": system.tainted().await,
                "caching_disabled": system.caching_disabled().await,
                "mlock_enabled": system.mlock_enabled().await,
                "local_mount": system.local_mount().await,
            }),
            "lookup" => {
                let name = req.get("name").and_then(Value::as_str).unwrap_or("kv");
                let runner = system.lookup_plugin(name).await?;
                json!({ "name": runner.name, "command": runner.command })
            }
            "wrap" => {
                let ttl = req.get("ttl").and_then(Value::as_u64).unwrap_or(60);
                let payload = req.data.clone().unwrap_or_default();
                let info = system.response_wrap_data(&payload, Duration::from_secs(ttl), false).await?;
                json!({ "token": info.token, "ttl": info.ttl.as_secs() })
            }
            _ => return Err(LogicalError::UnsupportedPath),
        };
        Ok(Some(Response::with_data(data(body))))
    }

    async fn handle_log(&self, req: &Request) -> Result<Option<Response>> {
        let logger = self.setup_config()?.logger;
        let level = req
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or("info")
            .parse::<LogLevel>()
            .map_err(LogicalError::BadRequest)?;
        let message = req.get("message").and_then(Value::as_str).unwrap_or_default();
        logger.log(level, message);
        let enabled = logger.is_enabled(level).await;
        Ok(Some(Response::with_data(data(json!({ "enabled": enabled })))))
    }

    async fn handle_slow(&self, ctx: &Context, req: &Request) -> Result<Option<Response>> {
        let ms = req.get("ms").and_then(Value::as_u64).unwrap_or(1000);
        self.slow_started.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                self.slow_completed.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
            _ = ctx.done() => Err(LogicalError::other("request abandoned")),
        }
    }
}

/// Error returned for `errors/<kind>`.
pub fn named_error(kind: &str) -> LogicalError {
    match kind {
        "unsupported-operation" => LogicalError::UnsupportedOperation,
        "unsupported-path" => LogicalError::UnsupportedPath,
        "invalid-request" => LogicalError::InvalidRequest,
        "permission-denied" => LogicalError::PermissionDenied,
        "multi-authz-pending" => LogicalError::MultiAuthzPending,
        "unrecoverable" => LogicalError::Unrecoverable,
        "rate-limited" => LogicalError::UpstreamRateLimited,
        "coded" => LogicalError::coded(418, "teapot refused"),
        "bad-request" => LogicalError::BadRequest("malformed input".to_string()),
        "user" => LogicalError::user("user error"),
        other => LogicalError::other(format!("plain failure: {}", other)),
    }
}

fn data(value: Value) -> DataMap {
    match value {
        Value::Object(map) => map,
        _ => DataMap::new(),
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn handle_request(&self, ctx: &Context, req: Request) -> Result<Option<Response>> {
        let path = req.path.clone();
        if let Some(key) = path.strip_prefix(KV_PREFIX) {
            if key.is_empty() && req.operation != Operation::List {
                return Err(LogicalError::InvalidRequest);
            }
            return self.handle_kv(&req, key).await;
        }
        if let Some(kind) = path.strip_prefix("errors/") {
            return Err(named_error(kind));
        }
        if let Some(query) = path.strip_prefix("system/") {
            return self.handle_system(&req, query).await;
        }
        match path.as_str() {
            "internal" => self.handle_internal(&req).await,
            "log" => self.handle_log(&req).await,
            "slow" => self.handle_slow(ctx, &req).await,
            _ => Err(LogicalError::UnsupportedPath),
        }
    }

    async fn handle_existence_check(&self, _ctx: &Context, req: Request) -> Result<ExistenceCheck> {
        match req.path.strip_prefix(KV_PREFIX) {
            Some(key) if !key.is_empty() => {
                let exists = self.storage(&req)?.get(key).await?.is_some();
                Ok(ExistenceCheck::found(exists))
            }
            _ => Ok(ExistenceCheck::not_found()),
        }
    }

    async fn special_paths(&self) -> Option<Paths> {
        Some(Paths {
            root: vec!["root/*".to_string()],
            unauthenticated: vec!["login".to_string()],
            ..Default::default()
        })
    }

    fn system(&self) -> Option<Arc<dyn SystemView>> {
        self.config.read().ok()?.as_ref().map(|c| Arc::clone(&c.system))
    }

    fn logger(&self) -> Option<Arc<dyn Logger>> {
        self.config.read().ok()?.as_ref().map(|c| Arc::clone(&c.logger))
    }

    async fn setup(&self, _ctx: &Context, config: BackendConfig) -> Result<()> {
        if config.config.get("fail_setup").map(String::as_str) == Some("true") {
            return Err(LogicalError::other("setup refused by configuration"));
        }
        if let Ok(mut current) = self.config.write() {
            *current = Some(config);
        }
        Ok(())
    }

    async fn invalidate_key(&self, _ctx: &Context, key: &str) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        if key == INTERNAL_KEY {
            *self.internal.write().await = None;
        }
        debug!(key, "Invalidated key");
    }

    async fn cleanup(&self, _ctx: &Context) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        *self.internal.write().await = None;
    }

    async fn backend_type(&self) -> BackendType {
        BackendType::Logical
    }
}
