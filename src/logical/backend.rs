//! The backend contract and the configuration handed to it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::context::Context;
use super::error::Result;
use super::logger::Logger;
use super::request::{Request, StorageView};
use super::response::Response;
use super::system_view::SystemView;

/// Kind of backend: secret engine or auth method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    #[default]
    Unknown,
    Logical,
    Credential,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendType::Unknown => "unknown",
            BackendType::Logical => "logical",
            BackendType::Credential => "credential",
        };
        f.write_str(name)
    }
}

/// Path patterns with special handling by the host.
///
/// A trailing `*` matches any suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paths {
    /// Paths requiring sudo privileges.
    pub root: Vec<String>,
    /// Paths reachable without a client token.
    pub unauthenticated: Vec<String>,
    /// Paths whose storage is never replicated.
    pub local_storage: Vec<String>,
    /// Paths whose storage is seal-wrapped.
    pub seal_wrap_storage: Vec<String>,
}

/// Answer of [`Backend::handle_existence_check`].
///
/// `found == false` means the backend declines to answer; `exists` is then
/// meaningless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistenceCheck {
    pub found: bool,
    pub exists: bool,
}

impl ExistenceCheck {
    pub fn not_found() -> Self {
        Self { found: false, exists: false }
    }

    pub fn found(exists: bool) -> Self {
        Self { found: true, exists }
    }
}

/// Everything a backend receives at setup.
#[derive(Clone)]
pub struct BackendConfig {
    pub storage_view: StorageView,
    pub logger: Arc<dyn Logger>,
    pub system: Arc<dyn SystemView>,
    pub config: HashMap<String, String>,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig").field("config", &self.config).finish_non_exhaustive()
    }
}

/// A secret engine or auth method.
///
/// Implemented by concrete backends and, identically, by both transport
/// clients so the host cannot tell a local backend from a plugin.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Handle a request. `Ok(None)` is a successful empty response.
    async fn handle_request(&self, ctx: &Context, req: Request) -> Result<Option<Response>>;

    async fn handle_existence_check(&self, ctx: &Context, req: Request) -> Result<ExistenceCheck>;

    /// Paths with special handling, if any.
    async fn special_paths(&self) -> Option<Paths>;

    /// System view captured at setup. Never crosses the process boundary.
    fn system(&self) -> Option<Arc<dyn SystemView>>;

    /// Logger captured at setup. Never crosses the process boundary.
    fn logger(&self) -> Option<Arc<dyn Logger>>;

    async fn setup(&self, ctx: &Context, config: BackendConfig) -> Result<()>;

    /// Post-setup hook.
    async fn initialize(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    /// Drop any cached state derived from storage `key`.
    async fn invalidate_key(&self, ctx: &Context, key: &str);

    /// Release resources. Calling it more than once is allowed.
    async fn cleanup(&self, ctx: &Context);

    async fn backend_type(&self) -> BackendType;
}

#[async_trait]
impl<T: Backend + ?Sized> Backend for Arc<T> {
    async fn handle_request(&self, ctx: &Context, req: Request) -> Result<Option<Response>> {
        (**self).handle_request(ctx, req).await
    }

    async fn handle_existence_check(&self, ctx: &Context, req: Request) -> Result<ExistenceCheck> {
        (**self).handle_existence_check(ctx, req).await
    }

    async fn special_paths(&self) -> Option<Paths> {
        (**self).special_paths().await
    }

    fn system(&self) -> Option<Arc<dyn SystemView>> {
        (**self).system()
    }

    fn logger(&self) -> Option<Arc<dyn Logger>> {
        (**self).logger()
    }

    async fn setup(&self, ctx: &Context, config: BackendConfig) -> Result<()> {
        (**self).setup(ctx, config).await
    }

    async fn initialize(&self, ctx: &Context) -> Result<()> {
        (**self).initialize(ctx).await
    }

    async fn invalidate_key(&self, ctx: &Context, key: &str) {
        (**self).invalidate_key(ctx, key).await
    }

    async fn cleanup(&self, ctx: &Context) {
        (**self).cleanup(ctx).await
    }

    async fn backend_type(&self) -> BackendType {
        (**self).backend_type().await
    }
}

/// Builds a ready-to-use backend from its setup configuration.
///
/// The plugin process calls the factory when the host sends `Setup`; the
/// returned backend must already be set up.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn create(&self, ctx: Context, config: BackendConfig) -> Result<Arc<dyn Backend>>;
}

#[async_trait]
impl<F, Fut> BackendFactory for F
where
    F: Fn(Context, BackendConfig) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Arc<dyn Backend>>> + Send,
{
    async fn create(&self, ctx: Context, config: BackendConfig) -> Result<Arc<dyn Backend>> {
        (self)(ctx, config).await
    }
}
