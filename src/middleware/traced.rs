//! Tracing wrapper for backends.
//!
//! Every operation is logged when it starts and again when it finishes, with
//! its duration and, on failure, the error message. Request data and
//! response payloads are never logged; only the request path is.
//!
//! ```rust,ignore
//! let backend = TracingBackend::new(plugin.dispense()?, "kv");
//! backend.handle_request(&ctx, req).await?;
//! ```
//!
//! Wrapping a backend twice logs each operation twice.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::logical::{
    Backend, BackendConfig, BackendType, Context, ExistenceCheck, Logger, Paths, Request,
    Response, Result, SystemView,
};

/// Logs every [`Backend`] operation passing through it.
pub struct TracingBackend<B: Backend> {
    inner: B,
    name: String,
}

impl<B: Backend> TracingBackend<B> {
    /// Wrap `inner`; `name` identifies the backend in log lines.
    pub fn new(inner: B, name: impl Into<String>) -> Self {
        Self { inner, name: name.into() }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    fn started(&self, operation: &str) -> Instant {
        debug!(backend = %self.name, operation, status = "started", "Backend operation");
        Instant::now()
    }

    fn finished<T>(&self, operation: &str, start: Instant, result: &Result<T>) {
        let took = start.elapsed();
        match result {
            Ok(_) => info!(
                backend = %self.name,
                operation,
                status = "finished",
                took = ?took,
                "Backend operation"
            ),
            Err(e) => warn!(
                backend = %self.name,
                operation,
                status = "finished",
                took = ?took,
                err = %e,
                "Backend operation"
            ),
        }
    }

    fn finished_plain(&self, operation: &str, start: Instant) {
        info!(
            backend = %self.name,
            operation,
            status = "finished",
            took = ?start.elapsed(),
            "Backend operation"
        );
    }
}

#[async_trait]
impl<B: Backend> Backend for TracingBackend<B> {
    async fn handle_request(&self, ctx: &Context, req: Request) -> Result<Option<Response>> {
        debug!(backend = %self.name, path = %req.path, operation = %req.operation, "Handling request");
        let start = self.started("handle_request");
        let result = self.inner.handle_request(ctx, req).await;
        self.finished("handle_request", start, &result);
        result
    }

    async fn handle_existence_check(&self, ctx: &Context, req: Request) -> Result<ExistenceCheck> {
        debug!(backend = %self.name, path = %req.path, "Checking existence");
        let start = self.started("handle_existence_check");
        let result = self.inner.handle_existence_check(ctx, req).await;
        self.finished("handle_existence_check", start, &result);
        result
    }

    async fn special_paths(&self) -> Option<Paths> {
        let start = self.started("special_paths");
        let paths = self.inner.special_paths().await;
        self.finished_plain("special_paths", start);
        paths
    }

    fn system(&self) -> Option<Arc<dyn SystemView>> {
        self.inner.system()
    }

    fn logger(&self) -> Option<Arc<dyn Logger>> {
        self.inner.logger()
    }

    async fn setup(&self, ctx: &Context, config: BackendConfig) -> Result<()> {
        let start = self.started("setup");
        let result = self.inner.setup(ctx, config).await;
        self.finished("setup", start, &result);
        result
    }

    async fn initialize(&self, ctx: &Context) -> Result<()> {
        let start = self.started("initialize");
        let result = self.inner.initialize(ctx).await;
        self.finished("initialize", start, &result);
        result
    }

    async fn invalidate_key(&self, ctx: &Context, key: &str) {
        let start = self.started("invalidate_key");
        self.inner.invalidate_key(ctx, key).await;
        self.finished_plain("invalidate_key", start);
    }

    async fn cleanup(&self, ctx: &Context) {
        let start = self.started("cleanup");
        self.inner.cleanup(ctx).await;
        self.finished_plain("cleanup", start);
    }

    async fn backend_type(&self) -> BackendType {
        let start = self.started("type");
        let backend_type = self.inner.backend_type().await;
        self.finished_plain("type", start);
        backend_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{LogicalError, Operation};
    use tracing_test::traced_test;

    struct Fixed;

    #[async_trait]
    impl Backend for Fixed {
        async fn handle_request(&self, _ctx: &Context, req: Request) -> Result<Option<Response>> {
            if req.path == "fail" {
                return Err(LogicalError::UnsupportedPath);
            }
            Ok(None)
        }

        async fn handle_existence_check(
            &self,
            _ctx: &Context,
            _req: Request,
        ) -> Result<ExistenceCheck> {
            Ok(ExistenceCheck::found(true))
        }

        async fn special_paths(&self) -> Option<Paths> {
            None
        }

        fn system(&self) -> Option<Arc<dyn SystemView>> {
            None
        }

        fn logger(&self) -> Option<Arc<dyn Logger>> {
            None
        }

        async fn setup(&self, _ctx: &Context, _config: BackendConfig) -> Result<()> {
            Ok(())
        }

        async fn invalidate_key(&self, _ctx: &Context, _key: &str) {}

        async fn cleanup(&self, _ctx: &Context) {}

        async fn backend_type(&self) -> BackendType {
            BackendType::Logical
        }
    }

    fn request(path: &str) -> Request {
        Request { operation: Operation::Read, path: path.to_string(), ..Default::default() }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_results_pass_through_unchanged() {
        let backend = TracingBackend::new(Fixed, "fixed");
        let ctx = Context::background();

        assert_eq!(backend.handle_request(&ctx, request("ok")).await.unwrap(), None);
        assert_eq!(
            backend.handle_request(&ctx, request("fail")).await.unwrap_err(),
            LogicalError::UnsupportedPath
        );
        assert_eq!(
            backend.handle_existence_check(&ctx, request("ok")).await.unwrap(),
            ExistenceCheck::found(true)
        );
        assert_eq!(backend.backend_type().await, BackendType::Logical);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_logs_operation_status_and_error() {
        let backend = TracingBackend::new(Fixed, "fixed");
        let _ = backend.handle_request(&Context::background(), request("fail")).await;

        assert!(logs_contain("operation=\"handle_request\""));
        assert!(logs_contain("status=\"started\""));
        assert!(logs_contain("status=\"finished\""));
        assert!(logs_contain("took="));
        assert!(logs_contain("err=unsupported path"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_double_wrapping_logs_twice() {
        let backend = TracingBackend::new(TracingBackend::new(Fixed, "inner"), "outer");
        backend.cleanup(&Context::background()).await;

        logs_assert(|lines: &[&str]| {
            let finished = lines
                .iter()
                .filter(|l| l.contains("operation=\"cleanup\"") && l.contains("finished"))
                .count();
            if finished == 2 {
                Ok(())
            } else {
                Err(format!("expected 2 finished cleanup lines, saw {}", finished))
            }
        });
    }
}
