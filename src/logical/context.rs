//! Call context carrying a deadline and a cancellation signal.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Per-call context passed to every [`Backend`](super::Backend) operation.
///
/// The modern transport forwards the deadline across the process boundary
/// and aborts the remote call on cancellation. The legacy transport has no
/// native cancellation and ignores both.
#[derive(Debug, Clone)]
pub struct Context {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl Context {
    /// A context with no deadline that is never cancelled unless asked to.
    pub fn background() -> Self {
        Self { deadline: None, token: CancellationToken::new() }
    }

    /// Derive a context that expires after `timeout`.
    ///
    /// The earlier of the existing and the new deadline wins.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context with an absolute deadline.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self { deadline: Some(deadline), token: self.token.child_token() }
    }

    /// Derive a context cancelled together with this one.
    pub fn child(&self) -> Self {
        Self { deadline: self.deadline, token: self.token.child_token() }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once this context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Resolves once this context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline.into()) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earlier_deadline_wins() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let relaxed = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline(), relaxed.deadline());
    }

    #[test]
    fn test_child_cancelled_with_parent() {
        let parent = Context::background();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_parent_not_cancelled_by_child() {
        let parent = Context::background();
        let child = parent.with_timeout(Duration::from_secs(5));
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_done_fires_on_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(2), ctx.done()).await.unwrap();
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }
}
