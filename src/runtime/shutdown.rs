//! Graceful shutdown handling
//!
//! Cancellation scopes for coordinated teardown. The process owns the root
//! signal; subsystems run under child scopes so that losing leadership can
//! cancel the dispatch subtree without touching registration or membership.

use tokio_util::sync::CancellationToken;

/// Root shutdown signal of one cluster instance
#[derive(Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Create a new shutdown signal
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Trigger shutdown of every scope derived from this signal
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been triggered
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Derive a child scope that is cancelled with this signal
    ///
    /// Cancelling the child does not affect the parent; this is what the
    /// leadership subtree hangs off.
    pub fn child_scope(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Resolves when shutdown is triggered
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_reaches_children() {
        let signal = ShutdownSignal::new();
        let child = signal.child_scope();

        let handle = tokio::spawn(async move {
            child.cancelled().await;
            42
        });

        signal.shutdown();
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn child_cancel_leaves_parent_running() {
        let signal = ShutdownSignal::new();
        let child = signal.child_scope();
        child.cancel();
        assert!(!signal.is_shutdown());
    }
}
