//! Graceful shutdown coordination via `CancellationToken`.
//!
//! One coordinator is shared by the HTTP server, every chat session, and the
//! binary's signal handler. Cancelling it stops accepting connections and
//! asks each live session to close.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long to wait for server tasks after shutdown is requested.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared shutdown signal.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A clone of the underlying token for tasks to watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("shutdown requested");
        }
        self.token.cancel();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request shutdown, then wait up to `timeout` for `handles` to finish.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for server tasks to finish"
        );

        let finished = tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_ok();
        if !finished {
            warn!("shutdown timed out after {timeout:?}");
        }
        finished
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let coord = ShutdownCoordinator::default();
        assert!(!coord.is_shutting_down());
        assert!(!coord.token().is_cancelled());
    }

    #[test]
    fn shutdown_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let tokens = [coord.token(), coord.token()];
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(tokens.iter().all(CancellationToken::is_cancelled));
    }

    #[tokio::test]
    async fn drain_awaits_cooperative_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let handle = tokio::spawn(async move { token.cancelled().await });
        assert!(coord.drain(vec![handle], None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_on_stuck_task() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        assert!(!coord.drain(vec![handle], Some(Duration::from_millis(100))).await);
        assert!(coord.is_shutting_down());
    }
}
