//! Server-wide shutdown: one token every connection watches, one tracker
//! that knows which connections are still tearing down.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Used when the caller gives no drain timeout.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of [`ShutdownCoordinator::graceful_shutdown`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every connection finished its teardown.
    Drained,
    /// The timeout elapsed with connections still open.
    TimedOut {
        /// Connections still running when the timeout fired.
        remaining: usize,
    },
}

impl DrainOutcome {
    /// Whether every connection finished.
    pub fn is_drained(self) -> bool {
        self == Self::Drained
    }
}

/// Owns the shutdown token and the set of live connections.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    connections: TaskTracker,
}

impl ShutdownCoordinator {
    /// Coordinator with no connections and shutdown not started.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            connections: TaskTracker::new(),
        }
    }

    /// Token handed to each connection.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tell every connection to start its teardown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a connection future so it counts as open until it completes.
    pub fn track_connection<F: Future>(&self, connection: F) -> TrackedFuture<F> {
        self.connections.track_future(connection)
    }

    /// Connections still running.
    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    /// Cancel the token, stop accepting tracked work, then wait up to
    /// `timeout` for open connections to finish their teardown.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) -> DrainOutcome {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);

        self.shutdown();
        let _ = self.connections.close();
        info!(
            open = self.connections.len(),
            timeout_ms = timeout.as_millis(),
            "draining connections"
        );

        match tokio::time::timeout(timeout, self.connections.wait()).await {
            Ok(()) => {
                info!("all connections closed");
                DrainOutcome::Drained
            }
            Err(_) => {
                let remaining = self.connections.len();
                warn!(remaining, "drain timed out after {timeout:?}");
                DrainOutcome::TimedOut { remaining }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
