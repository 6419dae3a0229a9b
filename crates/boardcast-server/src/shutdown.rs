//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use boardcast_hub::Hub;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coordinates graceful shutdown across the listener, sessions, and hub.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Shut everything down within `timeout`.
    ///
    /// 1. Cancel the token (listener stops accepting, sessions stop reading)
    /// 2. Evict every hub connection, closing its socket
    /// 3. Stop the hub's heartbeat and cleanup loops
    /// 4. Wait for `handles`, aborting whatever is still running at the deadline
    pub async fn graceful_shutdown(
        &self,
        hub: &Hub,
        handles: Vec<JoinHandle<()>>,
        timeout: Duration,
    ) {
        self.shutdown();
        let closed = hub.close_all();
        hub.shutdown(timeout).await;

        info!(
            task_count = handles.len(),
            closed_connections = closed,
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, join_all(handles)).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, aborting remaining tasks");
            for handle in aborts {
                handle.abort();
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
