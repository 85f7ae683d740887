//! Server stop sequencing around the context's shutdown token.
//!
//! The coordinator does not own a token of its own: it wraps the one in
//! [`RpcContext`](codot_rpc::RpcContext), so cancelling it also ends client
//! sessions, `/game` sessions and suspended command waits (`run_and_capture`,
//! `wait_for_output`).

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels the shared token and drains server tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Wrap the token shared with the handler context.
    pub fn with_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Get a clone of the shared token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the shared token. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the shared token has been cancelled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel, then give `handles` up to `timeout` to finish. Tasks still
    /// running afterwards are left detached.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Duration) {
        self.shutdown();
        info!(tasks = handles.len(), timeout_ms = timeout.as_millis(), "draining server tasks");
        if tokio::time::timeout(timeout, futures::future::join_all(handles)).await.is_err() {
            warn!("server tasks still running after {timeout:?}");
        }
    }
}
