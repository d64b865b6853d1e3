//! Request execution with a hard deadline.
//!
//! The send runs on its own task so the deadline holds regardless of how the
//! transport blocks. On expiry the task is aborted, which drops the in-flight
//! request (and its connection) without waiting for the transport to notice.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::transport::{HttpRequest, HttpResponse, Transport};
use crate::error::{ConfError, ConfResult};

/// Executes requests against a [`Transport`] with per-call deadlines.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor").finish_non_exhaustive()
    }
}

/// Aborts the send task when dropped, so an abandoned call never leaks a request.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send `request`, failing with [`ConfError::Timeout`] if no complete
    /// response arrives within `timeout`.
    pub async fn execute(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> ConfResult<HttpResponse> {
        let transport = Arc::clone(&self.transport);
        let mut task = AbortOnDrop(tokio::spawn(async move { transport.send(request).await }));

        tokio::select! {
            joined = &mut task.0 => match joined {
                Ok(result) => result,
                Err(e) => Err(ConfError::Network {
                    message: format!("request task failed: {}", e),
                }),
            },
            _ = tokio::time::sleep(timeout) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "request deadline expired, cancelling");
                task.0.abort();
                Err(ConfError::Timeout { timeout })
            }
        }
    }
}
