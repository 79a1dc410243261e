// ABOUTME: Tracks in-flight streaming calls for the server.
// ABOUTME: Hands out call IDs, ties every call to the server's shutdown token, and waits for them on exit.

use std::future::Future;

use streamcall_grpc::{CallContext, CallPattern, StreamError, StreamHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared bookkeeping for every call the server is running.
///
/// Cloning is cheap; clones see the same calls.
#[derive(Debug, Clone, Default)]
pub struct CallRegistry {
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a call ID and describe a newly accepted call.
    pub fn open(
        &self,
        method: &'static str,
        pattern: CallPattern,
        peer: Option<String>,
    ) -> Result<CallContext, StreamError> {
        if self.is_shutting_down() {
            return Err(StreamError::TransportFailure(
                "server is shutting down".to_string(),
            ));
        }
        let ctx = CallContext::new(Uuid::new_v4().to_string(), method, pattern).with_peer(peer);
        info!(
            call_id = %ctx.call_id,
            method,
            pattern = %pattern,
            peer = ctx.peer.as_deref().unwrap_or("unknown"),
            "Call accepted"
        );
        Ok(ctx)
    }

    /// Make `handle` observe server shutdown.
    pub fn attach<Out, In>(&self, handle: StreamHandle<Out, In>) -> StreamHandle<Out, In>
    where
        Out: Send + 'static,
        In: Send + 'static,
    {
        handle.with_parent(&self.shutdown)
    }

    /// Run a call body in its own task and log how it ended.
    pub fn spawn<F>(&self, ctx: CallContext, body: F)
    where
        F: Future<Output = Result<usize, StreamError>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            let outcome = body.await;
            log_outcome(&ctx, outcome.as_ref().map(|n| *n));
        });
    }

    /// Run a call body on the current task while counting it as active.
    pub async fn track<F, T>(&self, ctx: &CallContext, body: F) -> Result<T, StreamError>
    where
        F: Future<Output = Result<T, StreamError>>,
    {
        let outcome = self.tracker.track_future(body).await;
        log_outcome(ctx, outcome.as_ref().map(|_| 1));
        outcome
    }

    /// Number of calls still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every call, current and future.
    pub fn cancel_all(&self) {
        if !self.shutdown.is_cancelled() {
            info!(active = self.active(), "Cancelling in-flight calls");
        }
        self.shutdown.cancel();
    }

    /// Wait until every tracked call has finished.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Cancel everything and wait for it to wind down.
    pub async fn shutdown(&self) {
        self.cancel_all();
        self.wait().await;
    }
}

fn log_outcome(ctx: &CallContext, outcome: Result<usize, &StreamError>) {
    match outcome {
        Ok(messages) => {
            info!(call_id = %ctx.call_id, method = ctx.method, messages, "Call completed")
        }
        Err(err) if err.is_cancellation() => {
            info!(call_id = %ctx.call_id, method = ctx.method, error = %err, "Call cancelled")
        }
        Err(err) => {
            warn!(call_id = %ctx.call_id, method = ctx.method, error = %err, "Call failed")
        }
    }
}
