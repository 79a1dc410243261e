// ABOUTME: CallTask: a spawned unit of work owned by one call.
// ABOUTME: Joinable for its result and aborted when dropped, so no work outlives its call.

use std::future::Future;

use tokio::task::JoinHandle;

use crate::error::StreamError;

/// A task spawned on behalf of a call.
pub struct CallTask<T> {
    inner: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> CallTask<T> {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            inner: Some(tokio::spawn(future)),
        }
    }

    /// Wait for the task. A panic inside the task is resumed here.
    pub async fn join(mut self) -> Result<T, StreamError> {
        let Some(handle) = self.inner.take() else {
            return Err(StreamError::Cancelled);
        };
        match handle.await {
            Ok(value) => Ok(value),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(StreamError::Cancelled),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }
}

impl<T> Drop for CallTask<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_join_returns_output() {
        let task = CallTask::spawn(async { 21 * 2 });
        assert_eq!(task.join().await, Ok(42));
    }

    #[tokio::test]
    async fn test_drop_aborts() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = CallTask::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = tx.send(());
        });
        assert!(!task.is_finished());
        drop(task);

        // The aborted task drops its sender without sending.
        assert!(rx.await.is_err());
    }
}
