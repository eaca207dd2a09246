use std::future::Future;
use std::time::Duration;

use tokio::task::JoinError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::GuardError;

/// Run `future` as its own task and give up on it after `timeout`.
///
/// On timeout, or when the returned future is dropped first, the task is aborted. Cancellation
/// is best effort: the task stops at its next `.await`, so work between two await points still
/// completes. A panic inside `future` is resumed on the caller.
///
/// # Errors
///
/// * [`GuardError::OperationTimeout`] if `future` did not finish in time.
/// * [`GuardError::Inner`] with the future's own error.
/// * [`GuardError::Cancelled`] if the task was cancelled by the runtime.
pub async fn with_timeout<T, E, Fut>(timeout: Duration, future: Fut) -> Result<T, GuardError<E>>
where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let mut task = AbortOnDrop(tokio::spawn(future));
    match tokio::time::timeout(timeout, &mut task.0).await {
        Ok(joined) => settle(joined),
        // `task` aborts the operation when it drops on return.
        Err(_) => {
            debug!(?timeout, "operation timed out, task aborted");
            Err(GuardError::OperationTimeout(timeout))
        }
    }
}

/// Run the blocking `op` on tokio's blocking pool and give up on it after `timeout`.
///
/// A blocking closure cannot be interrupted: after a timeout it keeps running to completion
/// on its pool thread and its result is discarded.
pub async fn with_timeout_blocking<T, E, F>(timeout: Duration, op: F) -> Result<T, GuardError<E>>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let mut task = tokio::task::spawn_blocking(op);
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => settle(joined),
        Err(_) => {
            debug!(?timeout, "blocking operation timed out and keeps running");
            Err(GuardError::OperationTimeout(timeout))
        }
    }
}

/// Aborts the task unless it already finished.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn settle<T, E>(joined: Result<Result<T, E>, JoinError>) -> Result<T, GuardError<E>> {
    match joined {
        Ok(result) => result.map_err(GuardError::Inner),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => Err(GuardError::Cancelled),
    }
}
