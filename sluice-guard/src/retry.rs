use std::future::Future;
use std::num::NonZeroUsize;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use crate::error::GuardError;

/// Call `op` up to `max_attempts` times, sleeping `delay` between failed attempts.
///
/// The delay is fixed; there is no backoff growth. Every error counts as a failure, including
/// [`GuardError::CircuitOpen`] when `op` goes through a [`CircuitBreaker`](crate::CircuitBreaker).
///
/// # Errors
///
/// [`GuardError::RetryExhausted`] carrying the last attempt's error.
pub async fn retry<T, E, F, Fut>(
    max_attempts: NonZeroUsize,
    delay: Duration,
    mut op: F,
) -> Result<T, GuardError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(source) if attempt >= max_attempts.get() => {
                warn!(attempts = attempt, "retries exhausted");
                return Err(GuardError::RetryExhausted {
                    attempts: attempt,
                    source,
                });
            }
            Err(_) => {
                debug!(attempt, ?delay, "attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Blocking counterpart of [`retry`]. Sleeps the calling thread between attempts.
pub fn retry_blocking<T, E, F>(
    max_attempts: NonZeroUsize,
    delay: Duration,
    mut op: F,
) -> Result<T, GuardError<E>>
where
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(source) if attempt >= max_attempts.get() => {
                warn!(attempts = attempt, "retries exhausted");
                return Err(GuardError::RetryExhausted {
                    attempts: attempt,
                    source,
                });
            }
            Err(_) => {
                debug!(attempt, ?delay, "attempt failed, retrying");
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
