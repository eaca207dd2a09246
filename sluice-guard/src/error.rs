use std::time::Duration;

/// Errors produced by the guard helpers.
///
/// `E` is the error type of the guarded operation. It is never swallowed: it is returned as
/// [`GuardError::Inner`], or as the source of [`GuardError::RetryExhausted`].
#[derive(Debug, thiserror::Error)]
pub enum GuardError<E> {
    /// The circuit breaker is open and the operation was not invoked.
    #[error("circuit is open; retry after {retry_after:?}")]
    CircuitOpen {
        /// Time left before the breaker lets a probe through.
        retry_after: Duration,
    },

    /// Every attempt failed. `source` is the error of the last attempt.
    #[error("operation failed after {attempts} attempts")]
    RetryExhausted {
        attempts: usize,
        #[source]
        source: E,
    },

    /// The operation did not complete in time. It may still be running.
    #[error("operation timed out after {0:?}")]
    OperationTimeout(Duration),

    /// The task running the operation was cancelled, e.g. because the runtime shut down.
    #[error("operation was cancelled")]
    Cancelled,

    /// The operation itself failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> GuardError<E> {
    /// The operation's own error, if this failure carries one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(err) | Self::RetryExhausted { source: err, .. } => Some(err),
            _ => None,
        }
    }

    /// Returns `true` if the operation was not invoked because the circuit is open.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Requests turned away by the `tower` layers before reaching the inner service.
///
/// Rejections are boxed into [`tower::BoxError`]; use `downcast_ref::<Rejected>()` to recover
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    /// The admission strategy refused the request.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header.
    #[error("rate limit exceeded; retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The circuit breaker is open.
    ///
    /// When the `axum` feature is enabled, this converts to `503 Service Unavailable`
    /// with a `Retry-After` header.
    #[error("circuit is open; retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },
}

impl Rejected {
    pub fn retry_after(&self) -> Duration {
        match self {
            Self::RateLimited { retry_after } | Self::CircuitOpen { retry_after } => *retry_after,
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Rejected {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        let secs = self.retry_after().as_secs().max(1);

        let mut response = (status, self.to_string()).into_response();
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            axum::http::HeaderValue::from(secs),
        );
        response
    }
}
