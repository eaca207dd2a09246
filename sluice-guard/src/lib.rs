//! # sluice-guard
//!
//! `sluice-guard` protects calls to a flaky dependency. It provides:
//!
//! * [`CircuitBreaker`]: fails fast after repeated failures and lets a single probe decide
//!   when to recover. Its state is one atomic word, so no lock is ever held across the
//!   guarded call.
//! * [`retry`] / [`retry_blocking`]: fixed-delay retries that report the last failure.
//! * [`with_timeout`] / [`with_timeout_blocking`]: deadlines for async and blocking
//!   operations, with best-effort cancellation.
//! * [`AdmissionLayer`] and [`CircuitBreakerLayer`]: the same guards as
//!   [Tower](https://github.com/tower-rs/tower) middleware. Rejections are reported as
//!   [`Rejected`] errors and counted through `opentelemetry`.
//!
//! The helpers are independent and compose freely:
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use std::time::Duration;
//!
//! use sluice_guard::CircuitBreaker;
//! use sluice_guard::GuardError;
//! use sluice_guard::retry_blocking;
//!
//! let breaker = CircuitBreaker::new(NonZeroUsize::new(3).unwrap(), Duration::from_secs(30));
//! let attempts = NonZeroUsize::new(2).unwrap();
//!
//! let answer: Result<u32, GuardError<GuardError<std::io::Error>>> =
//!     retry_blocking(attempts, Duration::from_millis(10), || breaker.call(|| Ok(42)));
//! assert_eq!(answer.unwrap(), 42);
//! ```
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`Rejected`], converting rejections to
//!   `429 Too Many Requests` or `503 Service Unavailable` with a `Retry-After` header.

mod breaker;
mod error;
mod layer;
mod retry;
mod service;
mod timeout;

#[cfg(test)]
mod tests;

pub use breaker::CircuitBreaker;
pub use breaker::CircuitState;
pub use error::GuardError;
pub use error::Rejected;
pub use layer::AdmissionLayer;
pub use layer::CircuitBreakerLayer;
pub use retry::retry;
pub use retry::retry_blocking;
pub use service::AdmissionService;
pub use service::CircuitBreakerService;
pub use service::ResponseFuture;
pub use timeout::with_timeout;
pub use timeout::with_timeout_blocking;
