//! # sluice-limit
//!
//! `sluice-limit` provides the rate limiting strategies used for admission control in `sluice`.
//!
//! ## Core Philosophy
//!
//! A limiter sits in front of every request, so its critical section must be tiny.
//! [`TokenBucket`] keeps its state in atomics and moves it forward with Compare-And-Swap (CAS)
//! loops. [`FixedWindow`] and [`SlidingWindow`] update several fields together, so they guard
//! them with a short `parking_lot` lock that is never held across caller code.
//!
//! ## Key Concepts
//!
//! * **Lazy Evaluation**: Tokens and windows are recalculated at the moment of the request,
//!   eliminating the need for background worker threads or timers.
//! * **Side-effect free rejection**: A rejected request never consumes capacity.
//! * **Strategy Trait**: A unified interface for different limiting algorithms.
//! * **Mockable time**: Every strategy reads a [`quanta::Clock`], so tests can drive time with
//!   [`quanta::Clock::mock`].
//!
//! ## Example
//!
//! ```rust
//! use sluice_limit::TokenBucket;
//! use sluice_limit::Strategy;
//! use std::time::Duration;
//! use std::num::NonZeroUsize;
//!
//! let capacity = NonZeroUsize::new(10).unwrap();
//! let refill = NonZeroUsize::new(10).unwrap();
//! let bucket = TokenBucket::new(capacity, refill, Duration::from_secs(1));
//!
//! if bucket.allow() {
//!     // Request admitted
//! }
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

mod fixed_window;
mod sliding_window;
mod token_bucket;

pub use fixed_window::FixedWindow;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

/// Reasons why a request might be rejected by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}

/// The core trait for all rate-limiting algorithms.
///
/// Strategies are shared across threads via `Arc`, so implementations are expected to be
/// `Send` and `Sync`.
pub trait Strategy: Debug {
    /// Attempts to admit a single request.
    ///
    /// This method never blocks beyond the strategy's own short critical section.
    ///
    /// # Errors
    ///
    /// Breaks with a [`Reason`] if the rate limit has been reached.
    fn process(&self) -> ControlFlow<Reason>;

    /// Returns `true` if the request is admitted.
    fn allow(&self) -> bool {
        self.process().is_continue()
    }
}

/// Nanoseconds elapsed between `anchor` and `now`.
#[inline]
pub(crate) fn elapsed_nanos(clock: &quanta::Clock, anchor: quanta::Instant) -> u64 {
    clock.now().duration_since(anchor).as_nanos() as u64
}
