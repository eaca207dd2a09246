use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::time::Duration;

use parking_lot::Mutex;
use quanta::Clock;
use quanta::Instant;

use super::Reason;
use super::Strategy;
use super::elapsed_nanos;

/// A simple window-based limiter.
///
/// A window opens at the first request after the previous one expired and admits up to
/// `capacity` requests until `interval` has passed. Windows are hard-reset rather than
/// smoothed: a burst at the end of one window followed by a burst at the start of the next can
/// admit `2 * capacity` requests within a little more than `interval`.
#[derive(Debug)]
pub struct FixedWindow {
    capacity: usize,
    /// Reset and admission must observe the same window, so both fields share one lock.
    window: Mutex<Window>,
    interval: u64,
    clock: Clock,
    anchor: Instant,
}

#[derive(Debug)]
struct Window {
    /// Nanos from anchor.
    start: u64,
    count: usize,
}

impl Strategy for FixedWindow {
    fn process(&self) -> ControlFlow<Reason> {
        let now = elapsed_nanos(&self.clock, self.anchor);
        let mut window = self.window.lock();

        if now.saturating_sub(window.start) > self.interval {
            window.start = now;
            window.count = 0;
        }

        if window.count < self.capacity {
            window.count += 1;
            return ControlFlow::Continue(());
        }

        // `now` may predate a reset made by a caller that locked first.
        let window_end = window.start + self.interval;
        ControlFlow::Break(Reason::Overloaded {
            retry_after: Duration::from_nanos(window_end.saturating_sub(now)),
        })
    }
}

impl FixedWindow {
    /// Creates a new `FixedWindow` strategy.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The maximum number of requests allowed within a single window.
    /// * `interval` - The duration of the fixed time window.
    pub fn new(capacity: NonZeroUsize, interval: Duration) -> Self {
        Self::with_clock(capacity, interval, Clock::new())
    }

    pub fn with_clock(capacity: NonZeroUsize, interval: Duration, clock: Clock) -> Self {
        let anchor = clock.now();
        Self {
            capacity: capacity.get(),
            window: Mutex::new(Window { start: 0, count: 0 }),
            interval: interval.as_nanos() as u64,
            clock,
            anchor,
        }
    }
}
