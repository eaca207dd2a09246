use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::time::Duration;

use parking_lot::Mutex;
use quanta::Clock;
use quanta::Instant;

use super::Reason;
use super::Strategy;
use super::elapsed_nanos;

/// A Sliding Window Log implementation.
///
/// Every admitted request is recorded with its arrival time. A request is admitted when fewer
/// than `capacity` recorded requests are younger than `period`. Unlike the fixed window there is
/// no boundary burst, at the cost of `O(capacity)` memory.
#[derive(Debug)]
pub struct SlidingWindow {
    capacity: usize,
    period_ns: u64,
    /// Arrival times (nanos from anchor), oldest first.
    log: Mutex<VecDeque<u64>>,
    clock: Clock,
    anchor: Instant,
}

impl SlidingWindow {
    pub fn new(capacity: NonZeroUsize, period: Duration) -> Self {
        Self::with_clock(capacity, period, Clock::new())
    }

    pub fn with_clock(capacity: NonZeroUsize, period: Duration, clock: Clock) -> Self {
        let anchor = clock.now();
        Self {
            capacity: capacity.get(),
            period_ns: period.as_nanos() as u64,
            log: Mutex::new(VecDeque::with_capacity(capacity.get())),
            clock,
            anchor,
        }
    }

    /// Number of requests currently recorded inside the window.
    pub fn in_window(&self) -> usize {
        let now = elapsed_nanos(&self.clock, self.anchor);
        let mut log = self.log.lock();
        self.expire(&mut log, now);
        log.len()
    }

    fn expire(&self, log: &mut VecDeque<u64>, now: u64) {
        while let Some(&oldest) = log.front() {
            if now.saturating_sub(oldest) > self.period_ns {
                log.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Strategy for SlidingWindow {
    #[inline]
    fn process(&self) -> ControlFlow<Reason> {
        let now = elapsed_nanos(&self.clock, self.anchor);
        let mut log = self.log.lock();
        self.expire(&mut log, now);

        if log.len() < self.capacity {
            // `now` was read before taking the lock; clamp it so the log stays sorted.
            let now = now.max(log.back().copied().unwrap_or(0));
            log.push_back(now);
            ControlFlow::Continue(())
        } else {
            let oldest = log.front().copied().unwrap_or(now);
            let ages_out = oldest + self.period_ns;
            ControlFlow::Break(Reason::Overloaded {
                retry_after: Duration::from_nanos(ages_out.saturating_sub(now)),
            })
        }
    }
}
