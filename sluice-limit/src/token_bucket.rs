use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use quanta::Clock;
use quanta::Instant;

use super::Reason;
use super::Strategy;
use super::elapsed_nanos;

/// A bucket of `capacity` tokens, topped up by `refill` tokens every `interval`.
///
/// The bucket starts full. Refill is lazy: each request credits the whole intervals that have
/// passed since the last refill, and the refill clock only advances by those whole intervals,
/// so a partially elapsed interval is never lost.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: usize,
    tokens: AtomicUsize,
    refill: usize,
    interval_ns: u64,
    /// Nanoseconds from `anchor` at which the current refill interval began.
    last_refill: AtomicU64,
    clock: Clock,
    anchor: Instant,
}

impl Strategy for TokenBucket {
    fn process(&self) -> ControlFlow<Reason> {
        let now = elapsed_nanos(&self.clock, self.anchor);
        self.refill(now);

        let taken = self
            .tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                tokens.checked_sub(1)
            });

        match taken {
            Ok(_) => ControlFlow::Continue(()),
            Err(_) => {
                let last = self.last_refill.load(Ordering::Acquire);
                let next_refill = last + self.interval_ns;
                ControlFlow::Break(Reason::Overloaded {
                    retry_after: Duration::from_nanos(next_refill.saturating_sub(now)),
                })
            }
        }
    }
}

impl TokenBucket {
    pub fn new(capacity: NonZeroUsize, refill: NonZeroUsize, interval: Duration) -> Self {
        Self::with_clock(capacity, refill, interval, Clock::new())
    }

    pub fn with_clock(
        capacity: NonZeroUsize,
        refill: NonZeroUsize,
        interval: Duration,
        clock: Clock,
    ) -> Self {
        let anchor = clock.now();
        Self {
            capacity: capacity.get(),
            tokens: AtomicUsize::new(capacity.get()),
            refill: refill.get(),
            // A zero interval would make every division below meaningless.
            interval_ns: (interval.as_nanos() as u64).max(1),
            last_refill: AtomicU64::new(0),
            clock,
            anchor,
        }
    }

    /// Tokens currently in the bucket, without refilling.
    pub fn available(&self) -> usize {
        self.tokens.load(Ordering::Acquire)
    }

    fn refill(&self, now: u64) {
        let mut last = self.last_refill.load(Ordering::Acquire);
        loop {
            let intervals = now.saturating_sub(last) / self.interval_ns;
            if intervals == 0 {
                return;
            }

            // Claim the elapsed intervals first so that only one caller credits them.
            let next = last + intervals * self.interval_ns;
            match self.last_refill.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let added = (intervals as usize).saturating_mul(self.refill);
                    let _ = self
                        .tokens
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                            Some(tokens.saturating_add(added).min(self.capacity))
                        });
                    return;
                }
                Err(actual) => last = actual,
            }
        }
    }
}
