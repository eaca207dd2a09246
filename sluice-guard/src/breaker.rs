use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use quanta::Clock;
use quanta::Instant;
use tracing::info;
use tracing::warn;

use crate::error::GuardError;

// The breaker's whole state is one word: the state in the top two bits and the nanoseconds
// (from `anchor`) of its last transition in the rest.
const STATE_SHIFT: u32 = 62;
const TIME_MASK: u64 = (1 << STATE_SHIFT) - 1;

/// Point-in-time state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls run normally.
    Closed = 0,
    /// Calls fail fast until the open duration has passed.
    Open = 1,
    /// A single probe call is deciding whether to close again.
    HalfOpen = 2,
}

impl CircuitState {
    fn from_word(word: u64) -> Self {
        match word >> STATE_SHIFT {
            0 => Self::Closed,
            1 => Self::Open,
            _ => Self::HalfOpen,
        }
    }
}

fn pack(state: CircuitState, nanos: u64) -> u64 {
    ((state as u64) << STATE_SHIFT) | (nanos & TIME_MASK)
}

/// Permission to run one guarded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Normal,
    /// The half-open probe elected at `started`.
    Probe { started: u64 },
}

/// Trips open after `failure_threshold` consecutive failures and fails fast for
/// `open_duration`, then lets exactly one probe call decide whether to close again.
///
/// The breaker never holds a lock while the guarded operation runs. A probe that never
/// reports back, because its future was dropped, is replaced by a new probe once
/// `open_duration` has passed since it started.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: usize,
    open_ns: u64,
    word: AtomicU64,
    failures: AtomicUsize,
    clock: Clock,
    anchor: Instant,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: NonZeroUsize, open_duration: Duration) -> Self {
        Self::with_clock(failure_threshold, open_duration, Clock::new())
    }

    pub fn with_clock(
        failure_threshold: NonZeroUsize,
        open_duration: Duration,
        clock: Clock,
    ) -> Self {
        let anchor = clock.now();
        Self {
            failure_threshold: failure_threshold.get(),
            open_ns: (open_duration.as_nanos() as u64).min(TIME_MASK),
            word: AtomicU64::new(pack(CircuitState::Closed, 0)),
            failures: AtomicUsize::new(0),
            clock,
            anchor,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_word(self.word.load(Ordering::Acquire))
    }

    /// Consecutive failures seen while closed.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    pub fn open_duration(&self) -> Duration {
        Duration::from_nanos(self.open_ns)
    }

    /// Run `op` if the breaker admits it.
    ///
    /// # Errors
    ///
    /// * [`GuardError::CircuitOpen`] without invoking `op` while the breaker is open, or while
    ///   another caller's probe is in flight.
    /// * [`GuardError::Inner`] with `op`'s own error.
    pub fn call<T, E, F>(&self, op: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let admission = self
            .acquire()
            .map_err(|retry_after| GuardError::CircuitOpen { retry_after })?;

        let result = op();
        self.record(admission, result.is_ok());
        result.map_err(GuardError::Inner)
    }

    /// Async counterpart of [`call`](Self::call).
    pub async fn call_async<T, E, F, Fut>(&self, op: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self
            .acquire()
            .map_err(|retry_after| GuardError::CircuitOpen { retry_after })?;

        let result = op().await;
        self.record(admission, result.is_ok());
        result.map_err(GuardError::Inner)
    }

    fn now(&self) -> u64 {
        (self.clock.now().duration_since(self.anchor).as_nanos() as u64) & TIME_MASK
    }

    /// Ask to run one call. Breaks with the time left before a probe may run.
    pub(crate) fn acquire(&self) -> Result<Admission, Duration> {
        let mut word = self.word.load(Ordering::Acquire);
        loop {
            if CircuitState::from_word(word) == CircuitState::Closed {
                return Ok(Admission::Normal);
            }

            // Open since the stored time, or half-open with a probe that started then.
            let now = self.now();
            let elapsed = now.saturating_sub(word & TIME_MASK);
            if elapsed <= self.open_ns {
                return Err(Duration::from_nanos(self.open_ns - elapsed));
            }

            let probe = pack(CircuitState::HalfOpen, now);
            match self
                .word
                .compare_exchange(word, probe, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    info!("circuit half-open, admitting probe");
                    return Ok(Admission::Probe { started: now });
                }
                Err(actual) => word = actual,
            }
        }
    }

    /// Report the outcome of a call admitted by [`acquire`](Self::acquire).
    pub(crate) fn record(&self, admission: Admission, success: bool) {
        match (admission, success) {
            (Admission::Normal, true) => {
                self.failures.store(0, Ordering::Release);
            }
            (Admission::Normal, false) => {
                let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures < self.failure_threshold {
                    return;
                }
                let word = self.word.load(Ordering::Acquire);
                if CircuitState::from_word(word) == CircuitState::Closed
                    && self
                        .word
                        .compare_exchange(
                            word,
                            pack(CircuitState::Open, self.now()),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    warn!(failures, "circuit opened");
                }
            }
            (Admission::Probe { started }, true) => {
                self.failures.store(0, Ordering::Release);
                if self.transition(started, CircuitState::Closed) {
                    info!("probe succeeded, circuit closed");
                }
            }
            (Admission::Probe { started }, false) => {
                if self.transition(started, CircuitState::Open) {
                    warn!("probe failed, circuit re-opened");
                }
            }
        }
    }

    /// Leave half-open, unless the probe elected at `started` has been superseded.
    fn transition(&self, started: u64, to: CircuitState) -> bool {
        self.word
            .compare_exchange(
                pack(CircuitState::HalfOpen, started),
                pack(to, self.now()),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
