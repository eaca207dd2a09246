use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Monotonic counters maintained by the pool.
///
/// These are observability data only. Idle and active gauges are never counted here; they
/// are read from the pool's own sets.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub(crate) created: AtomicU64,
    pub(crate) borrowed: AtomicU64,
    pub(crate) returned: AtomicU64,
    pub(crate) destroyed: AtomicU64,
    pub(crate) invalidated: AtomicU64,
    pub(crate) evicted: AtomicU64,
    pub(crate) timeouts: AtomicU64,
}

impl PoolCounters {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, active: usize, idle: usize) -> PoolStatistics {
        PoolStatistics {
            created: self.created.load(Ordering::Relaxed),
            borrowed: self.borrowed.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            active,
            idle,
        }
    }
}

/// Point-in-time occupancy of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// `active + idle`; never above `max`.
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    pub max: usize,
    pub shutdown: bool,
}

/// Lifetime counters plus live gauges of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatistics {
    /// Resources created by the factory, warm-up included.
    pub created: u64,
    pub borrowed: u64,
    pub returned: u64,
    /// Resources handed to `ResourceFactory::destroy`.
    pub destroyed: u64,
    /// Resources that failed a validity check.
    pub invalidated: u64,
    /// Idle resources removed by the eviction pass to shrink the pool.
    pub evicted: u64,
    /// Borrows that gave up at their deadline.
    pub timeouts: u64,
    pub active: usize,
    pub idle: usize,
}

impl PoolStatistics {
    /// Fraction of borrows served without creating a new resource.
    pub fn reuse_rate(&self) -> f64 {
        if self.borrowed == 0 {
            return 0.0;
        }
        let reused = self.borrowed.saturating_sub(self.created);
        reused as f64 / self.borrowed as f64
    }
}
