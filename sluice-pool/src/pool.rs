use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Condvar;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::evictor::Evictor;
use crate::resource::Resource;
use crate::resource::ResourceFactory;
use crate::resource::ResourceId;
use crate::stats::PoolCounters;
use crate::stats::PoolStatistics;
use crate::stats::PoolStatus;

type PoolResult<T, F> = Result<T, PoolError<<F as ResourceFactory>::Error>>;

struct Idle<R> {
    id: ResourceId,
    resource: Arc<R>,
}

/// Idle queue and active set. Every membership change happens under one lock.
struct Sets<R> {
    /// Oldest first: borrow and eviction take from the front, returns go to the back.
    idle: VecDeque<Idle<R>>,
    active: HashMap<ResourceId, Arc<R>>,
    /// Factory calls in flight. Each holds a unit of capacity while it runs outside the lock.
    creating: usize,
}

impl<R> Sets<R> {
    fn total(&self) -> usize {
        self.idle.len() + self.active.len()
    }
}

pub(crate) struct Shared<F: ResourceFactory> {
    config: PoolConfig,
    factory: F,
    sets: Mutex<Sets<F::Resource>>,
    /// Signalled whenever a resource or a unit of capacity becomes available.
    available: Condvar,
    /// Only ever set while holding `sets`.
    shutdown: AtomicBool,
    next_id: AtomicU64,
    counters: PoolCounters,
}

impl<F: ResourceFactory> Shared<F> {
    fn new(config: PoolConfig, factory: F) -> Self {
        Self {
            sets: Mutex::new(Sets {
                idle: VecDeque::with_capacity(config.max_size),
                active: HashMap::with_capacity(config.max_size),
                creating: 0,
            }),
            config,
            factory,
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            counters: PoolCounters::default(),
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn next_id(&self) -> ResourceId {
        ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn validate(&self, resource: &F::Resource) -> bool {
        self.factory.validate(
            resource,
            self.config.validation_timeout,
            self.config.validation_query.as_deref(),
        )
    }

    fn destroy(&self, id: ResourceId, resource: &F::Resource) {
        PoolCounters::bump(&self.counters.destroyed);
        if let Err(err) = self.factory.destroy(resource).map_err(PoolError::Destroy) {
            warn!(resource = %id, error = ?err, "failed to destroy resource");
        }
    }

    fn warm_up(&self) -> Result<(), F::Error> {
        for _ in 0..self.config.initial_size {
            let resource = self.factory.create()?;
            let id = self.next_id();
            PoolCounters::bump(&self.counters.created);
            self.sets.lock().idle.push_back(Idle {
                id,
                resource: Arc::new(resource),
            });
        }
        Ok(())
    }

    fn acquire(&self, timeout: Duration) -> PoolResult<(ResourceId, Arc<F::Resource>), F> {
        // An unrepresentable deadline means "wait for as long as it takes".
        let deadline = Instant::now().checked_add(timeout);
        let mut sets = self.sets.lock();

        loop {
            if self.is_shut_down() {
                return Err(PoolError::Shutdown);
            }

            if let Some(Idle { id, resource }) = sets.idle.pop_front() {
                // Tracked as active before validation so that shutdown can always find it.
                sets.active.insert(id, Arc::clone(&resource));
                drop(sets);

                if !self.config.test_on_borrow || self.validate(&resource) {
                    if self.is_shut_down() {
                        return Err(PoolError::Shutdown);
                    }
                    PoolCounters::bump(&self.counters.borrowed);
                    debug!(resource = %id, "borrowed idle resource");
                    return Ok((id, resource));
                }

                debug!(resource = %id, "idle resource failed validation on borrow");
                PoolCounters::bump(&self.counters.invalidated);
                self.retire(id, &resource);

                // Only waiting is bounded by the deadline; the freed slot may be refilled below.
                sets = self.sets.lock();
                continue;
            }

            if sets.total() + sets.creating < self.config.max_size {
                sets.creating += 1;
                drop(sets);
                return self.create_active();
            }

            match deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    return Err(self.timed_out(timeout));
                }
                Some(deadline) => {
                    self.available.wait_until(&mut sets, deadline);
                }
                None => self.available.wait(&mut sets),
            }
        }
    }

    /// Runs the factory for a borrower that already reserved capacity.
    fn create_active(&self) -> PoolResult<(ResourceId, Arc<F::Resource>), F> {
        let created = self.factory.create();

        let mut sets = self.sets.lock();
        sets.creating -= 1;
        let resource = match created {
            Ok(resource) => resource,
            Err(err) => {
                drop(sets);
                self.available.notify_one();
                debug!(error = %err, "resource creation failed");
                return Err(PoolError::Create(err));
            }
        };

        let id = self.next_id();
        PoolCounters::bump(&self.counters.created);
        if self.is_shut_down() {
            drop(sets);
            self.destroy(id, &resource);
            return Err(PoolError::Shutdown);
        }

        let resource = Arc::new(resource);
        sets.active.insert(id, Arc::clone(&resource));
        drop(sets);

        PoolCounters::bump(&self.counters.borrowed);
        debug!(resource = %id, "created resource for borrower");
        Ok((id, resource))
    }

    fn timed_out(&self, timeout: Duration) -> PoolError<F::Error> {
        PoolCounters::bump(&self.counters.timeouts);
        debug!(?timeout, "borrow timed out");
        PoolError::Timeout(timeout)
    }

    /// Take an active resource out of the pool and destroy it.
    fn retire(&self, id: ResourceId, resource: &F::Resource) {
        let removed = self.sets.lock().active.remove(&id).is_some();
        if removed {
            self.destroy(id, resource);
            self.available.notify_one();
        }
    }

    fn check_in(&self, id: ResourceId, resource: &Arc<F::Resource>, reusable: bool) {
        let mut reusable = reusable && !resource.is_closed();
        if reusable && self.config.test_on_return && !self.validate(resource) {
            debug!(resource = %id, "returned resource failed validation");
            PoolCounters::bump(&self.counters.invalidated);
            reusable = false;
        }

        let mut sets = self.sets.lock();
        // Not active any more: shutdown drained and destroyed it.
        if sets.active.remove(&id).is_none() {
            return;
        }
        PoolCounters::bump(&self.counters.returned);

        if reusable && sets.idle.len() < self.config.max_size {
            sets.idle.push_back(Idle {
                id,
                resource: Arc::clone(resource),
            });
            drop(sets);
            self.available.notify_one();
            return;
        }

        drop(sets);
        self.destroy(id, resource);
        self.available.notify_one();
    }

    pub(crate) fn evict(&self) -> usize {
        if self.is_shut_down() {
            return 0;
        }
        let invalid = if self.config.test_while_idle {
            self.validate_idle()
        } else {
            0
        };

        let doomed: Vec<Idle<F::Resource>> = {
            let mut sets = self.sets.lock();
            if self.is_shut_down() {
                return invalid;
            }
            let proportional = (sets.total() as f64 * 0.1).round() as usize;
            let target = self.config.min_idle.max(proportional);
            let excess = sets.idle.len().saturating_sub(target);
            sets.idle.drain(..excess).collect()
        };

        for Idle { id, resource } in &doomed {
            PoolCounters::bump(&self.counters.evicted);
            self.destroy(*id, resource);
        }
        invalid + doomed.len()
    }

    /// Destroy idle resources that fail validation. Validation runs outside the lock.
    fn validate_idle(&self) -> usize {
        let snapshot: Vec<(ResourceId, Arc<F::Resource>)> = self
            .sets
            .lock()
            .idle
            .iter()
            .map(|idle| (idle.id, Arc::clone(&idle.resource)))
            .collect();

        let mut removed = 0;
        for (id, resource) in snapshot {
            if self.validate(&resource) {
                continue;
            }
            PoolCounters::bump(&self.counters.invalidated);

            let still_idle = {
                let mut sets = self.sets.lock();
                let position = sets.idle.iter().position(|idle| idle.id == id);
                position.and_then(|at| sets.idle.remove(at)).is_some()
            };
            // A borrower took it in the meantime; borrow-time validation will catch it.
            if still_idle {
                debug!(resource = %id, "idle resource failed validation");
                self.destroy(id, &resource);
                self.available.notify_one();
                removed += 1;
            }
        }
        removed
    }

    fn shutdown(&self) {
        let drained: Vec<(ResourceId, Arc<F::Resource>)> = {
            let mut guard = self.sets.lock();
            if self.shutdown.swap(true, Ordering::AcqRel) {
                return;
            }
            let sets = &mut *guard;
            let mut drained: Vec<_> = sets
                .idle
                .drain(..)
                .map(|idle| (idle.id, idle.resource))
                .collect();
            drained.extend(sets.active.drain());
            drained
        };
        self.available.notify_all();

        info!(resources = drained.len(), "shutting down pool");
        for (id, resource) in &drained {
            self.destroy(*id, resource);
        }
    }

    fn status(&self) -> PoolStatus {
        let sets = self.sets.lock();
        PoolStatus {
            total: sets.total(),
            active: sets.active.len(),
            idle: sets.idle.len(),
            max: self.config.max_size,
            shutdown: self.is_shut_down(),
        }
    }

    fn statistics(&self) -> PoolStatistics {
        let sets = self.sets.lock();
        self.counters.snapshot(sets.active.len(), sets.idle.len())
    }
}

/// A bounded pool of reusable resources.
///
/// Borrowers receive a [`Pooled`] handle which returns the resource when dropped. Dropping the
/// pool shuts it down.
pub struct Pool<F: ResourceFactory> {
    shared: Arc<Shared<F>>,
    evictor: Mutex<Option<Evictor>>,
}

impl<F: ResourceFactory> Pool<F> {
    /// Validate `config`, create `initial_size` resources and start the eviction thread.
    ///
    /// # Errors
    ///
    /// * [`PoolError::Config`] if the sizing invariants are violated.
    /// * [`PoolError::Initialization`] if the factory fails during warm-up.
    /// * [`PoolError::Evictor`] if the eviction thread cannot be spawned.
    pub fn new(config: PoolConfig, factory: F) -> PoolResult<Self, F> {
        config.validate()?;

        let shared = Arc::new(Shared::new(config, factory));
        if let Err(err) = shared.warm_up() {
            warn!(error = %err, "pool warm-up failed");
            shared.shutdown();
            return Err(PoolError::Initialization(err));
        }

        let evictor = match shared.config.eviction_interval {
            Some(interval) => match Evictor::spawn(Arc::downgrade(&shared), interval) {
                Ok(evictor) => Some(evictor),
                Err(err) => {
                    shared.shutdown();
                    return Err(PoolError::Evictor(err));
                }
            },
            None => None,
        };

        info!(
            initial_size = shared.config.initial_size,
            max_size = shared.config.max_size,
            min_idle = shared.config.min_idle,
            "pool ready"
        );
        Ok(Self {
            shared,
            evictor: Mutex::new(evictor),
        })
    }

    /// Borrow a resource, waiting at most the configured `max_wait`.
    pub fn borrow(&self) -> PoolResult<Pooled<F>, F> {
        self.borrow_timeout(self.shared.config.max_wait)
    }

    /// Borrow a resource, waiting at most `timeout` in total.
    ///
    /// The deadline covers waiting, validation retries and the wait for capacity, but a
    /// factory call that has already started is allowed to finish.
    ///
    /// # Errors
    ///
    /// * [`PoolError::Shutdown`] once the pool has been shut down.
    /// * [`PoolError::Create`] if the factory fails to create a new resource.
    /// * [`PoolError::Timeout`] if nothing became available before the deadline.
    pub fn borrow_timeout(&self, timeout: Duration) -> PoolResult<Pooled<F>, F> {
        let (id, resource) = self.shared.acquire(timeout)?;
        Ok(Pooled {
            id,
            resource,
            pool: Arc::clone(&self.shared),
            reusable: true,
        })
    }

    /// Borrow without waiting for another borrower to return a resource.
    pub fn try_borrow(&self) -> PoolResult<Pooled<F>, F> {
        self.borrow_timeout(Duration::ZERO)
    }

    pub fn status(&self) -> PoolStatus {
        self.shared.status()
    }

    pub fn statistics(&self) -> PoolStatistics {
        self.shared.statistics()
    }

    /// Run one eviction pass now and return how many idle resources were destroyed.
    ///
    /// The pass first drops idle resources that fail validation (when `test_while_idle` is
    /// set), then shrinks the idle queue to `max(min_idle, round(total * 0.1))`.
    pub fn evict(&self) -> usize {
        self.shared.evict()
    }

    /// Stop eviction and destroy every idle and active resource. Idempotent.
    ///
    /// Handles still held by borrowers stay usable as values, but their resources have been
    /// destroyed and returning them is a no-op.
    pub fn shutdown(&self) {
        if let Some(evictor) = self.evictor.lock().take() {
            evictor.stop();
        }
        self.shared.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn factory(&self) -> &F {
        &self.shared.factory
    }
}

impl<F: ResourceFactory> Drop for Pool<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<F: ResourceFactory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.shared.config)
            .field("status", &self.status())
            .finish()
    }
}

/// A resource lent out by a [`Pool`].
///
/// Dropping the handle returns the resource to the pool.
pub struct Pooled<F: ResourceFactory> {
    id: ResourceId,
    resource: Arc<F::Resource>,
    pool: Arc<Shared<F>>,
    reusable: bool,
}

impl<F: ResourceFactory> Pooled<F> {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Return the resource to the pool now. Equivalent to dropping the handle.
    pub fn release(self) {}

    /// Return the resource for destruction instead of reuse, e.g. after an I/O error.
    pub fn discard(mut self) {
        self.reusable = false;
    }
}

impl<F: ResourceFactory> Deref for Pooled<F> {
    type Target = F::Resource;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

impl<F: ResourceFactory> Drop for Pooled<F> {
    fn drop(&mut self) {
        self.pool.check_in(self.id, &self.resource, self.reusable);
    }
}

impl<F: ResourceFactory> fmt::Debug for Pooled<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled").field("id", &self.id).finish()
    }
}
