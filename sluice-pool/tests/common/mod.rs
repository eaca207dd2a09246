#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use sluice_pool::Resource;
use sluice_pool::ResourceFactory;
use tracing_subscriber::EnvFilter;

/// Route pool logs to the test harness; `RUST_LOG=sluice_pool=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug)]
pub struct MockConn {
    pub serial: usize,
    closes: AtomicUsize,
}

impl MockConn {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Resource for MockConn {
    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closes() > 0
    }

    fn is_valid(&self, _timeout: Duration) -> bool {
        !self.is_closed()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("mock factory refused to create resource {0}")]
pub struct MockError(pub usize);

/// Factory that records every create and destroy call.
///
/// Clones share their records, so a test can keep a handle after moving the factory into a pool.
#[derive(Debug, Clone, Default)]
pub struct CountingFactory {
    tally: Arc<Tally>,
}

#[derive(Debug, Default)]
struct Tally {
    created: AtomicUsize,
    destroyed: Mutex<Vec<usize>>,
    /// Resources with a serial below this fail validation.
    invalid_below: AtomicUsize,
    /// Creates fail once this many resources exist.
    fail_from: Mutex<Option<usize>>,
    refuse: AtomicBool,
    /// `destroy` still closes and records the resource, then reports an error.
    fail_destroy: AtomicBool,
    create_delay: Mutex<Duration>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_from(serial: usize) -> Self {
        let factory = Self::default();
        *factory.tally.fail_from.lock() = Some(serial);
        factory
    }

    pub fn with_create_delay(delay: Duration) -> Self {
        let factory = Self::default();
        *factory.tally.create_delay.lock() = delay;
        factory
    }

    pub fn failing_destroy() -> Self {
        let factory = Self::default();
        factory.tally.fail_destroy.store(true, Ordering::SeqCst);
        factory
    }

    pub fn created(&self) -> usize {
        self.tally.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.tally.destroyed.lock().len()
    }

    /// Panics if any resource was destroyed more than once.
    pub fn assert_destroyed_once(&self) {
        let destroyed = self.tally.destroyed.lock();
        let unique: HashSet<_> = destroyed.iter().collect();
        assert_eq!(unique.len(), destroyed.len(), "double destroy: {destroyed:?}");
    }

    /// Make every resource created so far fail validation.
    pub fn invalidate_existing(&self) {
        self.tally.invalid_below.store(self.created(), Ordering::SeqCst);
    }

    pub fn refuse_creates(&self, refuse: bool) {
        self.tally.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl ResourceFactory for CountingFactory {
    type Resource = MockConn;
    type Error = MockError;

    fn create(&self) -> Result<MockConn, MockError> {
        let delay = *self.tally.create_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let serial = self.tally.created.load(Ordering::SeqCst);
        let exhausted = self.tally.fail_from.lock().is_some_and(|limit| serial >= limit);
        if exhausted || self.tally.refuse.load(Ordering::SeqCst) {
            return Err(MockError(serial));
        }

        let serial = self.tally.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockConn {
            serial,
            closes: AtomicUsize::new(0),
        })
    }

    fn destroy(&self, resource: &MockConn) -> Result<(), MockError> {
        resource.close();
        self.tally.destroyed.lock().push(resource.serial);
        if self.tally.fail_destroy.load(Ordering::SeqCst) {
            return Err(MockError(resource.serial));
        }
        Ok(())
    }

    fn validate(&self, resource: &MockConn, timeout: Duration, _query: Option<&str>) -> bool {
        resource.serial >= self.tally.invalid_below.load(Ordering::SeqCst)
            && resource.is_valid(timeout)
    }
}
