use std::sync::Arc;
use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Condvar;
use parking_lot::Mutex;
use tracing::debug;
use tracing::warn;

use crate::pool::Shared;
use crate::resource::ResourceFactory;

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Sleep until `deadline` or until stopped. Returns `true` once stopped.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }
}

/// Background thread running the pool's eviction pass every `interval`.
///
/// The thread only holds a weak reference to the pool between passes, so it never keeps a
/// dropped pool alive.
#[derive(Debug)]
pub(crate) struct Evictor {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl Evictor {
    pub(crate) fn spawn<F: ResourceFactory>(
        pool: Weak<Shared<F>>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);

        let handle = std::thread::Builder::new()
            .name("sluice-evictor".to_string())
            .spawn(move || {
                debug!(?interval, "eviction thread started");
                loop {
                    if thread_signal.wait_until(Instant::now() + interval) {
                        break;
                    }
                    let Some(pool) = pool.upgrade() else {
                        break;
                    };
                    let evicted = pool.evict();
                    if evicted > 0 {
                        debug!(evicted, "eviction pass completed");
                    }
                }
                debug!("eviction thread stopped");
            })?;

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for an in-flight pass to finish.
    pub(crate) fn stop(mut self) {
        self.signal.stop();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("eviction thread panicked");
        }
    }
}

impl Drop for Evictor {
    fn drop(&mut self) {
        self.signal.stop();
    }
}
