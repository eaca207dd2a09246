use std::time::Duration;

use crate::error::ConfigError;

/// Sizing and validation policy for a [`Pool`](crate::Pool).
///
/// The configuration is copied into the pool at construction and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct PoolConfig {
    /// Resources created during construction.
    pub initial_size: usize,
    /// Upper bound on idle plus active resources.
    pub max_size: usize,
    /// Idle resources the eviction pass never goes below.
    pub min_idle: usize,
    /// Deadline used by [`Pool::borrow`](crate::Pool::borrow).
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub max_wait: Duration,
    /// Time budget handed to each validity check.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub validation_timeout: Duration,
    /// Opaque, factory specific validation statement (e.g. `SELECT 1`).
    pub validation_query: Option<String>,
    pub test_on_borrow: bool,
    pub test_on_return: bool,
    /// Validate idle resources during each eviction pass.
    pub test_while_idle: bool,
    /// Period of the background eviction pass. `None` disables the eviction thread.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub eviction_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 5,
            max_size: 20,
            min_idle: 2,
            max_wait: Duration::from_secs(5),
            validation_timeout: Duration::from_secs(3),
            validation_query: None,
            test_on_borrow: true,
            test_on_return: false,
            test_while_idle: true,
            eviction_interval: Some(Duration::from_secs(30)),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    pub fn with_validation_query(mut self, query: impl Into<String>) -> Self {
        self.validation_query = Some(query.into());
        self
    }

    pub fn with_test_on_borrow(mut self, enabled: bool) -> Self {
        self.test_on_borrow = enabled;
        self
    }

    pub fn with_test_on_return(mut self, enabled: bool) -> Self {
        self.test_on_return = enabled;
        self
    }

    pub fn with_test_while_idle(mut self, enabled: bool) -> Self {
        self.test_while_idle = enabled;
        self
    }

    /// Run the eviction pass every `interval`. A zero interval disables it.
    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Disable the background eviction thread. [`Pool::evict`](crate::Pool::evict) still works.
    pub fn without_eviction(mut self) -> Self {
        self.eviction_interval = None;
        self
    }

    /// Check the sizing invariants: `max_size > 0`, `min_idle <= max_size` and
    /// `initial_size <= max_size`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::ZeroMaxSize);
        }
        if self.min_idle > self.max_size {
            return Err(ConfigError::MinIdleAboveMax {
                min_idle: self.min_idle,
                max_size: self.max_size,
            });
        }
        if self.initial_size > self.max_size {
            return Err(ConfigError::InitialSizeAboveMax {
                initial_size: self.initial_size,
                max_size: self.max_size,
            });
        }
        Ok(())
    }
}
