use std::time::Duration;

/// A [`PoolConfig`](crate::PoolConfig) that violates the pool's sizing invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_size must be greater than zero")]
    ZeroMaxSize,

    #[error("min_idle ({min_idle}) must not exceed max_size ({max_size})")]
    MinIdleAboveMax { min_idle: usize, max_size: usize },

    #[error("initial_size ({initial_size}) must not exceed max_size ({max_size})")]
    InitialSizeAboveMax { initial_size: usize, max_size: usize },
}

/// Errors produced by the [`Pool`](crate::Pool).
///
/// `E` is the error type of the pool's [`ResourceFactory`](crate::ResourceFactory).
#[derive(Debug, thiserror::Error)]
pub enum PoolError<E> {
    /// The configuration was rejected at construction. Fix the configuration.
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),

    /// The factory failed while the pool was being warmed up.
    ///
    /// Any resources created before the failure have already been destroyed.
    #[error("failed to populate the pool during warm-up")]
    Initialization(#[source] E),

    /// The background eviction thread could not be started.
    #[error("failed to start the eviction thread")]
    Evictor(#[source] std::io::Error),

    /// The factory failed to create a resource for a borrower.
    #[error("failed to create a resource")]
    Create(#[source] E),

    /// The factory failed to destroy a resource.
    ///
    /// Destruction is best effort: the pool logs this and carries on.
    #[error("failed to destroy a resource")]
    Destroy(#[source] E),

    /// No resource became available before the deadline. The caller may retry.
    #[error("timed out after {0:?} waiting for a resource")]
    Timeout(Duration),

    /// The pool has been shut down and hands out nothing further.
    #[error("pool is shut down")]
    Shutdown,
}

impl<E> PoolError<E> {
    /// Returns `true` if retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Create(_))
    }
}
