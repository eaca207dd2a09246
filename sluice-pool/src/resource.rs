use std::fmt;
use std::time::Duration;

/// An object managed by a [`Pool`](crate::Pool), e.g. a database connection.
///
/// While a resource is lent out the pool keeps a shared handle to it, so that
/// [`Pool::shutdown`](crate::Pool::shutdown) can close it. The capabilities therefore take
/// `&self`.
pub trait Resource: Send + Sync {
    /// Release whatever the resource holds. Calling it twice must be harmless.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Check that the resource is still usable, spending at most `timeout`.
    fn is_valid(&self, timeout: Duration) -> bool;
}

/// Creates, destroys and validates the resources of a [`Pool`](crate::Pool).
///
/// `create` may block for as long as it needs; the pool never holds its lock across a factory
/// call.
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: Resource + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    fn create(&self) -> Result<Self::Resource, Self::Error>;

    /// Tear a resource down. Called exactly once per created resource.
    fn destroy(&self, resource: &Self::Resource) -> Result<(), Self::Error> {
        resource.close();
        Ok(())
    }

    /// Decide whether `resource` may be handed out or kept.
    ///
    /// `query` is the pool's configured validation query, if any.
    fn validate(&self, resource: &Self::Resource, timeout: Duration, query: Option<&str>) -> bool {
        let _ = query;
        !resource.is_closed() && resource.is_valid(timeout)
    }
}

/// Identity of a pooled resource, unique within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u64);

impl ResourceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
