//! # sluice-pool
//!
//! A bounded, thread-safe pool of reusable resources such as database connections.
//!
//! ## Lifecycle
//!
//! * **Borrow**: [`Pool::borrow`] hands out the oldest idle resource, creating a new one through
//!   the [`ResourceFactory`] while the pool is below `max_size`, and otherwise waits up to
//!   `max_wait` for another borrower to give one back.
//! * **Return**: dropping the [`Pooled`] handle returns the resource. Resources that are closed,
//!   or fail validation when `test_on_return` is set, are destroyed instead.
//! * **Evict**: a background thread periodically destroys idle resources that fail validation
//!   and shrinks the idle queue back towards `min_idle`.
//! * **Shutdown**: [`Pool::shutdown`] (or dropping the pool) destroys every resource exactly
//!   once, including those still lent out.
//!
//! The pool never holds its lock across a factory call, so slow `create` or `validate`
//! implementations only delay their own caller.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::atomic::AtomicBool;
//! use std::sync::atomic::Ordering;
//! use std::time::Duration;
//!
//! use sluice_pool::Pool;
//! use sluice_pool::PoolConfig;
//! use sluice_pool::Resource;
//! use sluice_pool::ResourceFactory;
//!
//! #[derive(Default)]
//! struct Connection {
//!     closed: AtomicBool,
//! }
//!
//! impl Resource for Connection {
//!     fn close(&self) {
//!         self.closed.store(true, Ordering::Release);
//!     }
//!
//!     fn is_closed(&self) -> bool {
//!         self.closed.load(Ordering::Acquire)
//!     }
//!
//!     fn is_valid(&self, _timeout: Duration) -> bool {
//!         !self.is_closed()
//!     }
//! }
//!
//! struct Connector;
//!
//! impl ResourceFactory for Connector {
//!     type Resource = Connection;
//!     type Error = std::io::Error;
//!
//!     fn create(&self) -> Result<Connection, std::io::Error> {
//!         Ok(Connection::default())
//!     }
//! }
//!
//! let config = PoolConfig::new().with_initial_size(1).with_max_size(4);
//! let pool = Pool::new(config, Connector).unwrap();
//!
//! let conn = pool.borrow().unwrap();
//! assert!(!conn.is_closed());
//! drop(conn);
//!
//! assert_eq!(pool.status().idle, 1);
//! ```

mod config;
mod error;
mod evictor;
mod pool;
mod resource;
mod stats;

pub use config::PoolConfig;
pub use error::ConfigError;
pub use error::PoolError;
pub use pool::Pool;
pub use pool::Pooled;
pub use resource::Resource;
pub use resource::ResourceFactory;
pub use resource::ResourceId;
pub use stats::PoolStatistics;
pub use stats::PoolStatus;
