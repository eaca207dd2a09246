use std::sync::Arc;

use sluice_limit::Strategy;
use tower::Layer;

use crate::breaker::CircuitBreaker;
use crate::service::AdmissionService;
use crate::service::CircuitBreakerService;

/// Applies a rate limiting [`Strategy`] to requests.
///
/// Every service produced by the layer shares the same strategy.
#[derive(Debug)]
pub struct AdmissionLayer<L>
where
    L: ?Sized,
{
    limiter: Arc<L>,
}

impl<L> Clone for AdmissionLayer<L>
where
    L: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<L> AdmissionLayer<L>
where
    L: Strategy + ?Sized,
{
    pub fn new(limiter: Arc<L>) -> Self {
        AdmissionLayer { limiter }
    }
}

impl<L, S> Layer<S> for AdmissionLayer<L>
where
    L: ?Sized,
{
    type Service = AdmissionService<L, S>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService::new(service, Arc::clone(&self.limiter))
    }
}

/// Guards requests with a shared [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerLayer {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerLayer {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        CircuitBreakerLayer { breaker }
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreakerService::new(service, Arc::clone(&self.breaker))
    }
}
