use std::any::type_name;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::task::ready;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;

use sluice_limit::Reason;
use sluice_limit::Strategy;

use crate::breaker::Admission;
use crate::breaker::CircuitBreaker;
use crate::error::Rejected;

/// Admits requests through a [`Strategy`], rejecting the rest with [`Rejected::RateLimited`].
///
/// The strategy is consulted in `poll_ready`, after the inner service is ready, so a permit is
/// never taken for a request that cannot be sent. Rejection is immediate; requests are never
/// queued waiting for capacity.
#[derive(Debug)]
pub struct AdmissionService<L, S>
where
    L: ?Sized,
{
    inner: S,
    limiter: Arc<L>,
    permit_acquired: bool,
    rate_limited: Counter<u64>,
}

impl<L, S> Clone for AdmissionService<L, S>
where
    L: ?Sized,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            // Permits belong to the instance that acquired them.
            permit_acquired: false,
            rate_limited: self.rate_limited.clone(),
        }
    }
}

impl<L, S> AdmissionService<L, S>
where
    L: ?Sized,
{
    pub fn new(inner: S, limiter: Arc<L>) -> Self {
        let meter = global::meter("sluice_guard");
        Self {
            inner,
            limiter,
            permit_acquired: false,
            rate_limited: meter.u64_counter("rate_limited").build(),
        }
    }
}

impl<L, S, Req> Service<Req> for AdmissionService<L, S>
where
    L: Strategy + ?Sized,
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        ready!(self.inner.poll_ready(cx))?;

        if !self.permit_acquired {
            match self.limiter.process() {
                ControlFlow::Continue(()) => self.permit_acquired = true,
                ControlFlow::Break(Reason::Overloaded { retry_after }) => {
                    self.rate_limited
                        .add(1, &[KeyValue::new("strategy", type_name::<L>())]);
                    return Poll::Ready(Err(Box::new(Rejected::RateLimited { retry_after })));
                }
            }
        }

        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        self.permit_acquired = false;
        self.inner.call(req)
    }
}

/// Guards the inner service with a shared [`CircuitBreaker`].
///
/// Admission is decided in `poll_ready`; while the breaker is open requests fail with
/// [`Rejected::CircuitOpen`]. The outcome of each response future is reported back to the
/// breaker: an `Err` from the inner service counts as a failure.
#[derive(Debug)]
pub struct CircuitBreakerService<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
    admission: Option<Admission>,
    circuit_open: Counter<u64>,
}

impl<S: Clone> Clone for CircuitBreakerService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            breaker: Arc::clone(&self.breaker),
            admission: None,
            circuit_open: self.circuit_open.clone(),
        }
    }
}

impl<S> CircuitBreakerService<S> {
    pub fn new(inner: S, breaker: Arc<CircuitBreaker>) -> Self {
        let meter = global::meter("sluice_guard");
        Self {
            inner,
            breaker,
            admission: None,
            circuit_open: meter.u64_counter("circuit_open").build(),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

pin_project! {
    /// Reports the outcome of the inner future to the circuit breaker.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        breaker: Arc<CircuitBreaker>,
        admission: Option<Admission>,
    }
}

impl<F, T, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));
        if let Some(admission) = this.admission.take() {
            this.breaker.record(admission, result.is_ok());
        }
        Poll::Ready(result)
    }
}

impl<S, Req> Service<Req> for CircuitBreakerService<S>
where
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        ready!(self.inner.poll_ready(cx))?;

        if self.admission.is_none() {
            match self.breaker.acquire() {
                Ok(admission) => self.admission = Some(admission),
                Err(retry_after) => {
                    self.circuit_open.add(1, &[]);
                    return Poll::Ready(Err(Box::new(Rejected::CircuitOpen { retry_after })));
                }
            }
        }

        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        // Without a preceding `poll_ready` the call is forwarded but not recorded.
        ResponseFuture {
            inner: self.inner.call(req),
            breaker: Arc::clone(&self.breaker),
            admission: self.admission.take(),
        }
    }
}
