use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use quanta::Clock;
use sluice_limit::FixedWindow;
use sluice_limit::SlidingWindow;
use sluice_limit::TokenBucket;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceBuilder;
use tower::ServiceExt;

use super::*;

use futures::future::Ready;
use futures::future::ready;

#[derive(Clone, Debug)]
struct MockService {
    pub count: Arc<AtomicUsize>,
    pub failing: Arc<AtomicBool>,
}

impl MockService {
    fn new() -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Service<()> for MockService {
    type Response = ();
    type Error = BoxError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ()) -> Self::Future {
        self.count.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            ready(Err("backend down".into()))
        } else {
            ready(Ok(()))
        }
    }
}

fn rejection(err: &BoxError) -> Option<Rejected> {
    err.downcast_ref::<Rejected>().copied()
}

macro_rules! test_admission_service {
    ($name:ident, $strategy_init:expr) => {
        #[cfg(test)]
        mod $name {
            use super::*;

            #[tokio::test]
            async fn test_fail_fast_rejection() {
                let capacity = NonZeroUsize::new(2).unwrap();
                let interval = Duration::from_secs(60);

                let strategy = ($strategy_init)(capacity, interval);

                let mock = MockService::new();
                let count = Arc::clone(&mock.count);
                let mut service = AdmissionService::new(mock, Arc::new(strategy));

                service.ready().await.unwrap().call(()).await.unwrap();
                service.ready().await.unwrap().call(()).await.unwrap();

                let err = service.ready().await.unwrap_err();
                assert!(matches!(
                    rejection(&err),
                    Some(Rejected::RateLimited { retry_after }) if retry_after > Duration::ZERO
                ));
                assert_eq!(count.load(Ordering::SeqCst), 2);
            }
        }
    };
}

test_admission_service!(fixed_window_tests, FixedWindow::new);

test_admission_service!(sliding_window_tests, SlidingWindow::new);

test_admission_service!(token_bucket_tests, |cap, int| TokenBucket::new(
    cap,
    NonZeroUsize::new(1).unwrap(),
    int
));

#[tokio::test]
async fn test_layer_integration() {
    let limiter = SlidingWindow::new(NonZeroUsize::new(100).unwrap(), Duration::from_secs(1));
    let breaker = CircuitBreaker::new(NonZeroUsize::new(5).unwrap(), Duration::from_secs(1));

    let mut service = ServiceBuilder::new()
        .layer(CircuitBreakerLayer::new(Arc::new(breaker)))
        .layer(AdmissionLayer::new(Arc::new(limiter)))
        .service(MockService::new());

    service.ready().await.unwrap().call(()).await.unwrap();
}

#[tokio::test]
async fn test_shared_state_across_clones() {
    let rl = FixedWindow::new(NonZeroUsize::new(1).unwrap(), Duration::from_secs(10));
    let layer = AdmissionLayer::new(Arc::new(rl));

    let mut svc1 = layer.layer(MockService::new());
    let mut svc2 = layer.layer(MockService::new());

    svc1.ready().await.unwrap().call(()).await.unwrap();

    // svc2 is rejected because svc1 used the only permit
    let err = svc2.ready().await.unwrap_err();
    assert!(matches!(rejection(&err), Some(Rejected::RateLimited { .. })));
}

#[tokio::test]
async fn test_permit_is_kept_until_call() {
    let rl = FixedWindow::new(NonZeroUsize::new(1).unwrap(), Duration::from_secs(10));
    let mut service = AdmissionService::new(MockService::new(), Arc::new(rl));

    // Readiness twice without a call consumes a single permit.
    service.ready().await.unwrap();
    service.ready().await.unwrap();
    service.call(()).await.unwrap();

    assert!(service.ready().await.is_err());
}

#[tokio::test]
async fn test_concurrent_hammer() {
    let capacity = 50;
    let strategy = Arc::new(SlidingWindow::new(
        NonZeroUsize::new(capacity).unwrap(),
        Duration::from_secs(60),
    ));

    let mock = MockService::new();
    let mock_count = Arc::clone(&mock.count);
    let service = AdmissionService::new(mock, strategy);

    let mut handles = vec![];
    for _ in 0..100 {
        let svc = service.clone();
        handles.push(tokio::spawn(async move { svc.oneshot(()).await }));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    for h in handles {
        match h.await.expect("Task panicked") {
            Ok(()) => admitted += 1,
            Err(err) => {
                assert!(rejection(&err).is_some(), "unexpected error: {err}");
                rejected += 1;
            }
        }
    }

    assert_eq!(admitted, capacity);
    assert_eq!(rejected, 100 - capacity);
    assert_eq!(mock_count.load(Ordering::SeqCst), capacity);
}

#[tokio::test]
async fn test_breaker_service_opens_and_recovers() {
    let (clock, mock_clock) = Clock::mock();
    let breaker = Arc::new(CircuitBreaker::with_clock(
        NonZeroUsize::new(3).unwrap(),
        Duration::from_millis(100),
        clock,
    ));

    let mock = MockService::new();
    mock.failing.store(true, Ordering::SeqCst);
    let failing = Arc::clone(&mock.failing);
    let count = Arc::clone(&mock.count);
    let mut service = CircuitBreakerLayer::new(Arc::clone(&breaker)).layer(mock);

    for _ in 0..3 {
        let err = service.ready().await.unwrap().call(()).await.unwrap_err();
        assert!(rejection(&err).is_none());
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let err = service.ready().await.unwrap_err();
    assert!(matches!(rejection(&err), Some(Rejected::CircuitOpen { .. })));
    assert_eq!(count.load(Ordering::SeqCst), 3);

    // After the open duration the next request is the probe.
    mock_clock.increment(Duration::from_millis(101));
    failing.store(false, Ordering::SeqCst);
    service.ready().await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    service.call(()).await.unwrap();

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(count.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_dropped_probe_is_superseded() {
    let (clock, mock_clock) = Clock::mock();
    let breaker = Arc::new(CircuitBreaker::with_clock(
        NonZeroUsize::new(1).unwrap(),
        Duration::from_millis(100),
        clock,
    ));
    let layer = CircuitBreakerLayer::new(Arc::clone(&breaker));

    let mock = MockService::new();
    mock.failing.store(true, Ordering::SeqCst);
    let mut service = layer.layer(mock.clone());
    let _ = service.ready().await.unwrap().call(()).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    // Probe admitted, but the response future is dropped unpolled.
    mock_clock.increment(Duration::from_millis(101));
    drop(service.ready().await.unwrap().call(()));

    let mut other = layer.layer(mock.clone());
    assert!(other.ready().await.is_err());

    mock_clock.increment(Duration::from_millis(101));
    mock.failing.store(false, Ordering::SeqCst);
    other.ready().await.unwrap().call(()).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}
