use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use hdrhistogram::Histogram;
use rand::Rng;
use sluice_guard::AdmissionLayer;
use sluice_guard::CircuitBreaker;
use sluice_guard::CircuitBreakerLayer;
use sluice_guard::CircuitState;
use sluice_guard::Rejected;
use sluice_limit::FixedWindow;
use sluice_limit::SlidingWindow;
use sluice_limit::Strategy;
use sluice_limit::TokenBucket;
use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tower::BoxError;
use tower::Service;
use tower::ServiceBuilder;
use tower::ServiceExt;
use tower::service_fn;

/// A backend that takes a few milliseconds per call and fails `failure_rate` of the time.
async fn flaky_backend(failure_rate: f64) -> Result<&'static str, BoxError> {
    let (latency, failed) = {
        let mut rng = rand::rng();
        (rng.random_range(1..5), rng.random_bool(failure_rate))
    };
    sleep(Duration::from_millis(latency)).await;
    if failed {
        Err("backend failure".into())
    } else {
        Ok("success")
    }
}

#[derive(Default)]
struct RejectionCounter {
    rate_limited: usize,
    circuit_open: usize,
    backend: usize,
}

async fn run_load_test<S>(name: &str, svc: S, breaker: &CircuitBreaker, total_reqs: usize)
where
    S: Service<(), Response = &'static str, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send,
{
    let mut hist_elapsed = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    let mut hist_ready = Histogram::<u64>::new_with_bounds(1, 60_000_000_000, 3).unwrap();

    let mut tasks = JoinSet::new();
    let mut rejections = RejectionCounter::default();

    let start = Instant::now();
    let barrier = Arc::new(Barrier::new(total_reqs));

    for _ in 0..total_reqs {
        let mut local_svc = svc.clone();
        let bar = barrier.clone();
        tasks.spawn(async move {
            bar.wait().await;
            let req_start = Instant::now();
            let ready_res = local_svc.ready().await;
            let ready = req_start.elapsed();

            match ready_res {
                Ok(ready_svc) => (ready_svc.call(()).await, ready, req_start.elapsed()),
                Err(e) => (Err(e), ready, req_start.elapsed()),
            }
        });
    }

    let mut success_count = 0;

    while let Some(task) = tasks.join_next().await {
        let (res, ready, elapsed) = task.expect("Task panicked");
        match res {
            Ok(_) => {
                success_count += 1;
                hist_ready.record(ready.as_nanos() as u64).unwrap();
                hist_elapsed.record(elapsed.as_micros() as u64).unwrap();
            }
            Err(e) => match e.downcast_ref::<Rejected>() {
                Some(Rejected::RateLimited { .. }) => rejections.rate_limited += 1,
                Some(Rejected::CircuitOpen { .. }) => rejections.circuit_open += 1,
                None => rejections.backend += 1,
            },
        }
    }

    let total_duration = start.elapsed();
    let goodput = success_count as f64 / total_duration.as_secs_f64();

    println!("--- {} ---", name);
    println!("Total Duration:  {:.2?}", total_duration);
    println!("Success/Total:   {}/{}", success_count, total_reqs);
    println!("Success Rate:    {:.2} req/sec (Goodput)", goodput);
    println!("Breaker:         {:?}", breaker.state());

    if success_count > 0 {
        println!("P50 (Elapsed):   {}µs", hist_elapsed.value_at_quantile(0.5));
        println!(
            "P99 (Elapsed):   {}µs",
            hist_elapsed.value_at_quantile(0.99)
        );
        println!("P50 (Ready):     {}ns", hist_ready.value_at_quantile(0.5));
        println!("P99 (Ready):     {}ns", hist_ready.value_at_quantile(0.99));
    }

    let total_errors = rejections.rate_limited + rejections.circuit_open + rejections.backend;
    println!("Errors:          {}", total_errors);
    if total_errors > 0 {
        println!("  └─ RateLimited: {}", rejections.rate_limited);
        println!("  └─ CircuitOpen: {}", rejections.circuit_open);
        println!("  └─ Backend:     {}", rejections.backend);
    }
    println!();
}

async fn run_guarded<L>(name: &str, limiter: L, failure_rate: f64, total_reqs: usize)
where
    L: Strategy + Send + Sync + 'static,
{
    let breaker = Arc::new(CircuitBreaker::new(
        NonZeroUsize::new(50).unwrap(),
        Duration::from_millis(250),
    ));
    let svc = ServiceBuilder::new()
        .layer(CircuitBreakerLayer::new(Arc::clone(&breaker)))
        .layer(AdmissionLayer::new(Arc::new(limiter)))
        .service(service_fn(move |_: ()| flaky_backend(failure_rate)));

    run_load_test(name, svc, &breaker, total_reqs).await;
    if breaker.state() != CircuitState::Closed {
        // Let the breaker cool down before the next scenario reuses the backend profile.
        sleep(breaker.open_duration()).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let capacity: NonZeroUsize = 10_000.try_into()?;
    let period = Duration::from_secs(1);
    let total_reqs = 50_000;

    for failure_rate in [0.0, 0.2, 0.9] {
        println!("===== backend failure rate {:.0}% =====\n", failure_rate * 100.0);

        let fixed = FixedWindow::new(capacity, period);
        run_guarded("Fixed Window", fixed, failure_rate, total_reqs).await;

        let sliding = SlidingWindow::new(capacity, period);
        run_guarded("Sliding Window", sliding, failure_rate, total_reqs).await;

        let bucket = TokenBucket::new(capacity, capacity, period);
        run_guarded("Token Bucket", bucket, failure_rate, total_reqs).await;
    }

    Ok(())
}
