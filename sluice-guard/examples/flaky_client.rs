use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use sluice_guard::CircuitBreaker;
use sluice_guard::GuardError;
use sluice_guard::retry;
use sluice_guard::with_timeout;
use tokio::time::sleep;

/// Calls a simulated flaky dependency through a timeout, a circuit breaker and retries.
#[derive(Debug, Parser)]
struct Args {
    /// Number of requests to send
    #[arg(long, default_value_t = 40)]
    requests: usize,

    /// Every n-th call to the dependency hangs
    #[arg(long, default_value_t = 3)]
    hang_every: usize,

    /// Deadline for a single call
    #[arg(long, default_value = "50ms", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// How long the breaker stays open
    #[arg(long, default_value = "200ms", value_parser = humantime::parse_duration)]
    open_for: Duration,

    /// Attempts per request
    #[arg(long, default_value_t = NonZeroUsize::new(3).unwrap())]
    attempts: NonZeroUsize,
}

async fn dependency(call: usize, hang_every: usize) -> Result<usize, &'static str> {
    if hang_every > 0 && call % hang_every == 0 {
        sleep(Duration::from_secs(1)).await;
    }
    Ok(call)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let breaker = CircuitBreaker::new(NonZeroUsize::new(2).unwrap(), args.open_for);
    let calls = Arc::new(AtomicUsize::new(1));

    for i in 0..args.requests {
        let outcome = retry(args.attempts, Duration::from_millis(20), || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            breaker.call_async(move || {
                with_timeout(args.timeout, dependency(call, args.hang_every))
            })
        })
        .await;

        match outcome {
            Ok(call) => println!("[{i:03}] ✅ answered by call {call}"),
            Err(GuardError::RetryExhausted { attempts, source }) => {
                println!("[{i:03}] ❌ gave up after {attempts} attempts: {source}")
            }
            Err(err) => println!("[{i:03}] 💥 {err}"),
        }
        println!("       breaker: {:?}", breaker.state());
        sleep(Duration::from_millis(25)).await;
    }
}
