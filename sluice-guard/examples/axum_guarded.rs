use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use sluice_guard::AdmissionLayer;
use sluice_guard::CircuitBreaker;
use sluice_guard::CircuitBreakerLayer;
use sluice_guard::Rejected;
use sluice_limit::TokenBucket;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tower::BoxError;
use tower::ServiceBuilder;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 1. Admission: 10 requests, refilled 10 per second
    let limit = NonZeroUsize::new(10).unwrap();
    let strategy = Arc::new(TokenBucket::new(limit, limit, Duration::from_secs(1)));

    // 2. Breaker: open for 5s after 3 consecutive handler failures
    let breaker = Arc::new(CircuitBreaker::new(
        NonZeroUsize::new(3).unwrap(),
        Duration::from_secs(5),
    ));

    // 3. Build the Router
    let app = Router::new()
        .route("/", get(|| async { "Hello, sluice!" }))
        .layer(
            ServiceBuilder::new()
                // The outermost layer: catches BoxError and returns Response
                .layer(HandleErrorLayer::new(handle_rejection))
                .layer(CircuitBreakerLayer::new(breaker))
                .layer(AdmissionLayer::new(strategy))
                // Converts the Route's Infallible to BoxError so the guards can wrap it.
                .map_err(BoxError::from),
        );

    // 4. Serve
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .unwrap();
    println!("📡 Listening on http://127.0.0.1:3000");

    axum::serve(listener, app).await.unwrap();
}

async fn handle_rejection(err: BoxError) -> impl IntoResponse {
    if let Some(rejected) = err.downcast_ref::<Rejected>() {
        (*rejected).into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
