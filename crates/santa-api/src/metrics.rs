//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "santa_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "santa_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "santa_http_requests_in_flight";

    // Payment webhook
    pub const PAYMENT_EVENTS_TOTAL: &str = "santa_payment_events_total";

    // Background work
    pub const ORDERS_TRIGGERED_TOTAL: &str = "santa_orders_triggered_total";
    pub const SWEEPS_TOTAL: &str = "santa_sweeps_total";
    pub const SWEEP_ORDERS_TOTAL: &str = "santa_sweep_orders_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "santa_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a payment webhook outcome (`applied`, `replay`, `rejected`, ...).
pub fn record_payment_event(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::PAYMENT_EVENTS_TOTAL, &labels).increment(1);
}

/// Record a fire-and-forget orchestrator run and what started it.
pub fn record_order_triggered(source: &str) {
    let labels = [("source", source.to_string())];
    counter!(names::ORDERS_TRIGGERED_TOTAL, &labels).increment(1);
}

/// Record one sweeper pass.
pub fn record_sweep(advanced: usize, failed_stale: usize, restarted: usize) {
    counter!(names::SWEEPS_TOTAL).increment(1);
    for (action, count) in [
        ("advanced", advanced),
        ("failed_stale", failed_stale),
        ("restarted", restarted),
    ] {
        let labels = [("action", action.to_string())];
        counter!(names::SWEEP_ORDERS_TOTAL, &labels).increment(count as u64);
    }
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

static ORDER_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"/orders/[a-zA-Z0-9-]{8,64}$").ok());

/// Sanitize path for metrics labels (remove IDs).
fn sanitize_path(path: &str) -> String {
    match ORDER_PATH.as_ref() {
        // Action routes share the prefix but are not ids.
        Some(re) if !matches!(path.rsplit('/').next(), Some("status" | "retry" | "finalize")) => {
            re.replace_all(path, "/orders/:order_id").to_string()
        }
        _ => path.to_string(),
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
