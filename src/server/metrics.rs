use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

use crate::push::PushOutcome;
use crate::retry_queue::QueueStats;

/// Metric name prefix for all seller server metrics
const PREFIX: &str = "seller_server";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Delivery Metrics
    pub static ref DISPATCHES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_dispatches_total"), "Dispatched notifications by outcome"),
        &["result", "kind"]
    ).expect("Failed to create dispatches_total metric");

    pub static ref PUSH_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_push_attempts_total"), "Push fallback attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create push_attempts_total metric");

    pub static ref RETRY_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_retry_attempts_total"), "Retry queue attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create retry_attempts_total metric");

    pub static ref RETRY_QUEUE_DEPTH: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_retry_queue_depth"), "Retry queue jobs by status"),
        &["status"]
    ).expect("Failed to create retry_queue_depth metric");

    // WebSocket Metrics
    pub static ref WS_ACTIVE_CONNECTIONS: Gauge = Gauge::new(
        format!("{PREFIX}_ws_active_connections"),
        "Number of open WebSocket connections"
    ).expect("Failed to create ws_active_connections metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(DISPATCHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PUSH_ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RETRY_ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RETRY_QUEUE_DEPTH.clone()));
    let _ = REGISTRY.register(Box::new(WS_ACTIVE_CONNECTIONS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record a dispatch outcome ("realtime", "push" or "queued") for a
/// notification kind
pub fn observe_dispatch(result: &str, kind: &str) {
    DISPATCHES_TOTAL.with_label_values(&[result, kind]).inc();
}

/// Record a push fallback attempt
pub fn observe_push(outcome: PushOutcome) {
    let label = match outcome {
        PushOutcome::Accepted => "accepted",
        PushOutcome::NoSubscription => "no_subscription",
        PushOutcome::Failed => "failed",
        PushOutcome::Disabled => "disabled",
    };
    PUSH_ATTEMPTS_TOTAL.with_label_values(&[label]).inc();
}

/// Record a retry queue attempt ("delivered", "rescheduled" or "exhausted")
pub fn observe_retry_attempt(outcome: &str) {
    RETRY_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Update the retry queue depth gauges
pub fn observe_queue_depth(stats: &QueueStats) {
    RETRY_QUEUE_DEPTH
        .with_label_values(&["pending"])
        .set(stats.pending as f64);
    RETRY_QUEUE_DEPTH
        .with_label_values(&["in_flight"])
        .set(stats.in_flight as f64);
    RETRY_QUEUE_DEPTH
        .with_label_values(&["failed"])
        .set(stats.failed as f64);
}

/// Update the open WebSocket connection count
pub fn set_ws_connections(count: usize) {
    WS_ACTIVE_CONNECTIONS.set(count as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
