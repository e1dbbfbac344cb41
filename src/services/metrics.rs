//! Prometheus metrics exposed on `GET /metrics` when `ENABLE_METRICS=true`.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `marketplace_http_requests_total` | Counter | `method`, `status` |
//! | `marketplace_http_request_duration_seconds` | Histogram | `method` |
//! | `marketplace_bookings_created_total` | Counter | |
//! | `marketplace_webhook_events_total` | Counter | `outcome` |

use axum::{extract::Request, middleware::Next, response::Response};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref HTTP_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("marketplace_http_requests_total", "HTTP requests by method and status"),
        &["method", "status"]
    )
    .expect("Invalid metric definition");
    pub static ref HTTP_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "marketplace_http_request_duration_seconds",
            "HTTP request latency"
        ),
        &["method"]
    )
    .expect("Invalid metric definition");
    pub static ref BOOKINGS_CREATED: IntCounter = IntCounter::new(
        "marketplace_bookings_created_total",
        "Bookings created"
    )
    .expect("Invalid metric definition");
    pub static ref WEBHOOK_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("marketplace_webhook_events_total", "Stripe webhook deliveries by outcome"),
        &["outcome"]
    )
    .expect("Invalid metric definition");
}

/// Register collectors once at startup
pub fn register_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(HTTP_REQUESTS.clone()))?;
    REGISTRY.register(Box::new(HTTP_DURATION.clone()))?;
    REGISTRY.register(Box::new(BOOKINGS_CREATED.clone()))?;
    REGISTRY.register(Box::new(WEBHOOK_EVENTS.clone()))?;
    Ok(())
}

/// Text exposition of every registered metric
pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_booking_created() {
    BOOKINGS_CREATED.inc();
}

pub fn record_webhook(outcome: &str) {
    WEBHOOK_EVENTS.with_label_values(&[outcome]).inc();
}

fn observe(histogram: Histogram, started: Instant) {
    histogram.observe(started.elapsed().as_secs_f64());
}

/// Middleware counting requests and their latency
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    HTTP_REQUESTS
        .with_label_values(&[method.as_str(), response.status().as_str()])
        .inc();
    observe(HTTP_DURATION.with_label_values(&[method.as_str()]), started);

    response
}
