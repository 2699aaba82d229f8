// HTTP metrics, registered next to the engine's own collectors
// Tracks: request count by route and status, request latency

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, HistogramVec, IntCounterVec, IntGauge, Registry,
};
use std::time::Instant;

#[derive(Clone)]
pub struct HttpMetrics {
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub http_requests_in_flight: IntGauge,
}

impl HttpMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let http_requests_total = register_int_counter_vec_with_registry!(
            "transfer_http_requests_total",
            "Total number of HTTP requests",
            &["route", "status"],
            registry
        )?;

        let http_request_duration_seconds = register_histogram_vec_with_registry!(
            "transfer_http_request_duration_seconds",
            "HTTP request duration in seconds",
            &["route"],
            vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
            registry
        )?;

        let http_requests_in_flight = register_int_gauge_with_registry!(
            "transfer_http_requests_in_flight",
            "Number of HTTP requests being served",
            registry
        )?;

        Ok(Self {
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
        })
    }
}

/// Middleware recording every request against its matched route
pub async fn track(State(metrics): State<HttpMetrics>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    metrics.http_requests_in_flight.inc();
    let start = Instant::now();
    let response = next.run(request).await;
    metrics.http_requests_in_flight.dec();

    metrics
        .http_request_duration_seconds
        .with_label_values(&[route.as_str()])
        .observe(start.elapsed().as_secs_f64());
    metrics
        .http_requests_total
        .with_label_values(&[route.as_str(), response.status().as_str()])
        .inc();

    response
}
