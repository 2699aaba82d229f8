//! Metrics collection for observability
//!
//! Every engine owns its own prometheus [`Registry`], so several engines
//! (tests, benchmarks) can live in one process.
//!
//! # Metrics
//!
//! - `transfer_requests_total{operation}` - Requests processed
//! - `transfer_rejections_total{operation}` - Requests rejected by a business rule
//! - `transfer_internal_errors_total` - Handler panics and other unexpected failures
//! - `transfer_batch_size` - Histogram of contiguous batches handled per wake-up
//! - `transfer_processed_sequence` - Consumer cursor

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Requests processed, by operation
    pub requests_total: IntCounterVec,

    /// Business-rule rejections, by operation
    pub rejections_total: IntCounterVec,

    /// Unexpected failures caught at the slot boundary
    pub internal_errors_total: IntCounter,

    /// Batch size histogram
    pub batch_size: Histogram,

    /// Last processed sequence
    pub processed_sequence: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = IntCounterVec::new(
            Opts::new("transfer_requests_total", "Total number of requests processed"),
            &["operation"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "transfer_rejections_total",
                "Total number of requests rejected as invalid",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let internal_errors_total = IntCounter::new(
            "transfer_internal_errors_total",
            "Total number of unexpected handler failures",
        )?;
        registry.register(Box::new(internal_errors_total.clone()))?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("transfer_batch_size", "Histogram of processed batch sizes")
                .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0]),
        )?;
        registry.register(Box::new(batch_size.clone()))?;

        let processed_sequence = IntGauge::new(
            "transfer_processed_sequence",
            "Highest sequence processed by the consumer",
        )?;
        registry.register(Box::new(processed_sequence.clone()))?;

        Ok(Self {
            requests_total,
            rejections_total,
            internal_errors_total,
            batch_size,
            processed_sequence,
            registry,
        })
    }

    /// Record a processed request
    pub fn record_request(&self, operation: &str) {
        self.requests_total.with_label_values(&[operation]).inc();
    }

    /// Record a business-rule rejection
    pub fn record_rejection(&self, operation: &str) {
        self.rejections_total.with_label_values(&[operation]).inc();
    }

    /// Record an unexpected failure
    pub fn record_internal_error(&self) {
        self.internal_errors_total.inc();
    }

    /// Record a processed batch ending at `last_sequence`
    pub fn record_batch(&self, batch_size: usize, last_sequence: i64) {
        self.batch_size.observe(batch_size as f64);
        self.processed_sequence.set(last_sequence);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the text exposition format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("internal_errors_total", &self.internal_errors_total.get())
            .field("processed_sequence", &self.processed_sequence.get())
            .finish_non_exhaustive()
    }
}
