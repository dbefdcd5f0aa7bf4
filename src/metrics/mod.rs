//! Metrics and monitoring using Prometheus.
//!
//! Metrics are exposed on the `/metrics` endpoint of the metrics server and
//! include:
//!
//! - **Counters**: pull requests by outcome, messages pulled and acked,
//!   ack failures by kind, duplicates collapsed by merging, subscribe calls
//! - **Histograms**: acknowledgment latency
//! - **Gauges**: running push subscribers

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use tracing::error;

/// Global metrics registry
static METRICS_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Global metrics instance
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    let metrics = Metrics::new();
    if let Err(e) = metrics.register(&METRICS_REGISTRY) {
        error!("Failed to register metrics: {}", e);
    }
    Arc::new(metrics)
});

/// Metrics collector for the gateway
pub struct Metrics {
    /// Pull operations by operation (`pull`, `multipull`) and outcome (counter)
    pub pull_requests_total: IntCounterVec,
    /// Messages leased from the broker, per subscription (counter)
    pub messages_pulled_total: IntCounterVec,
    /// Messages acknowledged, per operation (counter)
    pub messages_acked_total: IntCounterVec,
    /// Failed acknowledgment batches by failure kind (counter)
    pub ack_failures_total: IntCounterVec,
    /// Messages collapsed by identity during merging (counter)
    pub duplicates_collapsed_total: IntCounterVec,
    /// Subscribe calls by outcome (counter)
    pub subscribe_requests_total: IntCounterVec,

    /// Acknowledgment latency in seconds (histogram)
    pub ack_latency_seconds: HistogramVec,

    /// Number of running push subscribers (gauge)
    pub active_subscribers: IntGauge,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        let pull_requests_total = IntCounterVec::new(
            Opts::new("gateway_pull_requests_total", "Total pull operations"),
            &["operation", "outcome"],
        )
        .expect("Failed to create pull_requests_total metric");

        let messages_pulled_total = IntCounterVec::new(
            Opts::new(
                "gateway_messages_pulled_total",
                "Total messages leased from the broker",
            ),
            &["subscription"],
        )
        .expect("Failed to create messages_pulled_total metric");

        let messages_acked_total = IntCounterVec::new(
            Opts::new("gateway_messages_acked_total", "Total messages acknowledged"),
            &["operation"],
        )
        .expect("Failed to create messages_acked_total metric");

        let ack_failures_total = IntCounterVec::new(
            Opts::new(
                "gateway_ack_failures_total",
                "Total failed acknowledgment batches",
            ),
            &["operation", "kind"],
        )
        .expect("Failed to create ack_failures_total metric");

        let duplicates_collapsed_total = IntCounterVec::new(
            Opts::new(
                "gateway_duplicates_collapsed_total",
                "Total messages collapsed by identity while merging",
            ),
            &["operation"],
        )
        .expect("Failed to create duplicates_collapsed_total metric");

        let subscribe_requests_total = IntCounterVec::new(
            Opts::new("gateway_subscribe_requests_total", "Total subscribe calls"),
            &["outcome"],
        )
        .expect("Failed to create subscribe_requests_total metric");

        let ack_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_ack_latency_seconds",
                "Acknowledgment latency in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0]),
            &["operation"],
        )
        .expect("Failed to create ack_latency_seconds metric");

        let active_subscribers = IntGauge::new(
            "gateway_active_subscribers",
            "Number of running push subscribers",
        )
        .expect("Failed to create active_subscribers metric");

        Self {
            pull_requests_total,
            messages_pulled_total,
            messages_acked_total,
            ack_failures_total,
            duplicates_collapsed_total,
            subscribe_requests_total,
            ack_latency_seconds,
            active_subscribers,
        }
    }

    /// Register all metrics with the registry
    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.pull_requests_total.clone()))?;
        registry.register(Box::new(self.messages_pulled_total.clone()))?;
        registry.register(Box::new(self.messages_acked_total.clone()))?;
        registry.register(Box::new(self.ack_failures_total.clone()))?;
        registry.register(Box::new(self.duplicates_collapsed_total.clone()))?;
        registry.register(Box::new(self.subscribe_requests_total.clone()))?;
        registry.register(Box::new(self.ack_latency_seconds.clone()))?;
        registry.register(Box::new(self.active_subscribers.clone()))?;
        Ok(())
    }

    /// Gather metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = METRICS_REGISTRY.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the global metrics instance
pub fn get_metrics() -> Arc<Metrics> {
    METRICS.clone()
}
