//! Prometheus metrics for the prediction service
//!
//! Metrics live in a per-service [`Registry`] rather than the process-global
//! default one, so several services (or tests) can coexist in one process.

use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::time::Duration;

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

const NAMESPACE: &str = "ticket_router";

/// Handle to the service metrics; clones share the same underlying series
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    http_requests: IntCounterVec,
    prediction_latency_seconds: Histogram,
    predictions: IntCounter,
    escalations: IntCounter,
    prediction_timeouts: IntCounter,
    prediction_errors: IntCounterVec,
    model_loads: IntCounterVec,
    model_loaded: IntGauge,
    model_version_info: GaugeVec,
}

impl ServiceMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by route and status code")
                .namespace(NAMESPACE),
            &["path", "status"],
        )?;
        let prediction_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "prediction_latency_seconds",
                "Time spent running bounded prediction batches",
            )
            .namespace(NAMESPACE)
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let predictions = IntCounter::with_opts(
            Opts::new("predictions_total", "Texts classified").namespace(NAMESPACE),
        )?;
        let escalations = IntCounter::with_opts(
            Opts::new(
                "escalations_total",
                "Predictions escalated to human review",
            )
            .namespace(NAMESPACE),
        )?;
        let prediction_timeouts = IntCounter::with_opts(
            Opts::new(
                "prediction_timeouts_total",
                "Prediction batches that exceeded the deadline",
            )
            .namespace(NAMESPACE),
        )?;
        let prediction_errors = IntCounterVec::new(
            Opts::new("prediction_errors_total", "Failed prediction batches by kind")
                .namespace(NAMESPACE),
            &["kind"],
        )?;
        let model_loads = IntCounterVec::new(
            Opts::new("model_loads_total", "Model load attempts by outcome").namespace(NAMESPACE),
            &["outcome"],
        )?;
        let model_loaded = IntGauge::with_opts(
            Opts::new("model_loaded", "1 when a model bundle is published").namespace(NAMESPACE),
        )?;
        let model_version_info = GaugeVec::new(
            Opts::new(
                "model_version_info",
                "Information about the currently loaded model",
            )
            .namespace(NAMESPACE),
            &["version"],
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(prediction_latency_seconds.clone()))?;
        registry.register(Box::new(predictions.clone()))?;
        registry.register(Box::new(escalations.clone()))?;
        registry.register(Box::new(prediction_timeouts.clone()))?;
        registry.register(Box::new(prediction_errors.clone()))?;
        registry.register(Box::new(model_loads.clone()))?;
        registry.register(Box::new(model_loaded.clone()))?;
        registry.register(Box::new(model_version_info.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            prediction_latency_seconds,
            predictions,
            escalations,
            prediction_timeouts,
            prediction_errors,
            model_loads,
            model_loaded,
            model_version_info,
        })
    }

    /// Render all series in the Prometheus text format
    pub fn encode(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub fn observe_http_request(&self, path: &str, status: u16) {
        self.http_requests
            .with_label_values(&[path, &status.to_string()])
            .inc();
    }

    /// Record a completed batch
    pub fn observe_prediction(&self, latency: Duration, items: usize, escalated: usize) {
        self.prediction_latency_seconds
            .observe(latency.as_secs_f64());
        self.predictions.inc_by(items as u64);
        self.escalations.inc_by(escalated as u64);
    }

    pub fn inc_prediction_timeouts(&self) {
        self.prediction_timeouts.inc();
    }

    pub fn inc_prediction_errors(&self, kind: &str) {
        self.prediction_errors.with_label_values(&[kind]).inc();
    }

    /// Record a load attempt and the model now serving (if any)
    pub fn record_model_load(&self, success: bool, serving_version: Option<&str>, loaded: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.model_loads.with_label_values(&[outcome]).inc();
        self.model_loaded.set(i64::from(loaded));

        // Reset previous version
        self.model_version_info.reset();
        if loaded {
            self.model_version_info
                .with_label_values(&[serving_version.unwrap_or("unknown")])
                .set(1.0);
        }
    }
}
