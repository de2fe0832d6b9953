//! Structured audit events for requests and predictions
//!
//! Every event carries its kind, a UTC timestamp and the request
//! correlation id. Records are flat, so each one serializes to a single
//! JSON line that log shippers can forward without reassembly.

use crate::models::{ModelRef, PredictionResult, ScoredBatch};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// One auditable occurrence
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    HttpRequest {
        request_id: String,
        method: String,
        path: String,
        status_code: u16,
        latency_ms: f64,
        model_version: Option<String>,
        model_dir: Option<String>,
    },
    Prediction {
        request_id: String,
        model_version: Option<String>,
        model_dir: Option<String>,
        min_confidence: f64,
        top_k: usize,
        label: String,
        confidence: f64,
        needs_human: bool,
    },
    PredictionBatch {
        request_id: String,
        model_version: Option<String>,
        model_dir: Option<String>,
        min_confidence: f64,
        top_k: usize,
        item_count: usize,
        needs_human_count: usize,
    },
    PredictionTimeout {
        request_id: String,
        path: String,
        timeout_ms: u64,
        model_version: Option<String>,
        model_dir: Option<String>,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::HttpRequest { .. } => "http_request",
            AuditEvent::Prediction { .. } => "prediction",
            AuditEvent::PredictionBatch { .. } => "prediction_batch",
            AuditEvent::PredictionTimeout { .. } => "prediction_timeout",
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            AuditEvent::HttpRequest { request_id, .. }
            | AuditEvent::Prediction { request_id, .. }
            | AuditEvent::PredictionBatch { request_id, .. }
            | AuditEvent::PredictionTimeout { request_id, .. } => request_id,
        }
    }
}

/// An event stamped with its emission time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    #[serde(flatten)]
    pub event: AuditEvent,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn now(event: AuditEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }

    /// ISO-8601 UTC timestamp, e.g. `2026-10-19T08:15:02.123456Z`
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Destination for audit records.
///
/// Implementations must not block or fail the caller: emission happens on
/// the request path and is fire-and-forget.
pub trait AuditSink: Send + Sync {
    fn emit(&self, record: &AuditRecord);
}

/// Emits each record as one `tracing` event on the `audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn emit(&self, record: &AuditRecord) {
        let timestamp = record.timestamp_iso();
        match &record.event {
            AuditEvent::HttpRequest {
                request_id,
                method,
                path,
                status_code,
                latency_ms,
                model_version,
                model_dir,
            } => info!(
                target: "audit",
                event = "http_request",
                timestamp = %timestamp,
                request_id = %request_id,
                method = %method,
                path = %path,
                status_code = *status_code,
                latency_ms = *latency_ms,
                model_version = model_version.as_deref(),
                model_dir = model_dir.as_deref(),
                "HTTP request completed"
            ),
            AuditEvent::Prediction {
                request_id,
                model_version,
                model_dir,
                min_confidence,
                top_k,
                label,
                confidence,
                needs_human,
            } => info!(
                target: "audit",
                event = "prediction",
                timestamp = %timestamp,
                request_id = %request_id,
                model_version = model_version.as_deref(),
                model_dir = model_dir.as_deref(),
                min_confidence = *min_confidence,
                top_k = *top_k as u64,
                label = %label,
                confidence = *confidence,
                needs_human = *needs_human,
                "Prediction served"
            ),
            AuditEvent::PredictionBatch {
                request_id,
                model_version,
                model_dir,
                min_confidence,
                top_k,
                item_count,
                needs_human_count,
            } => info!(
                target: "audit",
                event = "prediction_batch",
                timestamp = %timestamp,
                request_id = %request_id,
                model_version = model_version.as_deref(),
                model_dir = model_dir.as_deref(),
                min_confidence = *min_confidence,
                top_k = *top_k as u64,
                item_count = *item_count as u64,
                needs_human_count = *needs_human_count as u64,
                "Prediction batch served"
            ),
            AuditEvent::PredictionTimeout {
                request_id,
                path,
                timeout_ms,
                model_version,
                model_dir,
            } => info!(
                target: "audit",
                event = "prediction_timeout",
                timestamp = %timestamp,
                request_id = %request_id,
                path = %path,
                timeout_ms = *timeout_ms,
                model_version = model_version.as_deref(),
                model_dir = model_dir.as_deref(),
                "Prediction timed out"
            ),
        }
    }
}

/// Keeps records in memory, for tests and embedding hosts
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Records for one correlation id, in emission order
    pub fn for_request(&self, request_id: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.event.request_id() == request_id)
            .collect()
    }
}

impl AuditSink for MemorySink {
    fn emit(&self, record: &AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

/// Builds and emits audit events
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, event: AuditEvent) {
        self.sink.emit(&AuditRecord::now(event));
    }

    pub fn log_http_request(
        &self,
        request_id: &str,
        method: &str,
        path: &str,
        status_code: u16,
        latency: Duration,
        model: &ModelRef,
    ) {
        self.emit(AuditEvent::HttpRequest {
            request_id: request_id.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            status_code,
            latency_ms: round_millis(latency),
            model_version: model.version.clone(),
            model_dir: model.dir.clone(),
        });
    }

    pub fn log_prediction(
        &self,
        request_id: &str,
        model: &ModelRef,
        min_confidence: f64,
        top_k: usize,
        result: &PredictionResult,
    ) {
        self.emit(AuditEvent::Prediction {
            request_id: request_id.to_string(),
            model_version: model.version.clone(),
            model_dir: model.dir.clone(),
            min_confidence,
            top_k,
            label: result.label.clone(),
            confidence: result.confidence,
            needs_human: result.needs_human,
        });
    }

    pub fn log_prediction_batch(
        &self,
        request_id: &str,
        min_confidence: f64,
        top_k: usize,
        batch: &ScoredBatch,
    ) {
        self.emit(AuditEvent::PredictionBatch {
            request_id: request_id.to_string(),
            model_version: batch.model.version.clone(),
            model_dir: batch.model.dir.clone(),
            min_confidence,
            top_k,
            item_count: batch.results.len(),
            needs_human_count: batch.needs_human_count(),
        });
    }

    pub fn log_prediction_timeout(
        &self,
        request_id: &str,
        path: &str,
        timeout_ms: u64,
        model: &ModelRef,
    ) {
        self.emit(AuditEvent::PredictionTimeout {
            request_id: request_id.to_string(),
            path: path.to_string(),
            timeout_ms,
            model_version: model.version.clone(),
            model_dir: model.dir.clone(),
        });
    }
}

/// Milliseconds rounded to two decimals
fn round_millis(latency: Duration) -> f64 {
    (latency.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}
