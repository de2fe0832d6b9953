//! Guarded prediction-serving engine for short-text classification
//!
//! This crate provides the core functionality for:
//! - Loading trained model artifacts into an immutable bundle
//! - Top-k prediction with confidence-based escalation to human review
//! - Deadline-bounded execution of prediction batches
//! - Structured audit events correlated by request id
//! - Readiness tracking, hot reload and metrics

pub mod audit;
pub mod bundle;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod reload;

pub use audit::{AuditEvent, AuditLogger, AuditRecord, AuditSink, MemorySink, TracingSink};
pub use bundle::{Classifier, LabelMap, ModelBundle, SparseVector, Vectorizer};
pub use error::{LoadError, PredictError};
pub use health::{HealthResponse, LoadStatus, ReadinessResponse, ReadinessState};
pub use models::*;
pub use observability::ServiceMetrics;
pub use predictor::{
    decide, Decision, Predictor, TimeoutExecutor, HUMAN_REVIEW_LABEL,
};
pub use reload::{ModelManager, WatcherHandle};
