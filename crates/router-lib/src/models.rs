//! Core data models for prediction results

use serde::{Deserialize, Serialize};

/// One ranked (label, confidence) candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub label: String,
    pub confidence: f64,
}

/// Prediction outcome for a single input text
///
/// `alternatives[0]` is always the original top class, even when `label`
/// has been replaced by the escalation sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: String,
    pub confidence: f64,
    pub alternatives: Vec<Alternative>,
    pub needs_human: bool,
}

/// Identity of the bundle that served a call, for responses and audit events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub version: Option<String>,
    pub dir: Option<String>,
}

/// Results of one batch together with the bundle that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBatch {
    pub model: ModelRef,
    pub results: Vec<PredictionResult>,
}

impl ScoredBatch {
    pub fn needs_human_count(&self) -> usize {
        self.results.iter().filter(|r| r.needs_human).count()
    }
}
