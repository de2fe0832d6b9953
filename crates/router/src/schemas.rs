//! Request and response bodies for the prediction routes
//!
//! Incoming fields are snake_case; `topK` and `minConfidence` are accepted as
//! aliases. Validation trims text and applies the configured limits before a
//! request ever reaches the predictor.

use crate::config::{ServiceConfig, MAX_TOP_K};
use crate::error::ApiError;
use router_lib::{Alternative, PredictionResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    pub text: String,
    #[serde(default, alias = "topK")]
    pub top_k: Option<i64>,
    #[serde(default, alias = "minConfidence")]
    pub min_confidence: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictBatchItem {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictBatchRequest {
    pub items: Vec<PredictBatchItem>,
    #[serde(default, alias = "topK")]
    pub top_k: Option<i64>,
    #[serde(default, alias = "minConfidence")]
    pub min_confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub label: String,
    pub confidence: f64,
    pub alternatives: Vec<Alternative>,
    pub needs_human: bool,
}

impl From<PredictionResult> for PredictResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            label: result.label,
            confidence: result.confidence,
            alternatives: result.alternatives,
            needs_human: result.needs_human,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictBatchItemResponse {
    pub id: String,
    pub label: String,
    pub confidence: f64,
    pub needs_human: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictBatchResponse {
    pub items: Vec<PredictBatchItemResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

/// Prediction parameters after defaults and range checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub top_k: usize,
    pub min_confidence: f64,
}

impl Thresholds {
    pub fn resolve(
        top_k: Option<i64>,
        min_confidence: Option<f64>,
        config: &ServiceConfig,
    ) -> Result<Self, ApiError> {
        let top_k = match top_k {
            None => config.default_top_k,
            Some(k) if (1..=MAX_TOP_K as i64).contains(&k) => k as usize,
            Some(_) => {
                return Err(ApiError::validation(format!(
                    "top_k must be between 1 and {}",
                    MAX_TOP_K
                )))
            }
        };

        let min_confidence = min_confidence.unwrap_or(config.default_min_confidence);
        // Range check also rejects NaN
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(ApiError::validation(
                "min_confidence must be between 0.0 and 1.0",
            ));
        }

        Ok(Self {
            top_k,
            min_confidence,
        })
    }
}

/// Trim `text` and check it against the length limit
pub fn clean_text(field: &str, text: &str, max_chars: usize) -> Result<String, ApiError> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return Err(ApiError::validation(format!("{} must be non-empty", field)));
    }
    if cleaned.chars().count() > max_chars {
        return Err(ApiError::validation(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(cleaned.to_string())
}

impl PredictRequest {
    pub fn validate(self, config: &ServiceConfig) -> Result<(String, Thresholds), ApiError> {
        let text = clean_text("text", &self.text, config.max_text_chars)?;
        let thresholds = Thresholds::resolve(self.top_k, self.min_confidence, config)?;
        Ok((text, thresholds))
    }
}

impl PredictBatchRequest {
    /// Returns item ids and texts in request order
    pub fn validate(
        self,
        config: &ServiceConfig,
    ) -> Result<(Vec<String>, Vec<String>, Thresholds), ApiError> {
        if self.items.is_empty() {
            return Err(ApiError::validation("items must contain at least one entry"));
        }
        if self.items.len() > config.max_batch_items {
            return Err(ApiError::validation(format!(
                "items must contain at most {} entries",
                config.max_batch_items
            )));
        }
        let thresholds = Thresholds::resolve(self.top_k, self.min_confidence, config)?;

        let mut ids = Vec::with_capacity(self.items.len());
        let mut texts = Vec::with_capacity(self.items.len());
        for (index, item) in self.items.into_iter().enumerate() {
            let id = item.id.trim();
            if id.is_empty() {
                return Err(ApiError::validation(format!(
                    "items[{}].id must be non-empty",
                    index
                )));
            }
            ids.push(id.to_string());
            texts.push(clean_text(
                &format!("items[{}].text", index),
                &item.text,
                config.max_text_chars,
            )?);
        }

        Ok((ids, texts, thresholds))
    }
}
