//! Batched top-k prediction against the currently published model
//!
//! The [`Predictor`] owns zero or one [`ModelBundle`] behind an
//! atomically swappable `Arc`. Every call captures one bundle reference at
//! entry and uses it for the whole batch, so a concurrent `load` never
//! produces a torn mix of old and new artifacts.

mod escalation;
mod executor;

pub use escalation::{decide, Decision, HUMAN_REVIEW_LABEL};
pub use executor::TimeoutExecutor;

use crate::bundle::ModelBundle;
use crate::error::{LoadError, PredictError};
use crate::models::{Alternative, ModelRef, PredictionResult, ScoredBatch};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Thread-safe handle to the currently loaded model
#[derive(Debug, Default)]
pub struct Predictor {
    current: RwLock<Option<Arc<ModelBundle>>>,
    inference_count: AtomicU64,
}

impl Predictor {
    /// Create a predictor with no model published
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(bundle: ModelBundle) -> Self {
        let predictor = Self::new();
        predictor.publish(bundle);
        predictor
    }

    /// Load a bundle from `dir` and publish it, returning the published bundle.
    ///
    /// On failure the previously published bundle stays current.
    pub fn load(&self, dir: &Path) -> Result<Arc<ModelBundle>, LoadError> {
        let bundle = Arc::new(ModelBundle::load(dir)?);
        let previous = self.swap(Arc::clone(&bundle));

        info!(
            dir = ?bundle.directory(),
            version = ?bundle.version(),
            replaced = ?previous.as_ref().and_then(|b| b.version()),
            "Model published"
        );
        Ok(bundle)
    }

    /// Atomically replace the current bundle, returning the one it replaced.
    /// Calls already holding the old bundle finish against it.
    pub fn publish(&self, bundle: ModelBundle) -> Option<Arc<ModelBundle>> {
        self.swap(Arc::new(bundle))
    }

    fn swap(&self, bundle: Arc<ModelBundle>) -> Option<Arc<ModelBundle>> {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        current.replace(bundle)
    }

    /// The bundle new calls would use right now
    pub fn snapshot(&self) -> Option<Arc<ModelBundle>> {
        // The slot only ever holds a complete Arc, so a poisoned lock is still consistent
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    pub fn model_version(&self) -> Option<String> {
        self.snapshot()
            .and_then(|b| b.version().map(str::to_string))
    }

    /// Normalized artifact directory of the current bundle
    pub fn model_dir(&self) -> Option<String> {
        self.snapshot()
            .and_then(|b| b.directory().map(|d| d.display().to_string()))
    }

    /// Total texts scored since startup
    pub fn inference_count(&self) -> u64 {
        self.inference_count.load(Ordering::Relaxed)
    }

    /// Version and directory of the bundle new calls would use
    pub fn model_ref(&self) -> ModelRef {
        self.snapshot()
            .map(|b| model_ref(&b))
            .unwrap_or_default()
    }

    /// Predict every text against one captured bundle
    pub fn predict(
        &self,
        texts: &[String],
        top_k: usize,
        min_confidence: f64,
    ) -> Result<Vec<PredictionResult>, PredictError> {
        self.predict_batch(texts, top_k, min_confidence, &CancellationToken::new())
            .map(|batch| batch.results)
    }

    /// Like [`Predictor::predict`], also reporting which bundle served the
    /// batch and stopping between texts once `cancel` fires
    pub fn predict_batch(
        &self,
        texts: &[String],
        top_k: usize,
        min_confidence: f64,
        cancel: &CancellationToken,
    ) -> Result<ScoredBatch, PredictError> {
        let bundle = self.snapshot().ok_or(PredictError::NotLoaded)?;
        if top_k == 0 {
            return Err(PredictError::InvalidTopK);
        }

        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            if cancel.is_cancelled() {
                debug!(completed = results.len(), total = texts.len(), "Prediction cancelled");
                return Err(PredictError::Cancelled);
            }
            results.push(predict_one(&bundle, text, top_k, min_confidence)?);
            self.inference_count.fetch_add(1, Ordering::Relaxed);
        }

        Ok(ScoredBatch {
            model: model_ref(&bundle),
            results,
        })
    }
}

fn model_ref(bundle: &ModelBundle) -> ModelRef {
    ModelRef {
        version: bundle.version().map(str::to_string),
        dir: bundle.directory().map(|d| d.display().to_string()),
    }
}

fn predict_one(
    bundle: &ModelBundle,
    text: &str,
    top_k: usize,
    min_confidence: f64,
) -> Result<PredictionResult, PredictError> {
    let row = bundle.score(text)?;

    let alternatives = top_k_indices(&row, top_k)
        .into_iter()
        .map(|index| {
            let label = bundle.labels().get(index).ok_or_else(|| {
                PredictError::Inference(format!("class index {} has no label", index))
            })?;
            Ok(Alternative {
                label: label.to_string(),
                confidence: row[index],
            })
        })
        .collect::<Result<Vec<_>, PredictError>>()?;

    let top = alternatives
        .first()
        .ok_or_else(|| PredictError::Inference("empty probability row".to_string()))?;
    let decision = decide(&top.label, top.confidence, min_confidence);

    Ok(PredictionResult {
        label: decision.label,
        confidence: top.confidence,
        needs_human: decision.needs_human,
        alternatives,
    })
}

/// Indices of the `min(top_k, row.len())` highest probabilities.
///
/// Descending by probability, ties by ascending index; non-finite values
/// (NaN and either infinity) rank after every finite one.
pub fn top_k_indices(row: &[f64], top_k: usize) -> Vec<usize> {
    let key = |p: f64| if p.is_finite() { p } else { f64::NEG_INFINITY };
    let mut indices: Vec<usize> = (0..row.len()).collect();
    // Stable sort keeps ascending index order among equal probabilities
    indices.sort_by(|&a, &b| key(row[b]).total_cmp(&key(row[a])));
    indices.truncate(top_k.min(row.len()));
    indices
}
