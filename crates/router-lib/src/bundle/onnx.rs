//! ONNX classifier artifacts executed with tract
//!
//! The graph takes a dense `f32[1, n_features]` row and must expose a float
//! `[1, n_classes]` probability output. The class count is discovered at
//! load time by running an all-zero row.

use super::{Classifier, SparseVector};
use crate::error::LoadError;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Inference latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-based classifier using tract for lightweight inference
pub struct OnnxClassifier {
    model: TractModel,
    num_features: usize,
    num_classes: usize,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("num_features", &self.num_features)
            .field("num_classes", &self.num_classes)
            .finish()
    }
}

impl OnnxClassifier {
    pub fn from_path(path: &Path, num_features: usize) -> Result<Self, LoadError> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes, num_features)
            .map_err(|e| LoadError::malformed(path, format!("{e:#}")))
    }

    /// Load, optimize and dry-run an ONNX model from bytes
    pub fn from_bytes(model_bytes: &[u8], num_features: usize) -> Result<Self> {
        if num_features == 0 {
            anyhow::bail!("model input must have at least one feature");
        }
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, num_features]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        let zero_row = run_model(&model, vec![0.0; num_features], num_features)
            .context("Zero-row inference failed")?;
        if zero_row.is_empty() {
            anyhow::bail!("model produced an empty probability row");
        }

        Ok(Self {
            model,
            num_features,
            num_classes: zero_row.len(),
        })
    }
}

fn run_model(model: &TractModel, row: Vec<f32>, num_features: usize) -> Result<Vec<f64>> {
    let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, num_features), row)?.into();
    let outputs = model.run(tvec!(input.into()))?;

    // Converters commonly emit the predicted label first, then probabilities
    for output in outputs.iter() {
        if output.datum_type() != f32::datum_type() {
            continue;
        }
        let view = output.to_array_view::<f32>()?;
        if view.ndim() == 2 && view.shape()[0] == 1 {
            return Ok(view.iter().map(|p| f64::from(*p)).collect());
        }
    }
    anyhow::bail!("model has no f32[1, n] probability output")
}

impl Classifier for OnnxClassifier {
    fn predict_proba(&self, features: &SparseVector) -> Result<Vec<f64>> {
        let start = Instant::now();
        let row = run_model(
            &self.model,
            features.to_dense(self.num_features),
            self.num_features,
        )?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "Inference exceeded {}ms target", SLOW_INFERENCE_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, "Inference completed");
        }
        Ok(row)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn num_features(&self) -> usize {
        self.num_features
    }
}
