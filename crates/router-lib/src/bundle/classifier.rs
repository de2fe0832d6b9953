//! Linear (logistic-regression) classifier over sparse features

use super::{read_json, Classifier, SparseVector};
use crate::error::LoadError;
use serde::Deserialize;
use std::path::Path;

/// How per-class logits become a probability row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiClass {
    /// Softmax over all logits
    #[default]
    Multinomial,
    /// Independent sigmoids, normalized to sum to one
    Ovr,
}

#[derive(Debug, Deserialize)]
struct LinearSpec {
    coef: Vec<Vec<f64>>,
    intercept: Vec<f64>,
    #[serde(default)]
    multi_class: MultiClass,
}

/// Logistic regression with one weight row per class.
///
/// A single weight row is the binary case: it scores class 1 and class 0
/// receives the complement.
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    coef: Vec<Vec<f64>>,
    intercept: Vec<f64>,
    multi_class: MultiClass,
}

impl LinearClassifier {
    pub fn new(
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
        multi_class: MultiClass,
    ) -> Result<Self, String> {
        let width = coef.first().map(Vec::len).unwrap_or(0);
        if width == 0 {
            return Err("coef must be a non-empty matrix".to_string());
        }
        if coef.iter().any(|row| row.len() != width) {
            return Err("coef rows have different lengths".to_string());
        }
        if intercept.len() != coef.len() {
            return Err(format!(
                "intercept has {} entries for {} coef rows",
                intercept.len(),
                coef.len()
            ));
        }
        Ok(Self {
            coef,
            intercept,
            multi_class,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let spec: LinearSpec = read_json(path)?;
        Self::new(spec.coef, spec.intercept, spec.multi_class)
            .map_err(|reason| LoadError::malformed(path, reason))
    }

    fn logits(&self, features: &SparseVector) -> anyhow::Result<Vec<f64>> {
        let width = self.num_features();
        let mut logits = self.intercept.clone();
        for (col, value) in features.iter() {
            if col >= width {
                anyhow::bail!("feature column {} out of range for {} features", col, width);
            }
            for (logit, row) in logits.iter_mut().zip(&self.coef) {
                *logit += row[col] * value;
            }
        }
        Ok(logits)
    }
}

impl Classifier for LinearClassifier {
    fn predict_proba(&self, features: &SparseVector) -> anyhow::Result<Vec<f64>> {
        let logits = self.logits(features)?;

        if logits.len() == 1 {
            let p = sigmoid(logits[0]);
            return Ok(vec![1.0 - p, p]);
        }

        Ok(match self.multi_class {
            MultiClass::Multinomial => softmax(&logits),
            MultiClass::Ovr => {
                let raw: Vec<f64> = logits.iter().map(|z| sigmoid(*z)).collect();
                let total: f64 = raw.iter().sum();
                raw.iter().map(|p| p / total).collect()
            }
        })
    }

    fn num_classes(&self) -> usize {
        if self.coef.len() == 1 {
            2
        } else {
            self.coef.len()
        }
    }

    fn num_features(&self) -> usize {
        self.coef.first().map(Vec::len).unwrap_or(0)
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}
