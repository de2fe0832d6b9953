//! TF-IDF text vectorizer
//!
//! Reproduces the usual TF-IDF transform: lowercase, tokens of two or more
//! word characters, word n-grams joined by a space, raw (or sublinear) term
//! counts scaled by a fitted IDF vector, then row normalization. The
//! vocabulary and IDF weights are fit offline and frozen in `vectorizer.json`.

use super::{read_json, SparseVector, Vectorizer};
use crate::error::LoadError;
use regex::Regex;
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const TOKEN_PATTERN: &str = r"\b\w\w+\b";

/// Row normalization applied after IDF weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

#[derive(Debug, Deserialize)]
struct TfidfSpec {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    #[serde(default = "default_ngram_range")]
    ngram_range: (usize, usize),
    #[serde(default = "default_true")]
    lowercase: bool,
    #[serde(default)]
    sublinear_tf: bool,
    #[serde(default = "default_norm")]
    norm: Option<Norm>,
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_true() -> bool {
    true
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

/// Frozen TF-IDF transform
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    ngram_range: (usize, usize),
    lowercase: bool,
    sublinear_tf: bool,
    norm: Option<Norm>,
    token_pattern: Regex,
}

impl TfidfVectorizer {
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let spec: TfidfSpec = read_json(path)?;
        Self::from_spec(spec).map_err(|reason| LoadError::malformed(path, reason))
    }

    fn from_spec(spec: TfidfSpec) -> Result<Self, String> {
        if spec.idf.is_empty() {
            return Err("idf vector is empty".to_string());
        }
        let (min_n, max_n) = spec.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(format!("invalid ngram_range ({}, {})", min_n, max_n));
        }
        if let Some((term, col)) = spec
            .vocabulary
            .iter()
            .find(|(_, col)| **col >= spec.idf.len())
        {
            return Err(format!(
                "term {:?} maps to column {} but idf has {} entries",
                term,
                col,
                spec.idf.len()
            ));
        }

        let token_pattern = Regex::new(TOKEN_PATTERN).map_err(|e| e.to_string())?;

        Ok(Self {
            vocabulary: spec.vocabulary,
            idf: spec.idf,
            ngram_range: spec.ngram_range,
            lowercase: spec.lowercase,
            sublinear_tf: spec.sublinear_tf,
            norm: spec.norm,
            token_pattern,
        })
    }

    fn term_counts(&self, text: &str) -> BTreeMap<usize, f64> {
        let text: Cow<'_, str> = if self.lowercase {
            Cow::Owned(text.to_lowercase())
        } else {
            Cow::Borrowed(text)
        };
        let tokens: Vec<&str> = self
            .token_pattern
            .find_iter(&text)
            .map(|m| m.as_str())
            .collect();

        let mut counts = BTreeMap::new();
        let (min_n, max_n) = self.ngram_range;
        for n in min_n..=max_n {
            if tokens.len() < n {
                break;
            }
            for window in tokens.windows(n) {
                let gram = window.join(" ");
                if let Some(&col) = self.vocabulary.get(&gram) {
                    *counts.entry(col).or_insert(0.0) += 1.0;
                }
            }
        }
        counts
    }
}

impl Vectorizer for TfidfVectorizer {
    fn transform(&self, text: &str) -> SparseVector {
        let mut entries: Vec<(usize, f64)> = self
            .term_counts(text)
            .into_iter()
            .map(|(col, count)| {
                let tf = if self.sublinear_tf { 1.0 + count.ln() } else { count };
                (col, tf * self.idf[col])
            })
            .collect();

        let norm = match self.norm {
            Some(Norm::L2) => entries.iter().map(|(_, v)| v * v).sum::<f64>().sqrt(),
            Some(Norm::L1) => entries.iter().map(|(_, v)| v.abs()).sum::<f64>(),
            None => 1.0,
        };
        if norm > 0.0 {
            for (_, value) in entries.iter_mut() {
                *value /= norm;
            }
        }

        SparseVector::new(entries)
    }

    fn num_features(&self) -> usize {
        self.idf.len()
    }
}
