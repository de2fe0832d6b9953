//! Class index to label mapping

use super::read_json;
use crate::error::LoadError;
use crate::predictor::HUMAN_REVIEW_LABEL;
use std::collections::BTreeMap;
use std::path::Path;

/// Dense mapping from class index `0..N-1` to a human-readable label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    /// Build from labels already in class-index order
    pub fn new(labels: Vec<String>) -> Result<Self, LoadError> {
        if labels.is_empty() {
            return Err(LoadError::Integrity("label map is empty".to_string()));
        }
        // The escalation sentinel must stay unambiguous
        if let Some(index) = labels.iter().position(|l| l == HUMAN_REVIEW_LABEL) {
            return Err(LoadError::Integrity(format!(
                "label {} uses the reserved name {:?}",
                index, HUMAN_REVIEW_LABEL
            )));
        }
        Ok(Self { labels })
    }

    /// Load `{"0": "billing", "1": "account", ...}` from disk
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let raw: BTreeMap<String, String> = read_json(path)?;

        let mut indexed = BTreeMap::new();
        for (key, label) in raw {
            let index: usize = key.trim().parse().map_err(|_| {
                LoadError::malformed(path, format!("label index {:?} is not an integer", key))
            })?;
            if indexed.insert(index, label).is_some() {
                return Err(LoadError::malformed(
                    path,
                    format!("label index {} appears more than once", index),
                ));
            }
        }

        for (expected, index) in indexed.keys().enumerate() {
            if *index != expected {
                return Err(LoadError::Integrity(format!(
                    "label map indices must be dense from 0, missing index {}",
                    expected
                )));
            }
        }

        Self::new(indexed.into_values().collect())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
