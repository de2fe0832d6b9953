//! Immutable in-memory representation of one trained model artifact
//!
//! A bundle pairs a frozen text vectorizer with a classifier and the label
//! map that names the classifier's output columns. Bundles are built in one
//! step by [`ModelBundle::load`] and never mutated afterwards, so a single
//! `Arc<ModelBundle>` can be shared by any number of concurrent readers.

mod classifier;
mod labels;
mod metadata;
mod onnx;
mod vectorizer;

pub use classifier::{LinearClassifier, MultiClass};
pub use labels::LabelMap;
pub use metadata::{compute_checksum, ModelMetadata};
pub use onnx::OnnxClassifier;
pub use vectorizer::{Norm, TfidfVectorizer};

use crate::error::{LoadError, PredictError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Artifact file names inside a model directory
pub mod artifacts {
    pub const LINEAR_MODEL: &str = "model.json";
    pub const ONNX_MODEL: &str = "model.onnx";
    pub const VECTORIZER: &str = "vectorizer.json";
    pub const LABEL_MAP: &str = "label_map.json";
    pub const METADATA: &str = "metadata.json";
}

/// Sparse feature vector: `(column, value)` pairs sorted by column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub entries: Vec<(usize, f64)>,
}

impl SparseVector {
    pub fn new(entries: Vec<(usize, f64)>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// Expand into a dense vector of `len` columns; out-of-range columns are dropped
    pub fn to_dense(&self, len: usize) -> Vec<f32> {
        let mut dense = vec![0.0f32; len];
        for (col, value) in self.iter() {
            if let Some(slot) = dense.get_mut(col) {
                *slot = value as f32;
            }
        }
        dense
    }
}

/// Maps raw text to the feature space the classifier was trained on
pub trait Vectorizer: Send + Sync {
    fn transform(&self, text: &str) -> SparseVector;

    fn num_features(&self) -> usize;
}

/// Produces a probability row over a fixed, ordered set of class indices
pub trait Classifier: Send + Sync {
    /// Probability per class index, `num_classes()` values
    fn predict_proba(&self, features: &SparseVector) -> anyhow::Result<Vec<f64>>;

    fn num_classes(&self) -> usize;

    fn num_features(&self) -> usize;
}

/// Classifier, vectorizer and label map loaded from one artifact directory
pub struct ModelBundle {
    classifier: Box<dyn Classifier>,
    vectorizer: Box<dyn Vectorizer>,
    labels: LabelMap,
    version: Option<String>,
    directory: Option<PathBuf>,
}

impl std::fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBundle")
            .field("num_classes", &self.classifier.num_classes())
            .field("num_features", &self.vectorizer.num_features())
            .field("labels", &self.labels)
            .field("version", &self.version)
            .field("directory", &self.directory)
            .finish()
    }
}

impl ModelBundle {
    /// Assemble a bundle from already-built parts, checking that they fit together
    pub fn new(
        classifier: Box<dyn Classifier>,
        vectorizer: Box<dyn Vectorizer>,
        labels: LabelMap,
    ) -> Result<Self, LoadError> {
        let num_classes = classifier.num_classes();
        if num_classes == 0 {
            return Err(LoadError::Integrity("classifier has no classes".to_string()));
        }
        if num_classes > labels.len() {
            return Err(LoadError::Integrity(format!(
                "classifier produces {} classes but label map only names {}",
                num_classes,
                labels.len()
            )));
        }
        if classifier.num_features() != vectorizer.num_features() {
            return Err(LoadError::Integrity(format!(
                "classifier expects {} features, vectorizer produces {}",
                classifier.num_features(),
                vectorizer.num_features()
            )));
        }

        Ok(Self {
            classifier,
            vectorizer,
            labels,
            version: None,
            directory: None,
        })
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Read and validate every artifact in `dir`.
    ///
    /// Either all required artifacts parse and agree with each other, or an
    /// error is returned and nothing is constructed.
    pub fn load(dir: &Path) -> Result<Self, LoadError> {
        if !dir.is_dir() {
            return Err(LoadError::MissingArtifact {
                path: dir.to_path_buf(),
            });
        }
        let dir = fs::canonicalize(dir).map_err(|source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let metadata = ModelMetadata::load_optional(&dir.join(artifacts::METADATA))?;
        if let Some(metadata) = &metadata {
            metadata.verify_checksums(&dir)?;
        }

        let vectorizer = TfidfVectorizer::from_path(&dir.join(artifacts::VECTORIZER))?;
        let classifier = load_classifier(&dir, vectorizer.num_features())?;
        let labels = LabelMap::from_path(&dir.join(artifacts::LABEL_MAP))?;

        let version = metadata.and_then(|m| m.model_version);
        debug!(
            dir = %dir.display(),
            version = ?version,
            num_labels = labels.len(),
            "Model artifacts parsed"
        );

        Ok(Self::new(classifier, Box::new(vectorizer), labels)?
            .with_version(version)
            .with_directory(dir))
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn num_classes(&self) -> usize {
        self.classifier.num_classes()
    }

    /// Vectorize and score one text, returning one probability per class
    pub fn score(&self, text: &str) -> Result<Vec<f64>, PredictError> {
        let features = self.vectorizer.transform(text);
        let row = self
            .classifier
            .predict_proba(&features)
            .map_err(|e| PredictError::Inference(format!("{e:#}")))?;

        if row.len() != self.classifier.num_classes() {
            return Err(PredictError::Inference(format!(
                "classifier returned {} probabilities, expected {}",
                row.len(),
                self.classifier.num_classes()
            )));
        }
        Ok(row)
    }
}

fn load_classifier(dir: &Path, num_features: usize) -> Result<Box<dyn Classifier>, LoadError> {
    let linear = dir.join(artifacts::LINEAR_MODEL);
    if linear.is_file() {
        return Ok(Box::new(LinearClassifier::from_path(&linear)?));
    }

    let onnx = dir.join(artifacts::ONNX_MODEL);
    if onnx.is_file() {
        return Ok(Box::new(OnnxClassifier::from_path(&onnx, num_features)?));
    }

    Err(LoadError::MissingArtifact { path: linear })
}

/// Read a JSON artifact, mapping absence and parse failures to [`LoadError`]
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LoadError::MissingArtifact {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes).map_err(|e| LoadError::malformed(path, e))
}
