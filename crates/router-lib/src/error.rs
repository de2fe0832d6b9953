//! Error types for model loading and prediction

use std::path::PathBuf;
use thiserror::Error;

/// Failure to build a [`crate::ModelBundle`] from an artifact directory.
///
/// A load that fails with any of these leaves the previously published
/// bundle (if any) in place.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("required artifact not found: {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("model integrity check failed: {0}")]
    Integrity(String),

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// The blocking load task panicked or was torn down
    #[error("model load task aborted: {0}")]
    Aborted(String),
}

impl LoadError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of a prediction call that did not produce results.
#[derive(Debug, Error)]
pub enum PredictError {
    /// No bundle has been published yet
    #[error("model not loaded")]
    NotLoaded,

    /// Bounded execution exceeded its deadline
    #[error("prediction timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The batch observed a cancellation request and stopped early
    #[error("prediction cancelled")]
    Cancelled,

    #[error("top_k must be at least 1")]
    InvalidTopK,

    /// Vectorizer or classifier failure for a specific input
    #[error("inference failed: {0}")]
    Inference(String),

    /// The execution slot panicked or was torn down
    #[error("prediction task failed: {0}")]
    TaskFailed(String),
}

impl PredictError {
    /// Short stable name, used as a metric label
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::NotLoaded => "not_loaded",
            PredictError::Timeout { .. } => "timeout",
            PredictError::Cancelled => "cancelled",
            PredictError::InvalidTopK => "invalid_top_k",
            PredictError::Inference(_) => "inference",
            PredictError::TaskFailed(_) => "task_failed",
        }
    }
}
