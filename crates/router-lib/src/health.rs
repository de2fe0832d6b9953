//! Liveness and readiness derived from predictor state
//!
//! Liveness only says the process is up. Readiness holds traffic while a
//! configured model is loading or has failed to load, but a deployment with
//! no model directory configured is always ready.

use crate::predictor::Predictor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where the configured model is in its load lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LoadStatus {
    /// No model directory was configured
    NotConfigured,
    /// Configured, load not started or in progress
    Loading,
    /// Most recent load succeeded
    Loaded,
    /// Most recent load failed with the given reason
    Failed(String),
}

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_dir: Option<String>,
    pub model_version: Option<String>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub ready: bool,
    pub model_loaded: bool,
    pub model_dir: Option<String>,
    pub model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Tracks model load progress for readiness checks
#[derive(Debug, Clone)]
pub struct ReadinessState {
    model_configured: bool,
    status: Arc<RwLock<LoadStatus>>,
}

impl ReadinessState {
    pub fn new(model_configured: bool) -> Self {
        let initial = if model_configured {
            LoadStatus::Loading
        } else {
            LoadStatus::NotConfigured
        };
        Self {
            model_configured,
            status: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn model_configured(&self) -> bool {
        self.model_configured
    }

    pub async fn status(&self) -> LoadStatus {
        self.status.read().await.clone()
    }

    pub async fn set_status(&self, status: LoadStatus) {
        let mut current = self.status.write().await;
        *current = status;
    }

    pub async fn set_loading(&self) {
        self.set_status(LoadStatus::Loading).await;
    }

    pub async fn set_loaded(&self) {
        self.set_status(LoadStatus::Loaded).await;
    }

    pub async fn set_failed(&self, reason: impl Into<String>) {
        self.set_status(LoadStatus::Failed(reason.into())).await;
    }

    /// Liveness: always ok while the process runs
    pub fn health(&self, predictor: &Predictor) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            model_loaded: predictor.is_loaded(),
            model_dir: predictor.model_dir(),
            model_version: predictor.model_version(),
        }
    }

    /// Readiness: false only when a configured model is not usable yet
    pub async fn readiness(&self, predictor: &Predictor) -> ReadinessResponse {
        let model_loaded = predictor.is_loaded();

        // A model that is already serving keeps the service ready even if a reload failed
        let reason = if !self.model_configured || model_loaded {
            None
        } else {
            Some(match self.status().await {
                LoadStatus::Failed(reason) => format!("Model load failed: {}", reason),
                _ => "Model loading".to_string(),
            })
        };

        ReadinessResponse {
            status: "ok".to_string(),
            ready: reason.is_none(),
            model_loaded,
            model_dir: predictor.model_dir(),
            model_version: predictor.model_version(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{Classifier, LabelMap, ModelBundle, SparseVector, Vectorizer};

    struct Uniform;

    impl Classifier for Uniform {
        fn predict_proba(&self, _: &SparseVector) -> anyhow::Result<Vec<f64>> {
            Ok(vec![0.5, 0.5])
        }
        fn num_classes(&self) -> usize {
            2
        }
        fn num_features(&self) -> usize {
            1
        }
    }

    impl Vectorizer for Uniform {
        fn transform(&self, _: &str) -> SparseVector {
            SparseVector::default()
        }
        fn num_features(&self) -> usize {
            1
        }
    }

    fn loaded_predictor() -> Predictor {
        let labels = LabelMap::new(vec!["a".to_string(), "b".to_string()]).unwrap();
        Predictor::with_bundle(
            ModelBundle::new(Box::new(Uniform), Box::new(Uniform), labels)
                .unwrap()
                .with_version(Some("v1".to_string())),
        )
    }

    #[test]
    fn test_health_is_always_ok() {
        let state = ReadinessState::new(true);
        let health = state.health(&Predictor::new());
        assert_eq!(health.status, "ok");
        assert!(!health.model_loaded);

        let health = state.health(&loaded_predictor());
        assert!(health.model_loaded);
        assert_eq!(health.model_version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_ready_without_configured_model() {
        let state = ReadinessState::new(false);
        assert_eq!(state.status().await, LoadStatus::NotConfigured);

        let readiness = state.readiness(&Predictor::new()).await;
        assert!(readiness.ready);
        assert!(!readiness.model_loaded);
        assert!(readiness.reason.is_none());
    }

    #[tokio::test]
    async fn test_not_ready_while_loading() {
        let state = ReadinessState::new(true);
        let readiness = state.readiness(&Predictor::new()).await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Model loading"));
    }

    #[tokio::test]
    async fn test_not_ready_after_failed_load() {
        let state = ReadinessState::new(true);
        state.set_failed("label_map.json missing").await;

        let readiness = state.readiness(&Predictor::new()).await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().contains("label_map.json missing"));
    }

    #[tokio::test]
    async fn test_ready_once_loaded() {
        let state = ReadinessState::new(true);
        state.set_loaded().await;

        let readiness = state.readiness(&loaded_predictor()).await;
        assert!(readiness.ready);
        assert!(readiness.model_loaded);
    }

    #[tokio::test]
    async fn test_failed_reload_with_serving_model_stays_ready() {
        let state = ReadinessState::new(true);
        state.set_failed("bad reload").await;

        let readiness = state.readiness(&loaded_predictor()).await;
        assert!(readiness.ready);
    }

    #[test]
    fn test_readiness_reason_omitted_when_ready() {
        let response = ReadinessResponse {
            status: "ok".to_string(),
            ready: true,
            model_loaded: false,
            model_dir: None,
            model_version: None,
            reason: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("reason").is_none());
        assert!(json["model_dir"].is_null());
    }
}
