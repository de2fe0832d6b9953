//! Background model loading and hot reload
//!
//! The manager loads the artifact directory off the async runtime, publishes
//! the result through the shared [`Predictor`] and keeps readiness and metrics
//! in step. An optional filesystem watcher reloads the bundle when artifacts
//! change; a failed reload keeps the bundle that is already serving.

use crate::error::LoadError;
use crate::health::ReadinessState;
use crate::observability::ServiceMetrics;
use crate::predictor::Predictor;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Owns the configured artifact directory and drives (re)loads into a predictor
#[derive(Clone)]
pub struct ModelManager {
    predictor: Arc<Predictor>,
    readiness: ReadinessState,
    metrics: Option<ServiceMetrics>,
    dir: PathBuf,
}

impl ModelManager {
    pub fn new(
        predictor: Arc<Predictor>,
        readiness: ReadinessState,
        dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            predictor,
            readiness,
            metrics: None,
            dir: dir.into(),
        }
    }

    pub fn with_metrics(mut self, metrics: ServiceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the bundle and publish it.
    ///
    /// Readiness moves to `Loading` only while nothing is serving yet, so a
    /// reload never takes a ready service out of rotation.
    pub async fn load(&self) -> Result<(), LoadError> {
        if !self.predictor.is_loaded() {
            self.readiness.set_loading().await;
        }

        let predictor = Arc::clone(&self.predictor);
        let dir = self.dir.clone();
        let started = Instant::now();

        let result = match tokio::task::spawn_blocking(move || predictor.load(&dir)).await {
            Ok(result) => result,
            Err(e) => Err(LoadError::Aborted(e.to_string())),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let serving = match &result {
            Ok(bundle) => {
                self.readiness.set_loaded().await;
                info!(
                    event = "model_loaded",
                    model_dir = %self.dir.display(),
                    model_version = ?bundle.version(),
                    elapsed_ms,
                    "Model loaded"
                );
                Some(Arc::clone(bundle))
            }
            Err(e) => {
                self.readiness.set_failed(e.to_string()).await;
                let serving = self.predictor.snapshot();
                error!(
                    event = "model_load_failed",
                    model_dir = %self.dir.display(),
                    error = %e,
                    still_serving = ?serving.as_ref().and_then(|b| b.version()),
                    elapsed_ms,
                    "Model load failed"
                );
                serving
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_model_load(
                result.is_ok(),
                serving.as_ref().and_then(|b| b.version()),
                serving.is_some(),
            );
        }

        result.map(|_| ())
    }

    /// Reload after an artifact change. Errors are logged, not returned.
    pub async fn reload(&self) {
        if self.load().await.is_ok() {
            debug!(model_dir = %self.dir.display(), "Reload complete");
        }
    }

    /// Watch the artifact directory and reload once changes settle for `debounce`.
    /// Returns a handle that stops watching when dropped.
    pub fn watch(&self, debounce: Duration) -> Result<WatcherHandle> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if is_content_change(&event.kind) => {
                    let _ = tx.send(event);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Filesystem watcher error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", self.dir.display()))?;
        info!(path = %self.dir.display(), debounce_ms = debounce.as_millis() as u64, "Watching model directory");

        let manager = self.clone();
        let task = tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                debug!(paths = ?first.paths, "Model artifacts changed");

                // Coalesce a burst of writes into one reload
                loop {
                    match tokio::time::timeout(debounce, rx.recv()).await {
                        Ok(Some(_)) => continue,
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }

                manager.reload().await;
            }
            debug!("Watcher channel closed");
        });

        Ok(WatcherHandle {
            _watcher: watcher,
            task,
        })
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Handle to a running watcher
/// Stops watching when dropped
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
