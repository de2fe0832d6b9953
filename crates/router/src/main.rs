//! Ticket Router - short-text classification service
//!
//! Serves top-k predictions for support tickets and escalates low-confidence
//! results to human review.

use anyhow::Result;
use router_lib::{AuditLogger, ModelManager, Predictor, ReadinessState, ServiceMetrics};
use std::sync::Arc;
use ticket_router::{api, config::ServiceConfig};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration comes first: it carries the fallback log level
    let config = ServiceConfig::load()?;

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(fmt::layer().json())
        .init();

    info!(
        version = SERVICE_VERSION,
        model_dir = ?config.model_dir,
        predict_timeout_ms = config.predict_timeout_ms,
        "Starting ticket-router"
    );

    let predictor = Arc::new(Predictor::new());
    let readiness = ReadinessState::new(config.model_dir.is_some());
    let metrics = ServiceMetrics::new()?;

    let app_state = Arc::new(api::AppState::new(
        config.clone(),
        Arc::clone(&predictor),
        readiness.clone(),
        AuditLogger::default(),
        metrics.clone(),
    ));

    // Held for the lifetime of the server; dropping it stops the watcher
    let _watcher = match &config.model_dir {
        Some(dir) => {
            let manager = ModelManager::new(predictor, readiness, dir).with_metrics(metrics);

            let watcher = if config.model_watch {
                match manager.watch(config.watch_debounce()) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!(error = %e, "Model directory watch disabled");
                        None
                    }
                }
            } else {
                None
            };

            // Load in the background; /ready reports progress meanwhile
            tokio::spawn(async move {
                let _ = manager.load().await;
            });

            watcher
        }
        None => {
            info!("MODEL_DIR not set, serving without a model");
            None
        }
    };

    api::serve(config.listen_addr()?, app_state).await?;

    info!("Shutting down");
    Ok(())
}
