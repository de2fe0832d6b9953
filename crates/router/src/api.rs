//! HTTP API: health, readiness, metrics and the prediction routes

use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::schemas::{
    PredictBatchItemResponse, PredictBatchRequest, PredictBatchResponse, PredictRequest,
    PredictResponse, Thresholds,
};
use axum::{
    body::{Body, Bytes},
    extract::{MatchedPath, Request, State},
    http::{header::CONTENT_LENGTH, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use router_lib::{
    AuditLogger, PredictError, Predictor, ReadinessState, ScoredBatch, ServiceMetrics,
    TimeoutExecutor,
};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: ServiceConfig,
    pub predictor: Arc<Predictor>,
    pub readiness: ReadinessState,
    pub executor: TimeoutExecutor,
    pub audit: AuditLogger,
    pub metrics: ServiceMetrics,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        predictor: Arc<Predictor>,
        readiness: ReadinessState,
        audit: AuditLogger,
        metrics: ServiceMetrics,
    ) -> Self {
        let executor = TimeoutExecutor::from_millis(config.predict_timeout_ms);
        Self {
            config,
            predictor,
            readiness,
            executor,
            audit,
            metrics,
        }
    }
}

/// Correlation id for the request being served
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Liveness - always 200 while the process is up
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.readiness.health(&state.predictor))
}

/// Readiness - 503 while a configured model is not serving
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.readiness.readiness(&state.predictor).await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let buffer = state
        .metrics
        .encode()
        .map_err(|e| ApiError::Internal(format!("metrics encoding failed: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
        .into_response())
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<PredictResponse>, ApiError> {
    let request: PredictRequest = parse_body(&body)?;
    let (text, thresholds) = request.validate(&state.config)?;

    let batch = run_prediction(&state, &request_id, "/predict", vec![text], thresholds).await?;
    let result = batch
        .results
        .first()
        .cloned()
        .ok_or_else(|| ApiError::Internal("prediction returned no result".to_string()))?;

    state.audit.log_prediction(
        &request_id,
        &batch.model,
        thresholds.min_confidence,
        thresholds.top_k,
        &result,
    );

    Ok(Json(result.into()))
}

async fn predict_batch(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<PredictBatchResponse>, ApiError> {
    let request: PredictBatchRequest = parse_body(&body)?;
    let (ids, texts, thresholds) = request.validate(&state.config)?;

    let batch = run_prediction(&state, &request_id, "/predict_batch", texts, thresholds).await?;
    if batch.results.len() != ids.len() {
        return Err(ApiError::Internal(format!(
            "expected {} results, got {}",
            ids.len(),
            batch.results.len()
        )));
    }

    state.audit.log_prediction_batch(
        &request_id,
        thresholds.min_confidence,
        thresholds.top_k,
        &batch,
    );

    let items = ids
        .into_iter()
        .zip(batch.results)
        .map(|(id, result)| PredictBatchItemResponse {
            id,
            label: result.label,
            confidence: result.confidence,
            needs_human: result.needs_human,
        })
        .collect();

    Ok(Json(PredictBatchResponse {
        items,
        model_version: batch.model.version,
    }))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::validation(format!("Invalid request body: {}", e)))
}

/// Run one batch under the configured deadline against a single bundle snapshot
async fn run_prediction(
    state: &AppState,
    request_id: &str,
    path: &str,
    texts: Vec<String>,
    thresholds: Thresholds,
) -> Result<ScoredBatch, ApiError> {
    if !state.predictor.is_loaded() {
        return Err(ApiError::NotLoaded);
    }

    // Identifies the bundle this call runs against, even if a reload lands before the deadline
    let model = state.predictor.model_ref();
    let predictor = Arc::clone(&state.predictor);
    let started = Instant::now();
    let outcome = state
        .executor
        .run_bounded(move |cancel| {
            predictor.predict_batch(
                &texts,
                thresholds.top_k,
                thresholds.min_confidence,
                &cancel,
            )
        })
        .await;

    match outcome {
        Ok(batch) => {
            state.metrics.observe_prediction(
                started.elapsed(),
                batch.results.len(),
                batch.needs_human_count(),
            );
            Ok(batch)
        }
        Err(PredictError::Timeout { timeout_ms }) => {
            state.metrics.inc_prediction_timeouts();
            state
                .audit
                .log_prediction_timeout(request_id, path, timeout_ms, &model);
            warn!(request_id, path, timeout_ms, "Prediction timed out");
            Err(ApiError::Timeout)
        }
        Err(e) => {
            state.metrics.inc_prediction_errors(e.kind());
            Err(e.into())
        }
    }
}

/// Assign the correlation id, echo it back and emit the request audit event
async fn track_request(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status = response.status().as_u16();
    state.metrics.observe_http_request(&route, status);
    state.audit.log_http_request(
        &request_id,
        &method,
        &path,
        status,
        started.elapsed(),
        &state.predictor.model_ref(),
    );

    response
}

/// Reject bodies over the configured limit, by declared length first and
/// then by what actually arrives
async fn limit_body(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = state.config.max_body_bytes;
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(ApiError::PayloadTooLarge);
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| ApiError::PayloadTooLarge)?;

    Ok(next
        .run(Request::from_parts(parts, Body::from(bytes)))
        .await)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let predict_routes = Router::new()
        .route("/predict", post(predict))
        .route("/predict_batch", post(predict_batch))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_body));

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .merge(predict_routes)
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .with_state(state)
}

/// Start the API server and run until ctrl-c or SIGTERM
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
