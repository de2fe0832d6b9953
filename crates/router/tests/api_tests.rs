//! Integration tests for the ticket-router API endpoints

use axum::{
    body::Body,
    http::{header::CONTENT_LENGTH, HeaderMap, Request, StatusCode},
    Router,
};
use router_lib::{
    AuditEvent, AuditLogger, Classifier, LabelMap, MemorySink, ModelBundle, Predictor,
    ReadinessState, ServiceMetrics, SparseVector, Vectorizer, HUMAN_REVIEW_LABEL,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use ticket_router::api::{create_router, AppState};
use ticket_router::config::ServiceConfig;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    audit: Arc<MemorySink>,
}

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../router-lib/tests/fixtures/ticket-model")
}

async fn setup_test_app(config: ServiceConfig, predictor: Predictor) -> TestApp {
    let readiness = ReadinessState::new(config.model_dir.is_some());
    if predictor.is_loaded() {
        readiness.set_loaded().await;
    }

    let audit = Arc::new(MemorySink::new());
    let state = Arc::new(AppState::new(
        config,
        Arc::new(predictor),
        readiness,
        AuditLogger::new(audit.clone()),
        ServiceMetrics::new().unwrap(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        audit,
    }
}

async fn loaded_app() -> TestApp {
    let predictor = Predictor::new();
    predictor.load(&fixture_dir()).unwrap();
    let config = ServiceConfig {
        model_dir: Some(fixture_dir()),
        ..ServiceConfig::default()
    };
    setup_test_app(config, predictor).await
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    (status, headers, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value, request_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(id) = request_id {
        builder = builder.header("x-request-id", id);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Sleeps in the vectorizer so prediction outlives a short deadline
struct SlowVectorizer(Duration);

impl Vectorizer for SlowVectorizer {
    fn transform(&self, _text: &str) -> SparseVector {
        std::thread::sleep(self.0);
        SparseVector::default()
    }

    fn num_features(&self) -> usize {
        1
    }
}

struct EvenSplit;

impl Classifier for EvenSplit {
    fn predict_proba(&self, _features: &SparseVector) -> anyhow::Result<Vec<f64>> {
        Ok(vec![0.5, 0.5])
    }

    fn num_classes(&self) -> usize {
        2
    }

    fn num_features(&self) -> usize {
        1
    }
}

fn slow_predictor(delay: Duration) -> Predictor {
    let labels = LabelMap::new(vec!["billing".to_string(), "technical".to_string()]).unwrap();
    let bundle = ModelBundle::new(Box::new(EvenSplit), Box::new(SlowVectorizer(delay)), labels)
        .unwrap()
        .with_version(Some("slow".to_string()));
    Predictor::with_bundle(bundle)
}

#[tokio::test]
async fn test_health_reports_model_state() {
    let app = setup_test_app(ServiceConfig::default(), Predictor::new()).await;

    let (status, _, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model_loaded"], false);
    assert_eq!(body["model_version"], Value::Null);
}

#[tokio::test]
async fn test_ready_without_model_dir() {
    let app = setup_test_app(ServiceConfig::default(), Predictor::new()).await;

    let (status, _, body) = send(&app, get("/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["model_loaded"], false);
}

#[tokio::test]
async fn test_ready_returns_503_while_configured_model_missing() {
    let config = ServiceConfig {
        model_dir: Some(PathBuf::from("/nonexistent/model")),
        ..ServiceConfig::default()
    };
    let app = setup_test_app(config, Predictor::new()).await;

    let (status, _, body) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
    assert_eq!(body["reason"], "Model loading");

    app.state.readiness.set_failed("required artifact not found").await;
    let (status, _, body) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["reason"]
        .as_str()
        .unwrap()
        .starts_with("Model load failed"));
}

#[tokio::test]
async fn test_ready_with_loaded_model() {
    let app = loaded_app().await;

    let (status, _, body) = send(&app, get("/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["model_version"], "test");
}

#[tokio::test]
async fn test_predict_without_model_returns_503() {
    let app = setup_test_app(ServiceConfig::default(), Predictor::new()).await;

    let (status, _, body) = send(
        &app,
        post_json("/predict", &json!({"text": "I need help with my invoice"}), None),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "Model not loaded");
}

#[tokio::test]
async fn test_predict_routes_confident_ticket() {
    let app = loaded_app().await;

    let (status, _, body) = send(
        &app,
        post_json("/predict", &json!({"text": "I need help with my invoice"}), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["label"], "billing");
    assert_eq!(body["needs_human"], false);
    assert_eq!(body["alternatives"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_predict_escalates_below_threshold() {
    let app = loaded_app().await;

    let (status, _, body) = send(
        &app,
        post_json(
            "/predict",
            &json!({"text": "I need help with my invoice", "min_confidence": 0.99}),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["label"], HUMAN_REVIEW_LABEL);
    assert_eq!(body["needs_human"], true);
    // The original top class is still reported first
    assert_eq!(body["alternatives"][0]["label"], "billing");
}

#[tokio::test]
async fn test_predict_zero_threshold_never_escalates() {
    let app = loaded_app().await;

    let (status, _, body) = send(
        &app,
        post_json(
            "/predict",
            &json!({"text": "I need help with my invoice", "minConfidence": 0.0, "topK": 2}),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["needs_human"], false);
    assert_eq!(body["label"], body["alternatives"][0]["label"]);
    assert_eq!(body["alternatives"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_predict_rejects_out_of_range_threshold() {
    let app = loaded_app().await;

    for min_confidence in [-0.1, 1.1] {
        let (status, _, body) = send(
            &app,
            post_json(
                "/predict",
                &json!({"text": "I need help with my invoice", "min_confidence": min_confidence}),
                None,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("min_confidence"));
    }

    // Validation failures never reach the predictor
    assert_eq!(app.state.predictor.inference_count(), 0);
}

#[tokio::test]
async fn test_predict_rejects_invalid_bodies() {
    let app = loaded_app().await;

    let cases = [
        json!({"text": "   "}),
        json!({"text": "refund", "top_k": 0}),
        json!({"text": "refund", "top_k": 11}),
        json!({"top_k": 3}),
    ];
    for case in cases {
        let (status, _, _) = send(&app, post_json("/predict", &case, None)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "body: {}", case);
    }

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_predict_timeout_returns_503_and_audits() {
    let config = ServiceConfig {
        predict_timeout_ms: 1,
        ..ServiceConfig::default()
    };
    let app = setup_test_app(config, slow_predictor(Duration::from_millis(300))).await;

    let (status, headers, body) = send(
        &app,
        post_json("/predict", &json!({"text": "anything"}), Some("timeout-req-1")),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "Prediction timed out");
    assert_eq!(headers["x-request-id"], "timeout-req-1");

    let records = app.audit.for_request("timeout-req-1");
    let timeout = records
        .iter()
        .find(|r| r.event.kind() == "prediction_timeout")
        .expect("timeout audit event");
    match &timeout.event {
        AuditEvent::PredictionTimeout {
            path, timeout_ms, model_version, ..
        } => {
            assert_eq!(path, "/predict");
            assert_eq!(*timeout_ms, 1);
            assert_eq!(model_version.as_deref(), Some("slow"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(records.iter().all(|r| r.event.kind() != "prediction"));
}

#[tokio::test]
async fn test_timeout_audit_names_bundle_the_call_ran_on() {
    let config = ServiceConfig {
        predict_timeout_ms: 100,
        ..ServiceConfig::default()
    };
    let app = setup_test_app(config, slow_predictor(Duration::from_millis(400))).await;

    // Swap the model while the slow call is still inside its deadline
    let predictor = Arc::clone(&app.state.predictor);
    let swap = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let labels = LabelMap::new(vec!["billing".to_string(), "technical".to_string()]).unwrap();
        let bundle = ModelBundle::new(
            Box::new(EvenSplit),
            Box::new(SlowVectorizer(Duration::ZERO)),
            labels,
        )
        .unwrap()
        .with_version(Some("swapped".to_string()));
        predictor.publish(bundle);
    });

    let (status, _, _) = send(
        &app,
        post_json("/predict", &json!({"text": "anything"}), Some("swap-req")),
    )
    .await;
    swap.await.unwrap();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.state.predictor.model_version().as_deref(), Some("swapped"));

    let timeout = app
        .audit
        .for_request("swap-req")
        .into_iter()
        .find(|r| r.event.kind() == "prediction_timeout")
        .expect("timeout audit event");
    match timeout.event {
        AuditEvent::PredictionTimeout { model_version, .. } => {
            assert_eq!(model_version.as_deref(), Some("slow"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_disabled_timeout_waits_for_result() {
    let config = ServiceConfig {
        predict_timeout_ms: 0,
        ..ServiceConfig::default()
    };
    let app = setup_test_app(config, slow_predictor(Duration::from_millis(50))).await;

    let (status, _, body) = send(&app, post_json("/predict", &json!({"text": "anything"}), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["confidence"], 0.5);
    // Equal probabilities resolve to the lower class index
    assert_eq!(body["alternatives"][0]["label"], "billing");
}

#[tokio::test]
async fn test_predict_batch_flags_items_independently() {
    let app = loaded_app().await;

    let request = json!({
        "items": [
            {"id": "t-1", "text": "I need help with my invoice"},
            {"id": "t-2", "text": "hello"}
        ]
    });
    let (status, _, body) = send(&app, post_json("/predict_batch", &request, Some("batch-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_version"], "test");

    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], "t-1");
    assert_eq!(items[0]["label"], "billing");
    assert_eq!(items[0]["needs_human"], false);
    assert_eq!(items[1]["id"], "t-2");
    assert_eq!(items[1]["label"], HUMAN_REVIEW_LABEL);
    assert_eq!(items[1]["needs_human"], true);

    let batch_event = app
        .audit
        .for_request("batch-1")
        .into_iter()
        .find(|r| r.event.kind() == "prediction_batch")
        .expect("batch audit event");
    match batch_event.event {
        AuditEvent::PredictionBatch {
            item_count,
            needs_human_count,
            ..
        } => {
            assert_eq!(item_count, 2);
            assert_eq!(needs_human_count, 1);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_predict_batch_rejects_empty_and_blank_items() {
    let app = loaded_app().await;

    for request in [
        json!({"items": []}),
        json!({"items": [{"id": "", "text": "refund"}]}),
        json!({"items": [{"id": "1", "text": "  "}]}),
    ] {
        let (status, _, _) = send(&app, post_json("/predict_batch", &request, None)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "body: {}", request);
    }
}

#[tokio::test]
async fn test_batch_response_omits_unset_version() {
    let labels = LabelMap::new(vec!["billing".to_string(), "technical".to_string()]).unwrap();
    let bundle = ModelBundle::new(
        Box::new(EvenSplit),
        Box::new(SlowVectorizer(Duration::ZERO)),
        labels,
    )
    .unwrap();
    let app = setup_test_app(ServiceConfig::default(), Predictor::with_bundle(bundle)).await;

    let request = json!({"items": [{"id": "1", "text": "refund"}]});
    let (status, _, body) = send(&app, post_json("/predict_batch", &request, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("model_version").is_none());
}

#[tokio::test]
async fn test_oversized_body_returns_413() {
    let config = ServiceConfig {
        max_body_bytes: 64,
        ..ServiceConfig::default()
    };
    let predictor = Predictor::new();
    predictor.load(&fixture_dir()).unwrap();
    let app = setup_test_app(config, predictor).await;

    let text = "invoice ".repeat(20);
    let body = json!({"text": text});

    // Declared length over the limit
    let declared = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(CONTENT_LENGTH, body.to_string().len())
        .header("x-request-id", "big-1")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _, response) = send(&app, declared).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response["detail"], "Request body too large");

    // No declared length, body counted as it arrives
    let (status, _, _) = send(&app, post_json("/predict_batch", &body, None)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let http_event = app
        .audit
        .for_request("big-1")
        .into_iter()
        .find(|r| r.event.kind() == "http_request")
        .expect("http audit event");
    match http_event.event {
        AuditEvent::HttpRequest { status_code, .. } => assert_eq!(status_code, 413),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_request_id_generated_when_absent() {
    let app = loaded_app().await;

    let (_, headers, _) = send(&app, get("/health")).await;

    let request_id = headers["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());
    assert_eq!(app.audit.for_request(request_id).len(), 1);
}

#[tokio::test]
async fn test_prediction_audit_carries_request_id() {
    let app = loaded_app().await;

    send(
        &app,
        post_json(
            "/predict",
            &json!({"text": "reset my password"}),
            Some("req-42"),
        ),
    )
    .await;

    let records = app.audit.for_request("req-42");
    let kinds: Vec<_> = records.iter().map(|r| r.event.kind()).collect();
    assert_eq!(kinds, vec!["prediction", "http_request"]);

    match &records[0].event {
        AuditEvent::Prediction {
            label,
            top_k,
            model_version,
            ..
        } => {
            assert_eq!(label, "account");
            assert_eq!(*top_k, 3);
            assert_eq!(model_version.as_deref(), Some("test"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_counters() {
    let app = loaded_app().await;
    send(&app, post_json("/predict", &json!({"text": "hello"}), None)).await;

    let response = app.router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("ticket_router_predictions_total 1"));
    assert!(text.contains("ticket_router_escalations_total 1"));
    assert!(text.contains(r#"ticket_router_http_requests_total{path="/predict",status="200"} 1"#));
}
