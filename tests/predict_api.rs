//! Request handler behavior through the full router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use iris_serve::model::Species;
use iris_serve::trace::{AttributeValue, SpanStatus};

mod common;
use common::{send, StubClassifier, TestApp, SETOSA};

#[tokio::test]
async fn test_setosa_prediction_emits_one_closed_span() {
    let app = TestApp::new(common::bundled_model());

    let res = app.post("/predict/", SETOSA).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!({"predicted_class": "setosa"}));

    let tracer = app.provider.tracer();
    assert_eq!(tracer.open_spans(), 0);
    assert_eq!(tracer.closed_spans(), 1);

    app.provider.force_flush().await;
    let spans = app.exporter.spans();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.name, "model_prediction");
    assert_eq!(span.status, SpanStatus::Ok);
    assert_eq!(
        span.attribute("predicted_class").and_then(AttributeValue::as_str),
        Some("setosa")
    );
    assert_eq!(span.attribute("petal_width"), Some(&AttributeValue::Float(0.2)));
    assert_eq!(
        span.attribute("service.name").and_then(AttributeValue::as_str),
        Some("iris-test")
    );
}

#[tokio::test]
async fn test_every_class_is_reachable() {
    let app = TestApp::new(common::bundled_model());
    let cases = [
        (SETOSA, Species::Setosa),
        (
            r#"{"sepal_length": 6.0, "sepal_width": 2.9, "petal_length": 4.5, "petal_width": 1.5}"#,
            Species::Versicolor,
        ),
        (
            r#"{"sepal_length": 6.5, "sepal_width": 3.0, "petal_length": 5.8, "petal_width": 2.2}"#,
            Species::Virginica,
        ),
    ];

    for (body, expected) in cases {
        let res = app.post("/predict/", body).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["predicted_class"], expected.as_str());
    }
}

#[tokio::test]
async fn test_same_request_same_label() {
    let app = TestApp::new(common::bundled_model());
    let first = app.post("/predict/", SETOSA).await;
    let second = app.post("/predict/", SETOSA).await;
    assert_eq!(first.body, second.body);
    assert_eq!(app.provider.tracer().closed_spans(), 2);
}

#[tokio::test]
async fn test_missing_field_never_reaches_model() {
    let stub = Arc::new(StubClassifier::default());
    let app = TestApp::new(stub.clone());

    let res = app
        .post(
            "/predict/",
            r#"{"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4}"#,
        )
        .await;

    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["detail"], "petal_width: field required");
    assert_eq!(stub.calls(), 0);

    let tracer = app.provider.tracer();
    assert_eq!(tracer.closed_spans(), 0);
    app.provider.force_flush().await;
    assert!(app
        .exporter
        .spans()
        .iter()
        .all(|s| s.attribute("predicted_class").is_none()));
}

#[tokio::test]
async fn test_non_numeric_field() {
    let stub = Arc::new(StubClassifier::default());
    let app = TestApp::new(stub.clone());

    let res = app
        .post(
            "/predict/",
            r#"{"sepal_length": "long", "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2}"#,
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.body["detail"].as_str().unwrap().contains("sepal_length"));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn test_malformed_bodies() {
    let app = TestApp::new(common::bundled_model());

    let res = app.post("/predict/", "{\"sepal_length\": ").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app.post("/predict/", "[1, 2, 3, 4]").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["detail"], "body must be a JSON object");

    let request = Request::builder()
        .method("POST")
        .uri("/predict/")
        .header("content-type", "text/plain")
        .body(Body::from(SETOSA))
        .unwrap();
    let res = send(&app.router, request).await;
    assert_eq!(res.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    assert_eq!(app.provider.tracer().closed_spans(), 0);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let app = TestApp::new(common::bundled_model());
    let padding = "x".repeat(32 * 1024);
    let body = format!(
        r#"{{"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2, "pad": "{}"}}"#,
        padding
    );
    let res = app.post("/predict/", &body).await;
    assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_inference_failure_closes_span_with_error() {
    let stub = Arc::new(StubClassifier::failing());
    let app = TestApp::new(stub.clone());

    let res = app.post("/predict/", SETOSA).await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.body["detail"].as_str().unwrap().starts_with("inference failed"));
    assert_eq!(stub.calls(), 1);

    let tracer = app.provider.tracer();
    assert_eq!(tracer.open_spans(), 0);
    app.provider.force_flush().await;
    let spans = app.exporter.spans();
    assert_eq!(spans.len(), 1);
    assert!(matches!(spans[0].status, SpanStatus::Error { .. }));
    assert!(spans[0].attribute("predicted_class").is_none());
}

#[tokio::test]
async fn test_path_without_trailing_slash() {
    let app = TestApp::new(common::bundled_model());
    let res = app.post("/predict", SETOSA).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["predicted_class"], "setosa");
}

#[tokio::test]
async fn test_request_id_generated_and_recorded() {
    let app = TestApp::new(common::bundled_model());
    let res = app.post("/predict/", SETOSA).await;

    let request_id = res.headers["x-request-id"].to_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&request_id).is_ok());

    app.provider.force_flush().await;
    let spans = app.exporter.spans();
    assert_eq!(
        spans[0].attribute("request_id").and_then(AttributeValue::as_str),
        Some(request_id.as_str())
    );
}

#[tokio::test]
async fn test_request_id_echoed() {
    let app = TestApp::new(common::bundled_model());
    let request = Request::builder()
        .method("POST")
        .uri("/predict/")
        .header("content-type", "application/json")
        .header("x-request-id", "client-req-7")
        .body(Body::from(SETOSA))
        .unwrap();
    let res = send(&app.router, request).await;
    assert_eq!(res.headers["x-request-id"], "client-req-7");
}

#[tokio::test]
async fn test_span_joins_inbound_trace() {
    let app = TestApp::new(common::bundled_model());
    let request = Request::builder()
        .method("POST")
        .uri("/predict/")
        .header("content-type", "application/json")
        .header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )
        .body(Body::from(SETOSA))
        .unwrap();
    let res = send(&app.router, request).await;
    assert_eq!(res.status, StatusCode::OK);

    app.provider.force_flush().await;
    let spans = app.exporter.spans();
    assert_eq!(spans[0].trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
    assert_eq!(spans[0].parent_span_id.as_deref(), Some("00f067aa0ba902b7"));
    assert_ne!(spans[0].span_id, "00f067aa0ba902b7");
}

#[tokio::test]
async fn test_unsampled_trace_is_not_exported() {
    let app = TestApp::new(common::bundled_model());
    let request = Request::builder()
        .method("POST")
        .uri("/predict/")
        .header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00",
        )
        .body(Body::from(SETOSA))
        .unwrap();
    let res = send(&app.router, request).await;
    assert_eq!(res.status, StatusCode::OK);

    app.provider.force_flush().await;
    assert_eq!(app.provider.tracer().closed_spans(), 1);
    assert_eq!(app.exporter.span_count(), 0);
}

#[tokio::test]
async fn test_health_and_status() {
    let app = TestApp::new(common::bundled_model());
    app.post("/predict/", SETOSA).await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let res = send(&app.router, request).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!({"status": "ok"}));

    app.provider.force_flush().await;
    let request = Request::builder().uri("/status").body(Body::empty()).unwrap();
    let res = send(&app.router, request).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["service"], "iris-test");
    assert_eq!(res.body["model"]["classes"], json!(["setosa", "versicolor", "virginica"]));
    assert_eq!(res.body["model"]["depth"], 4);
    assert_eq!(res.body["tracing"]["exporter"], "memory");
    assert_eq!(res.body["tracing"]["export"]["exported"], 1);
}
