//! Span export under concurrency, failure and slowness.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};

use iris_serve::config::ServiceConfig;
use iris_serve::http::{build_router, AppState};
use iris_serve::trace::credentials::MetadataToken;
use iris_serve::trace::{
    CredentialSource, ExportError, HttpExporter, SpanExporter, TracerProvider,
};

mod common;
use common::{manual_flush, send, start_collector, TestApp, SETOSA};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_concurrent_requests_lose_no_spans() {
    let app = Arc::new(TestApp::new(common::bundled_model()));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let app = app.clone();
        handles.push(tokio::spawn(async move { app.post("/predict/", SETOSA).await.status }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    app.provider.force_flush().await;
    let spans = app.exporter.spans();
    assert_eq!(spans.len(), 50);

    let ids: HashSet<_> = spans.iter().map(|s| s.span_id.clone()).collect();
    assert_eq!(ids.len(), 50);

    let stats = app.provider.tracer().stats();
    assert_eq!(stats.enqueued, 50);
    assert_eq!(stats.exported, 50);
    assert_eq!(stats.dropped_queue_full, 0);
    assert_eq!(app.provider.tracer().open_spans(), 0);
}

#[tokio::test]
async fn test_batches_flush_when_full() {
    let mut batch = manual_flush();
    batch.max_export_batch_size = 10;
    let app = TestApp::with_batch(common::bundled_model(), batch);

    for _ in 0..25 {
        app.post("/predict/", SETOSA).await;
    }

    for _ in 0..200 {
        if app.exporter.span_count() >= 20 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Two full batches went out; the remaining five wait for the interval.
    assert_eq!(app.exporter.span_count(), 20);

    app.provider.force_flush().await;
    assert_eq!(app.exporter.span_count(), 25);
}

#[tokio::test]
async fn test_export_failure_never_fails_requests() {
    let app = TestApp::new(common::bundled_model());
    app.exporter.fail_always(true);

    for _ in 0..10 {
        let res = app.post("/predict/", SETOSA).await;
        assert_eq!(res.status, StatusCode::OK);
    }
    app.provider.force_flush().await;

    assert_eq!(app.exporter.span_count(), 0);
    assert_eq!(app.exporter.attempts(), 3);
    let stats = app.provider.tracer().stats();
    assert_eq!(stats.dropped_export_failed, 10);
    assert_eq!(stats.exported, 0);
}

#[tokio::test]
async fn test_transient_failure_recovers_after_retry() {
    let app = TestApp::new(common::bundled_model());
    app.exporter.fail_next(1);

    for _ in 0..5 {
        app.post("/predict/", SETOSA).await;
    }
    app.provider.force_flush().await;

    assert_eq!(app.exporter.span_count(), 5);
    assert_eq!(app.exporter.attempts(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_exporter_does_not_delay_responses() {
    let mut batch = manual_flush();
    batch.max_export_batch_size = 1;
    batch.export_timeout = Duration::from_secs(10);
    let app = TestApp::with_batch(common::bundled_model(), batch);
    app.exporter.set_delay(Duration::from_secs(3));

    let started = Instant::now();
    for _ in 0..20 {
        let res = app.post("/predict/", SETOSA).await;
        assert_eq!(res.status, StatusCode::OK);
    }
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "requests took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_full_queue_drops_without_blocking() {
    let mut batch = manual_flush();
    batch.max_queue_size = 4;
    batch.max_export_batch_size = 4;
    batch.export_timeout = Duration::from_secs(10);
    let app = TestApp::with_batch(common::bundled_model(), batch);
    app.exporter.set_delay(Duration::from_secs(3));

    let started = Instant::now();
    for _ in 0..30 {
        let res = app.post("/predict/", SETOSA).await;
        assert_eq!(res.status, StatusCode::OK);
    }
    assert!(started.elapsed() < Duration::from_secs(1));

    let stats = app.provider.tracer().stats();
    assert!(stats.dropped_queue_full > 0);
    assert_eq!(app.provider.tracer().closed_spans(), 30);
}

#[tokio::test]
async fn test_shutdown_delivers_buffered_spans() {
    let app = TestApp::new(common::bundled_model());
    for _ in 0..12 {
        app.post("/predict/", SETOSA).await;
    }
    assert_eq!(app.exporter.span_count(), 0);

    let exporter = app.exporter.clone();
    let stats = app.provider.shutdown().await;
    assert_eq!(stats.exported, 12);
    assert_eq!(exporter.span_count(), 12);
}

#[tokio::test]
async fn test_http_export_posts_authenticated_json_batch() {
    std::env::set_var("IRIS_SERVE_TEST_COLLECTOR_TOKEN", "tok-123");
    let collector = start_collector(StatusCode::OK, 3600).await;
    let exporter = HttpExporter::new(
        reqwest::Client::new(),
        collector.spans_url(),
        "iris-test",
        CredentialSource::Env("IRIS_SERVE_TEST_COLLECTOR_TOKEN".into()),
    );
    let provider = TracerProvider::install("iris-test", manual_flush(), exporter);
    assert_eq!(provider.exporter_kind(), "http");

    let state = AppState::new(common::bundled_model(), provider.tracer(), provider.exporter_kind());
    let router = build_router(&ServiceConfig::default(), state);
    let request = Request::builder()
        .method("POST")
        .uri("/predict/")
        .header("content-type", "application/json")
        .body(Body::from(SETOSA))
        .unwrap();
    assert_eq!(send(&router, request).await.status, StatusCode::OK);

    provider.force_flush().await;
    let batches = collector.batches();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.authorization.as_deref(), Some("Bearer tok-123"));
    assert_eq!(batch.content_type.as_deref(), Some("application/json"));

    assert_eq!(batch.body["resource"]["service.name"], "iris-test");
    let spans = batch.body["spans"].as_array().unwrap();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span["name"], "model_prediction");
    assert_eq!(span["status"]["code"], "OK");
    assert_eq!(span["attributes"]["predicted_class"], "setosa");
    assert_eq!(span["attributes"]["petal_width"], 0.2);
    assert_eq!(span["trace_id"].as_str().unwrap().len(), 32);
    assert!(span["parent_span_id"].is_null());
    assert!(
        span["end_time_unix_nano"].as_u64().unwrap() >= span["start_time_unix_nano"].as_u64().unwrap()
    );

    let stats = provider.shutdown().await;
    assert_eq!(stats.exported, 1);
    assert_eq!(stats.dropped_export_failed, 0);
}

#[tokio::test]
async fn test_http_export_rejection_is_reported() {
    // Capture a real closed span to send.
    let app = TestApp::new(common::bundled_model());
    app.post("/predict/", SETOSA).await;
    app.provider.force_flush().await;
    let spans = app.exporter.spans();

    let collector = start_collector(StatusCode::BAD_REQUEST, 3600).await;
    let exporter = HttpExporter::new(
        reqwest::Client::new(),
        collector.spans_url(),
        "iris-test",
        CredentialSource::None,
    );

    let err = exporter.export(&spans).await.unwrap_err();
    assert!(matches!(err, ExportError::Rejected { status: 400 }));
    assert!(!err.is_retryable());
    assert_eq!(collector.batches().len(), 1);
    assert!(collector.batches()[0].authorization.is_none());
}

#[tokio::test]
async fn test_rejected_batch_is_dropped_without_retry() {
    let collector = start_collector(StatusCode::BAD_REQUEST, 3600).await;
    let exporter = HttpExporter::new(
        reqwest::Client::new(),
        collector.spans_url(),
        "iris-test",
        CredentialSource::None,
    );
    let provider = TracerProvider::install("iris-test", manual_flush(), exporter);
    provider.tracer().start_span("model_prediction", None).end();
    provider.force_flush().await;

    assert_eq!(collector.batches().len(), 1);
    let stats = provider.shutdown().await;
    assert_eq!(stats.dropped_export_failed, 1);
    assert_eq!(stats.exported, 0);
}

#[tokio::test]
async fn test_metadata_token_is_cached_across_exports() {
    let collector = start_collector(StatusCode::OK, 3600).await;
    let client = reqwest::Client::new();
    let exporter = HttpExporter::new(
        client.clone(),
        collector.spans_url(),
        "iris-test",
        CredentialSource::Metadata(MetadataToken::new(collector.token_url(), client)),
    );
    let provider = TracerProvider::install("iris-test", manual_flush(), exporter);
    let tracer = provider.tracer();

    tracer.start_span("model_prediction", None).end();
    provider.force_flush().await;
    tracer.start_span("model_prediction", None).end();
    provider.force_flush().await;

    assert_eq!(collector.token_hits(), 1);
    let batches = collector.batches();
    assert_eq!(batches.len(), 2);
    for batch in &batches {
        assert_eq!(batch.authorization.as_deref(), Some("Bearer meta-1"));
    }
    provider.shutdown().await;
}

#[tokio::test]
async fn test_metadata_token_near_expiry_is_refreshed() {
    // Expires within the refresh margin, so every export fetches a new one.
    let collector = start_collector(StatusCode::OK, 30).await;
    let client = reqwest::Client::new();
    let exporter = HttpExporter::new(
        client.clone(),
        collector.spans_url(),
        "iris-test",
        CredentialSource::Metadata(MetadataToken::new(collector.token_url(), client)),
    );
    let provider = TracerProvider::install("iris-test", manual_flush(), exporter);
    let tracer = provider.tracer();

    tracer.start_span("model_prediction", None).end();
    provider.force_flush().await;
    tracer.start_span("model_prediction", None).end();
    provider.force_flush().await;

    assert_eq!(collector.token_hits(), 2);
    let auth: Vec<_> = collector
        .batches()
        .into_iter()
        .filter_map(|b| b.authorization)
        .collect();
    assert_eq!(auth, vec!["Bearer meta-1", "Bearer meta-2"]);
    provider.shutdown().await;
}
