//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use iris_serve::config::ServiceConfig;
use iris_serve::http::{build_router, AppState, HttpServer};
use iris_serve::lifecycle::Shutdown;
use iris_serve::model::{Classifier, DecisionTree, Features, InferenceError, ModelInfo, Species};
use iris_serve::trace::{BatchConfig, InMemoryExporter, TracerProvider};
use iris_serve::resilience::Backoff;

pub const SETOSA: &str =
    r#"{"sepal_length": 5.1, "sepal_width": 3.5, "petal_length": 1.4, "petal_width": 0.2}"#;

pub fn bundled_model() -> Arc<dyn Classifier> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/iris_tree.json");
    Arc::new(DecisionTree::load(&path).unwrap())
}

/// Batch settings that never flush on their own within a test.
pub fn manual_flush() -> BatchConfig {
    BatchConfig {
        max_queue_size: 1024,
        max_export_batch_size: 256,
        scheduled_delay: Duration::from_secs(3600),
        export_timeout: Duration::from_millis(500),
        max_export_attempts: 3,
        backoff: Backoff::from_millis(1, 5),
    }
}

/// A replica wired to an in-memory span exporter.
pub struct TestApp {
    pub router: Router,
    pub provider: TracerProvider,
    pub exporter: InMemoryExporter,
}

impl TestApp {
    pub fn new(model: Arc<dyn Classifier>) -> Self {
        Self::with_batch(model, manual_flush())
    }

    pub fn with_batch(model: Arc<dyn Classifier>, batch: BatchConfig) -> Self {
        let exporter = InMemoryExporter::new();
        let provider = TracerProvider::install("iris-test", batch, exporter.clone());
        let state = AppState::new(model, provider.tracer(), provider.exporter_kind());
        let router = build_router(&ServiceConfig::default(), state);
        Self {
            router,
            provider,
            exporter,
        }
    }

    pub async fn post(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(&self.router, request).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        body,
    }
}

/// Classifier stand-in that counts calls and can fail or stall.
#[derive(Default)]
pub struct StubClassifier {
    pub calls: AtomicUsize,
    pub fail: bool,
    pub stall: Option<Duration>,
}

impl StubClassifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn stalling(stall: Duration) -> Self {
        Self {
            stall: Some(stall),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for StubClassifier {
    fn predict(&self, _features: &Features) -> Result<Species, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(stall) = self.stall {
            std::thread::sleep(stall);
        }
        if self.fail {
            return Err(InferenceError::MalformedModel("stub failure".into()));
        }
        Ok(Species::Versicolor)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "stub".into(),
            classes: Species::ALL.to_vec(),
            node_count: 1,
            depth: 0,
        }
    }
}

/// Serve `state` on an ephemeral port until `shutdown` fires.
pub async fn start_server(
    state: AppState,
) -> (SocketAddr, Shutdown, JoinHandle<Result<(), std::io::Error>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(&ServiceConfig::default(), state);
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
    (addr, shutdown, handle)
}

/// One batch as the collector received it.
#[derive(Debug, Clone)]
pub struct ReceivedBatch {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
}

#[derive(Default)]
struct CollectorState {
    reply: AtomicU16,
    token_ttl_secs: AtomicU64,
    token_hits: AtomicUsize,
    batches: Mutex<Vec<ReceivedBatch>>,
}

/// Span collector with a metadata token endpoint, served on an ephemeral port.
#[derive(Clone)]
pub struct Collector {
    pub addr: SocketAddr,
    state: Arc<CollectorState>,
}

impl Collector {
    pub fn spans_url(&self) -> url::Url {
        url::Url::parse(&format!("http://{}/v1/spans", self.addr)).unwrap()
    }

    pub fn token_url(&self) -> url::Url {
        url::Url::parse(&format!("http://{}/token", self.addr)).unwrap()
    }

    pub fn batches(&self) -> Vec<ReceivedBatch> {
        self.state.batches.lock().unwrap().clone()
    }

    pub fn token_hits(&self) -> usize {
        self.state.token_hits.load(Ordering::SeqCst)
    }
}

/// Start a collector that answers span batches with `reply` and hands out
/// tokens valid for `token_ttl_secs`.
pub async fn start_collector(reply: StatusCode, token_ttl_secs: u64) -> Collector {
    async fn receive(
        State(state): State<Arc<CollectorState>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        state.batches.lock().unwrap().push(ReceivedBatch {
            authorization: header("authorization"),
            content_type: header("content-type"),
            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        });
        StatusCode::from_u16(state.reply.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK)
    }

    async fn token(State(state): State<Arc<CollectorState>>) -> Json<Value> {
        let hit = state.token_hits.fetch_add(1, Ordering::SeqCst) + 1;
        Json(serde_json::json!({
            "access_token": format!("meta-{}", hit),
            "expires_in": state.token_ttl_secs.load(Ordering::SeqCst),
            "token_type": "Bearer",
        }))
    }

    let state = Arc::new(CollectorState::default());
    state.reply.store(reply.as_u16(), Ordering::SeqCst);
    state.token_ttl_secs.store(token_ttl_secs, Ordering::SeqCst);

    let app = Router::new()
        .route("/v1/spans", post(receive))
        .route("/token", get(token))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Collector { addr, state }
}
