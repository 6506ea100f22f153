//! Span exporters.
//!
//! # Responsibilities
//! - Deliver one batch of closed spans to its destination
//! - Report failures as `ExportError`; retry policy lives in the processor
//!
//! # Exporters
//! - `HttpExporter`: JSON batch POST to the collector with ambient bearer auth
//! - `LogExporter`: one structured log event per span
//! - `InMemoryExporter`: keeps spans in memory, with failure injection

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use serde::Serialize;
use url::Url;

use super::credentials::CredentialSource;
use super::span::SpanData;

/// Failure to deliver a batch. Never surfaced to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("collector unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("collector rejected batch with status {status}")]
    Rejected { status: u16 },

    #[error("export timed out after {0:?}")]
    Timeout(Duration),

    #[error("credential unavailable: {0}")]
    Credential(String),

    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("simulated export failure")]
    Simulated,
}

impl ExportError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExportError::Serialize(_) => false,
            // Auth failures are retried: the next attempt re-resolves the token.
            ExportError::Rejected { status } => {
                matches!(status, 401 | 403 | 408 | 429) || *status >= 500
            }
            _ => true,
        }
    }
}

/// Destination for closed spans.
pub trait SpanExporter: Send + Sync + 'static {
    fn export(&self, batch: &[SpanData]) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Short name for logs and the status endpoint.
    fn kind(&self) -> &'static str;
}

#[derive(Serialize)]
struct Resource<'a> {
    #[serde(rename = "service.name")]
    service_name: &'a str,
}

#[derive(Serialize)]
struct ExportRequest<'a> {
    resource: Resource<'a>,
    spans: &'a [SpanData],
}

/// Batched JSON export over HTTP.
#[derive(Debug)]
pub struct HttpExporter {
    client: reqwest::Client,
    endpoint: Url,
    service_name: String,
    credentials: CredentialSource,
}

impl HttpExporter {
    pub fn new(
        client: reqwest::Client,
        endpoint: Url,
        service_name: &str,
        credentials: CredentialSource,
    ) -> Self {
        Self {
            client,
            endpoint,
            service_name: service_name.to_string(),
            credentials,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl SpanExporter for HttpExporter {
    async fn export(&self, batch: &[SpanData]) -> Result<(), ExportError> {
        let payload = serde_json::to_vec(&ExportRequest {
            resource: Resource {
                service_name: &self.service_name,
            },
            spans: batch,
        })?;

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        if let Some(token) = self.credentials.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}

/// Writes each span as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExporter;

impl SpanExporter for LogExporter {
    async fn export(&self, batch: &[SpanData]) -> Result<(), ExportError> {
        for span in batch {
            let duration_us = span
                .end_time
                .duration_since(span.start_time)
                .unwrap_or_default()
                .as_micros() as u64;
            let attributes = serde_json::to_string(&span.attributes)?;
            tracing::info!(
                target: "iris_serve::spans",
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                parent_span_id = span.parent_span_id.as_deref().unwrap_or(""),
                name = %span.name,
                status = ?span.status,
                duration_us,
                attributes = %attributes,
                "span"
            );
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "log"
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    spans: Mutex<Vec<SpanData>>,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    fail_always: AtomicBool,
    delay_ms: AtomicU64,
}

/// Collects exported spans in memory. Clones share the same storage.
#[derive(Debug, Default, Clone)]
pub struct InMemoryExporter {
    state: Arc<InMemoryState>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` export calls.
    pub fn fail_next(&self, n: usize) {
        self.state.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail every export call until reset.
    pub fn fail_always(&self, fail: bool) {
        self.state.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Make every export call take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Spans delivered so far.
    pub fn spans(&self) -> Vec<SpanData> {
        self.state
            .spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn span_count(&self) -> usize {
        self.state
            .spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Export calls made, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }
}

impl SpanExporter for InMemoryExporter {
    async fn export(&self, batch: &[SpanData]) -> Result<(), ExportError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.state.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let scheduled_failure = self
            .state
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled_failure || self.state.fail_always.load(Ordering::SeqCst) {
            return Err(ExportError::Simulated);
        }

        self.state
            .spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(batch);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
