//! Batch span processor and tracer provider.
//!
//! # Data Flow
//! ```text
//! request handlers ──push──▶ SpanQueue ──drain──▶ export worker ──▶ SpanExporter
//!                    (never waits)         ▲
//!                                          │ wake-ups:
//!                                          │  - batch full (Notify)
//!                                          │  - scheduled_delay tick
//!                                          │  - force_flush / shutdown
//! ```
//!
//! # Design Decisions
//! - One background task per process owns the exporter
//! - A failed batch is retried with backoff, then dropped and logged
//! - Shutdown drains everything still buffered before the worker exits

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::exporter::{ExportError, SpanExporter};
use super::queue::{ExportStats, SpanQueue};
use super::span::SpanData;
use super::tracer::Tracer;
use crate::config::TracingConfig;
use crate::observability::metrics;
use crate::resilience::Backoff;

/// Batching and retry parameters.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_queue_size: usize,
    pub max_export_batch_size: usize,
    pub scheduled_delay: Duration,
    pub export_timeout: Duration,
    pub max_export_attempts: u32,
    pub backoff: Backoff,
}

impl BatchConfig {
    pub fn from_config(config: &TracingConfig) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            max_export_batch_size: config.max_export_batch_size,
            scheduled_delay: Duration::from_millis(config.scheduled_delay_ms),
            export_timeout: Duration::from_millis(config.export_timeout_ms),
            max_export_attempts: config.max_export_attempts.max(1),
            backoff: Backoff::from_millis(config.retry_base_delay_ms, config.retry_max_delay_ms),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from_config(&TracingConfig::default())
    }
}

enum Control {
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Owner of the tracing pipeline. Created at startup, shut down explicitly.
#[derive(Debug)]
pub struct TracerProvider {
    tracer: Tracer,
    exporter_kind: &'static str,
    control: Option<mpsc::Sender<Control>>,
    worker: Option<JoinHandle<()>>,
}

impl TracerProvider {
    /// Start the export worker. Must be called inside a Tokio runtime.
    pub fn install<E: SpanExporter>(service_name: &str, config: BatchConfig, exporter: E) -> Self {
        let queue = Arc::new(SpanQueue::new(config.max_queue_size, config.max_export_batch_size));
        let tracer = Tracer::with_queue(service_name, queue.clone());
        let exporter_kind = exporter.kind();
        let (control_tx, control_rx) = mpsc::channel(8);

        tracing::info!(
            exporter = exporter_kind,
            max_queue_size = config.max_queue_size,
            max_export_batch_size = config.max_export_batch_size,
            scheduled_delay_ms = config.scheduled_delay.as_millis() as u64,
            "Span export worker starting"
        );

        let worker = BatchWorker {
            queue,
            exporter,
            config,
            control: control_rx,
        };

        Self {
            tracer,
            exporter_kind,
            control: Some(control_tx),
            worker: Some(tokio::spawn(worker.run())),
        }
    }

    /// Tracing disabled: spans are closed and discarded.
    pub fn noop(service_name: &str) -> Self {
        Self {
            tracer: Tracer::noop(service_name),
            exporter_kind: "none",
            control: None,
            worker: None,
        }
    }

    /// Handle to pass into request handlers.
    pub fn tracer(&self) -> Tracer {
        self.tracer.clone()
    }

    pub fn exporter_kind(&self) -> &'static str {
        self.exporter_kind
    }

    /// Export everything buffered right now and wait for it.
    pub async fn force_flush(&self) {
        if let Some(control) = &self.control {
            let (ack_tx, ack_rx) = oneshot::channel();
            if control.send(Control::Flush(ack_tx)).await.is_ok() {
                let _ = ack_rx.await;
            }
        }
    }

    /// Flush pending spans and stop the worker.
    pub async fn shutdown(mut self) -> ExportStats {
        if let Some(control) = self.control.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if control.send(Control::Shutdown(ack_tx)).await.is_ok() {
                let _ = ack_rx.await;
            }
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Span export worker panicked");
            }
        }

        let stats = self.tracer.stats();
        tracing::info!(
            exported = stats.exported,
            dropped_queue_full = stats.dropped_queue_full,
            dropped_export_failed = stats.dropped_export_failed,
            "Span export worker stopped"
        );
        stats
    }
}

struct BatchWorker<E> {
    queue: Arc<SpanQueue>,
    exporter: E,
    config: BatchConfig,
    control: mpsc::Receiver<Control>,
}

impl<E: SpanExporter> BatchWorker<E> {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.scheduled_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.export_pending().await;
                }
                _ = self.queue.batch_ready() => {
                    self.export_full_batches().await;
                }
                command = self.control.recv() => match command {
                    Some(Control::Flush(ack)) => {
                        self.export_pending().await;
                        let _ = ack.send(());
                    }
                    Some(Control::Shutdown(ack)) => {
                        self.export_all().await;
                        let _ = ack.send(());
                        break;
                    }
                    // Provider dropped without shutdown.
                    None => {
                        self.export_all().await;
                        break;
                    }
                },
            }
        }
    }

    /// Export the full batches queued on entry. Batches filled meanwhile
    /// re-arm `batch_ready`, so control commands get a turn in between.
    async fn export_full_batches(&self) {
        let batch_size = self.queue.batch_size();
        let full_batches = self.queue.len() / batch_size;
        for _ in 0..full_batches {
            let batch = self.queue.drain_batch(batch_size);
            self.export_with_retry(batch).await;
        }
    }

    /// Export what is queued on entry, including a trailing partial batch.
    async fn export_pending(&self) {
        let batch_size = self.queue.batch_size();
        let batches = self.queue.len().div_ceil(batch_size);
        for _ in 0..batches {
            let batch = self.queue.drain_batch(batch_size);
            if batch.is_empty() {
                break;
            }
            self.export_with_retry(batch).await;
        }
    }

    /// Export until the queue is empty. Only used once producers have stopped.
    async fn export_all(&self) {
        loop {
            let batch = self.queue.drain_batch(self.queue.batch_size());
            if batch.is_empty() {
                break;
            }
            self.export_with_retry(batch).await;
        }
    }

    async fn export_with_retry(&self, batch: Vec<SpanData>) {
        let len = batch.len();
        let started = Instant::now();
        let mut attempt = 0;

        let error = loop {
            attempt += 1;
            let result =
                match tokio::time::timeout(self.config.export_timeout, self.exporter.export(&batch)).await {
                    Ok(result) => result,
                    Err(_) => Err(ExportError::Timeout(self.config.export_timeout)),
                };

            match result {
                Ok(()) => {
                    self.queue.record_exported(len);
                    metrics::record_spans_exported(len, started);
                    tracing::debug!(spans = len, attempt, "Exported span batch");
                    return;
                }
                Err(e) if attempt < self.config.max_export_attempts && e.is_retryable() => {
                    let delay = self.config.backoff.delay(attempt);
                    tracing::debug!(
                        spans = len,
                        attempt,
                        delay = ?delay,
                        error = %e,
                        "Span export failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break e,
            }
        };

        self.queue.record_export_failed(len);
        metrics::record_spans_dropped("export_failed", len);
        tracing::warn!(
            spans = len,
            attempts = attempt,
            exporter = self.exporter.kind(),
            error = %error,
            "Dropping span batch after failed export"
        );
    }
}
