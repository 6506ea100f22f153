//! Tracer handle.
//!
//! A cheap, cloneable handle that opens spans and routes closed spans into
//! the export queue. Created once by `TracerProvider` at startup and passed
//! explicitly to the request handlers; there is no global tracer.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::context::TraceContext;
use super::queue::{ExportStats, SpanQueue};
use super::span::{ActiveSpan, SpanData};
use crate::observability::metrics;

#[derive(Debug)]
struct TracerShared {
    service_name: String,
    /// `None` when tracing is disabled; closed spans are discarded.
    queue: Option<Arc<SpanQueue>>,
    open_spans: AtomicUsize,
    closed_spans: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct Tracer {
    shared: Arc<TracerShared>,
}

impl Tracer {
    /// A tracer that closes spans but exports nothing.
    pub fn noop(service_name: &str) -> Self {
        Self::build(service_name, None)
    }

    pub(crate) fn with_queue(service_name: &str, queue: Arc<SpanQueue>) -> Self {
        Self::build(service_name, Some(queue))
    }

    fn build(service_name: &str, queue: Option<Arc<SpanQueue>>) -> Self {
        Self {
            shared: Arc::new(TracerShared {
                service_name: service_name.to_string(),
                queue,
                open_spans: AtomicUsize::new(0),
                closed_spans: AtomicU64::new(0),
            }),
        }
    }

    /// Open a span. With a parent context the span joins the parent's trace.
    pub fn start_span(&self, name: &str, parent: Option<&TraceContext>) -> ActiveSpan {
        let (context, parent_span_id) = match parent {
            Some(parent) => (parent.child(), Some(parent.span_id.clone())),
            None => (TraceContext::new_root(), None),
        };

        self.shared.open_spans.fetch_add(1, Ordering::Relaxed);
        let mut span = ActiveSpan::new(self.clone(), name, context, parent_span_id);
        span.set_attribute("service.name", self.shared.service_name.as_str());
        span
    }

    pub(crate) fn on_end(&self, span: SpanData) {
        self.shared.open_spans.fetch_sub(1, Ordering::Relaxed);
        self.shared.closed_spans.fetch_add(1, Ordering::Relaxed);

        if !span.sampled {
            return;
        }
        if let Some(queue) = &self.shared.queue {
            if !queue.push(span) {
                metrics::record_spans_dropped("queue_full", 1);
                tracing::debug!("Span queue full, dropping span");
            }
        }
    }

    pub fn service_name(&self) -> &str {
        &self.shared.service_name
    }

    /// Spans opened and not yet closed.
    pub fn open_spans(&self) -> usize {
        self.shared.open_spans.load(Ordering::Relaxed)
    }

    /// Spans closed since startup, sampled or not.
    pub fn closed_spans(&self) -> u64 {
        self.shared.closed_spans.load(Ordering::Relaxed)
    }

    pub fn is_exporting(&self) -> bool {
        self.shared.queue.is_some()
    }

    pub fn stats(&self) -> ExportStats {
        self.shared
            .queue
            .as_ref()
            .map(|q| q.stats())
            .unwrap_or_default()
    }
}
