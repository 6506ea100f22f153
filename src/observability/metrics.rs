//! Metrics collection and exposition.
//!
//! # Metrics
//! - `iris_requests_total` (counter): prediction requests by status code
//! - `iris_request_duration_seconds` (histogram): handler latency
//! - `iris_predictions_total` (counter): labels returned, by class
//! - `iris_prediction_errors_total` (counter): failures by kind
//! - `iris_spans_exported_total` (counter)
//! - `iris_spans_dropped_total` (counter): by reason (queue_full, export_failed)
//! - `iris_span_export_duration_seconds` (histogram): per batch, retries included
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}

pub fn record_request(status: u16, start: Instant) {
    counter!("iris_requests_total", "status" => status.to_string()).increment(1);
    histogram!("iris_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_prediction(class: &'static str) {
    counter!("iris_predictions_total", "class" => class).increment(1);
}

pub fn record_prediction_error(kind: &'static str) {
    counter!("iris_prediction_errors_total", "kind" => kind).increment(1);
}

pub fn record_spans_exported(count: usize, start: Instant) {
    counter!("iris_spans_exported_total").increment(count as u64);
    histogram!("iris_span_export_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_spans_dropped(reason: &'static str, count: usize) {
    counter!("iris_spans_dropped_total", "reason" => reason).increment(count as u64);
}
