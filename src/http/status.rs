//! Liveness and status endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::model::ModelInfo;
use crate::trace::ExportStats;

use super::server::AppState;

/// `GET /health`. Answers as long as the process serves HTTP.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
pub struct TracingStatus {
    pub exporter: &'static str,
    pub exporting: bool,
    pub open_spans: usize,
    pub closed_spans: u64,
    pub export: ExportStats,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub model: ModelInfo,
    pub tracing: TracingStatus,
}

/// `GET /status`.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let tracer = &state.tracer;
    Json(StatusResponse {
        service: tracer.service_name().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        model: state.model.info(),
        tracing: TracingStatus {
            exporter: state.exporter_kind,
            exporting: tracer.is_exporting(),
            open_spans: tracer.open_spans(),
            closed_spans: tracer.closed_spans(),
            export: tracer.stats(),
        },
    })
}
