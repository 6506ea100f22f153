//! `POST /predict/` handler.
//!
//! # Flow
//! ```text
//! content type → body → InferenceRequest (422/400/415 on failure, no span)
//!     → span "model_prediction" (child of inbound traceparent, if any)
//!     → Classifier::predict
//!     → predicted_class attribute → span closed → {"predicted_class": ...}
//! ```
//!
//! Inference runs inline on the request task. The span is closed by `end`,
//! `fail` or drop, so no exit path leaves it open.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::Json;

use crate::model::FEATURE_NAMES;
use crate::observability::metrics;
use crate::trace::TraceContext;

use super::payload::{InferenceRequest, PredictResponse, ValidationError};
use super::request::request_id;
use super::response::ApiError;
use super::server::AppState;

/// Name of the span wrapping one inference call.
pub const PREDICTION_SPAN: &str = "model_prediction";

pub async fn predict(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let started = Instant::now();
    let result = run_prediction(&state, &headers, body);

    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status().as_u16(),
    };
    metrics::record_request(status, started);

    result.map(Json)
}

fn run_prediction(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<PredictResponse, ApiError> {
    let request_id = request_id(headers).unwrap_or_default();

    let request = check_content_type(headers)
        .and_then(|()| body.map_err(ApiError::from))
        .and_then(|body| InferenceRequest::from_slice(&body).map_err(ApiError::from))
        .inspect_err(|e| {
            tracing::info!(request_id, status = e.status().as_u16(), error = %e, "Rejected prediction request");
        })?;

    let parent = TraceContext::from_headers(headers);
    let mut span = state.tracer.start_span(PREDICTION_SPAN, parent.as_ref());
    span.set_attribute("request_id", request_id);
    for (name, value) in FEATURE_NAMES.iter().zip(request.features.to_array()) {
        span.set_attribute(name, value);
    }

    match state.model.predict(&request.features) {
        Ok(species) => {
            span.set_attribute("predicted_class", species.as_str());
            tracing::debug!(
                request_id,
                trace_id = span.trace_id(),
                predicted_class = %species,
                "Prediction served"
            );
            span.end();
            metrics::record_prediction(species.as_str());
            Ok(PredictResponse {
                predicted_class: species,
            })
        }
        Err(e) => {
            tracing::error!(
                request_id,
                trace_id = span.trace_id(),
                error = %e,
                "Inference failed"
            );
            metrics::record_prediction_error(e.kind());
            span.fail(&e);
            Err(ApiError::from(e))
        }
    }
}

/// A missing content type is accepted; an explicit non-JSON one is not.
fn check_content_type(headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(());
    };
    let content_type = value.to_str().unwrap_or_default();
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence == "application/json" || essence.ends_with("+json") {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedMediaType(content_type.to_string()).into())
    }
}
