//! Error responses.
//!
//! Client-facing failures stop here: every handler error is mapped to a
//! status code and a `{"detail": "..."}` body. Span export errors never
//! reach this type.

use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::model::InferenceError;

use super::payload::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to read request body: {0}")]
    Body(#[from] BytesRejection),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(ValidationError::Fields(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Validation(ValidationError::MalformedJson(_))
            | ApiError::Validation(ValidationError::NotAnObject) => StatusCode::BAD_REQUEST,
            ApiError::Validation(ValidationError::UnsupportedMediaType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
