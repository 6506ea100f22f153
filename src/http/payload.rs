//! Prediction request and response bodies.
//!
//! The body is decoded by hand rather than through `axum::Json` so that every
//! field problem is reported at once and mapped to our own status codes.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::{Features, Species, FEATURE_NAMES};

/// What is wrong with one input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    NotANumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub problem: FieldProblem,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.problem {
            FieldProblem::Missing => write!(f, "{}: field required", self.field),
            FieldProblem::NotANumber => write!(f, "{}: value is not a valid number", self.field),
        }
    }
}

/// Client input rejected before inference.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{}", join_fields(.0))]
    Fields(Vec<FieldError>),

    #[error("body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("body must be a JSON object")]
    NotAnObject,

    #[error("unsupported content type '{0}', expected application/json")]
    UnsupportedMediaType(String),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::Fields(_) => "invalid_field",
            ValidationError::MalformedJson(_) => "malformed_json",
            ValidationError::NotAnObject => "not_an_object",
            ValidationError::UnsupportedMediaType(_) => "unsupported_media_type",
        }
    }
}

/// A well-formed prediction request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceRequest {
    pub features: Features,
}

impl InferenceRequest {
    /// Decode and validate a request body. Unknown fields are ignored.
    pub fn from_slice(body: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let mut values = [0.0; 4];
        let mut errors = Vec::new();
        for (slot, field) in values.iter_mut().zip(FEATURE_NAMES) {
            match number_field(object, field) {
                Ok(v) => *slot = v,
                Err(problem) => errors.push(FieldError { field, problem }),
            }
        }
        if !errors.is_empty() {
            return Err(ValidationError::Fields(errors));
        }

        let [sepal_length, sepal_width, petal_length, petal_width] = values;
        Ok(Self {
            features: Features {
                sepal_length,
                sepal_width,
                petal_length,
                petal_width,
            },
        })
    }
}

/// Numbers, and strings holding a finite number, are accepted.
fn number_field(object: &Map<String, Value>, field: &str) -> Result<f64, FieldProblem> {
    let value = match object.get(field) {
        None | Some(Value::Null) => return Err(FieldProblem::Missing),
        Some(value) => value,
    };
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number
        .filter(|n| n.is_finite())
        .ok_or(FieldProblem::NotANumber)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PredictResponse {
    pub predicted_class: Species,
}
