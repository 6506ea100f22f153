//! Spans and the scope guard that closes them.
//!
//! # Lifecycle
//! ```text
//! Tracer::start_span  → ActiveSpan (open, status UNSET)
//!     set_attribute   → attributes attached while running
//!     end / fail      → status OK / ERROR
//!     drop            → end time fixed, UNSET becomes CANCELLED,
//!                       SpanData handed to the export queue
//! ```
//!
//! `Drop` is the only place a span is closed, so every exit path (success,
//! error, early return, future cancelled on client disconnect) closes it
//! exactly once.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

use super::context::TraceContext;
use super::tracer::Tracer;

/// A primitive attribute value. Anything else is stringified before attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Span status. `Unset` only exists while the span is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanStatus {
    Unset,
    Ok,
    Error { message: String },
    Cancelled,
}

/// A closed span, ready for export.
#[derive(Debug, Clone, Serialize)]
pub struct SpanData {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    #[serde(rename = "start_time_unix_nano", serialize_with = "unix_nanos")]
    pub start_time: SystemTime,
    #[serde(rename = "end_time_unix_nano", serialize_with = "unix_nanos")]
    pub end_time: SystemTime,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub status: SpanStatus,
    #[serde(skip)]
    pub sampled: bool,
}

impl SpanData {
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

fn unix_nanos<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let nanos = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    serializer.serialize_u64(nanos)
}

/// An open span. Closing happens on drop.
#[derive(Debug)]
pub struct ActiveSpan {
    data: Option<SpanData>,
    tracer: Tracer,
}

impl ActiveSpan {
    pub(crate) fn new(
        tracer: Tracer,
        name: &str,
        context: TraceContext,
        parent_span_id: Option<String>,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            data: Some(SpanData {
                trace_id: context.trace_id,
                span_id: context.span_id,
                parent_span_id,
                name: name.to_string(),
                start_time: now,
                end_time: now,
                attributes: BTreeMap::new(),
                status: SpanStatus::Unset,
                sampled: context.sampled,
            }),
            tracer,
        }
    }

    /// Attach or overwrite an attribute.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<AttributeValue>) {
        if let Some(data) = self.data.as_mut() {
            data.attributes.insert(key.to_string(), value.into());
        }
    }

    pub fn trace_id(&self) -> &str {
        self.data.as_ref().map(|d| d.trace_id.as_str()).unwrap_or_default()
    }

    pub fn span_id(&self) -> &str {
        self.data.as_ref().map(|d| d.span_id.as_str()).unwrap_or_default()
    }

    /// Close with `OK`.
    pub fn end(mut self) {
        self.set_status_if_unset(SpanStatus::Ok);
    }

    /// Close with `ERROR` and the error text as message.
    pub fn fail(mut self, error: &dyn std::fmt::Display) {
        let message = error.to_string();
        self.set_attribute("error.message", message.as_str());
        self.set_status_if_unset(SpanStatus::Error { message });
    }

    fn set_status_if_unset(&mut self, status: SpanStatus) {
        if let Some(data) = self.data.as_mut() {
            if data.status == SpanStatus::Unset {
                data.status = status;
            }
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if let Some(mut data) = self.data.take() {
            data.end_time = SystemTime::now();
            if data.status == SpanStatus::Unset {
                data.status = SpanStatus::Cancelled;
            }
            self.tracer.on_end(data);
        }
    }
}
