//! W3C trace context.
//!
//! Parses the incoming `traceparent` header so the prediction span joins
//! the caller's trace, and mints fresh ids otherwise.

use axum::http::HeaderMap;
use rand::Rng;

/// W3C Trace Context header name.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Identity of a span within a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// 128-bit trace id, 32 lowercase hex chars.
    pub trace_id: String,
    /// 64-bit span id, 16 lowercase hex chars.
    pub span_id: String,
    pub sampled: bool,
}

impl TraceContext {
    /// Start a new trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            sampled: true,
        }
    }

    /// A new span id in the same trace.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: generate_span_id(),
            sampled: self.sampled,
        }
    }

    /// Format as a `traceparent` value: `00-{trace_id}-{span_id}-{flags}`.
    pub fn to_traceparent(&self) -> String {
        format!(
            "00-{}-{}-{:02x}",
            self.trace_id,
            self.span_id,
            u8::from(self.sampled)
        )
    }

    /// Parse a `traceparent` value. The returned context names the caller's span.
    pub fn from_traceparent(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;

        // Version 00 has exactly four fields; "ff" is forbidden.
        if version.len() != 2 || !is_hex(version) || version == "ff" {
            return None;
        }
        if version == "00" && parts.next().is_some() {
            return None;
        }
        if trace_id.len() != 32 || span_id.len() != 16 || flags.len() != 2 {
            return None;
        }
        if !is_hex(trace_id) || !is_hex(span_id) || !is_hex(flags) {
            return None;
        }
        // All-zero ids are invalid.
        if trace_id.bytes().all(|b| b == b'0') || span_id.bytes().all(|b| b == b'0') {
            return None;
        }

        let flags = u8::from_str_radix(flags, 16).ok()?;
        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: span_id.to_ascii_lowercase(),
            sampled: flags & 0x01 != 0,
        })
    }

    /// Extract the caller's context from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(TRACEPARENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::from_traceparent)
    }
}

fn generate_trace_id() -> String {
    let id: u128 = rand::thread_rng().gen_range(1..=u128::MAX);
    format!("{:032x}", id)
}

fn generate_span_id() -> String {
    let id: u64 = rand::thread_rng().gen_range(1..=u64::MAX);
    format!("{:016x}", id)
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}
