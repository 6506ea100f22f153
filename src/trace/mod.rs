//! Span tracing and export subsystem.
//!
//! # Data Flow
//! ```text
//! startup:   TracerProvider::install(exporter) → Tracer handle → AppState
//! request:   Tracer::start_span → ActiveSpan → (drop) → SpanQueue
//! worker:    SpanQueue → batch → SpanExporter (http / log / memory)
//! shutdown:  TracerProvider::shutdown → final flush → worker exits
//! ```
//!
//! # Design Decisions
//! - Best-effort, at-most-once: export failures never reach the request path
//! - No global provider; the tracer is passed explicitly
//! - Attribute values are primitives; labels are stringified on attachment

pub mod context;
pub mod credentials;
pub mod exporter;
pub mod processor;
pub mod queue;
pub mod span;
pub mod tracer;

pub use context::TraceContext;
pub use credentials::CredentialSource;
pub use exporter::{ExportError, HttpExporter, InMemoryExporter, LogExporter, SpanExporter};
pub use processor::{BatchConfig, TracerProvider};
pub use queue::ExportStats;
pub use span::{ActiveSpan, AttributeValue, SpanData, SpanStatus};
pub use tracer::Tracer;
