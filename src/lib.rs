//! Iris classifier inference service.
//!
//! A stateless replica that serves `POST /predict/`, wraps every inference in
//! a span, and exports spans in batches on a background task. The replica
//! pool is resized by an external autoscaler whose contract is modeled in
//! [`scaling`].
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http (axum + tower-http) ──▶ model (Classifier) ──▶ response
//!                    │
//!                    └── trace::Tracer ──▶ SpanQueue ──▶ export worker ──▶ collector
//!
//!     Cross-cutting: config, observability (logs + metrics), lifecycle, resilience
//!     Out of band:   scaling (utilization → replica count)
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod model;
pub mod trace;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

// Replica pool contract
pub mod scaling;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
