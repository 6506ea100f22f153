//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Span batch export:
//!     → timeout per attempt (export_timeout_ms)
//!     → On failure: backoff.rs (exponential delay + jitter)
//!     → After max_export_attempts: batch dropped, logged, counted
//! ```
//!
//! # Design Decisions
//! - Retries exist only on the export path; predictions are never retried
//! - Backoff adds up to 10% jitter on top of the exponential delay

pub mod backoff;

pub use backoff::Backoff;
