//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, graceful shutdown)
//!     → request.rs (request ID, access-log span)
//!     → predict.rs (validate, span, classify)  |  status.rs (/health, /status)
//!     → response.rs (errors → status + {"detail"})
//!     → Send to client
//! ```

pub mod payload;
pub mod predict;
pub mod request;
pub mod response;
pub mod server;
pub mod status;

pub use payload::{InferenceRequest, PredictResponse, ValidationError};
pub use request::X_REQUEST_ID;
pub use response::ApiError;
pub use server::{build_router, AppState, HttpServer};
