//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → handed to startup, never mutated afterwards
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Replicas are disposable, so there is no hot reload: a new config
//!   means a rollout

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CredentialKind, CredentialsConfig, ExporterKind, ListenerConfig, LogFormat, ModelConfig,
    ObservabilityConfig, ScalingConfig, ServiceConfig, TimeoutConfig, TracingConfig,
};
pub use validation::{validate_config, ValidationError};
