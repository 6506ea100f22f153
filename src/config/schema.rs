//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a replica.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for the inference service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Model artifact location.
    pub model: ModelConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Span export settings.
    pub tracing: TracingConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Scaling policy consumed by the autoscale controller.
    pub scaling: ScalingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            max_body_bytes: 16 * 1024,
        }
    }
}

/// Model artifact configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the JSON decision tree artifact.
    pub path: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/iris_tree.json".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Upper bound on draining in-flight requests and pending spans at shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 10,
            shutdown_grace_secs: 25,
        }
    }
}

/// Which span exporter to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    /// Batched JSON POST to `collector_endpoint`.
    Http,
    /// Spans written as structured log events.
    Log,
    /// Spans are closed and discarded.
    None,
}

/// Ambient credential used to authenticate to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    None,
    /// Token read from `token_env`.
    Env,
    /// Projected token file, re-read on every export.
    File,
    /// Token fetched from the instance metadata server.
    Metadata,
}

/// Credential configuration. Tokens are never stored in the config itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub source: CredentialKind,

    /// Environment variable holding a bearer token.
    pub token_env: String,

    /// Path of a projected service account token.
    pub token_file: Option<String>,

    /// Metadata server token endpoint.
    pub metadata_url: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            source: CredentialKind::None,
            token_env: "TRACE_AUTH_TOKEN".to_string(),
            token_file: None,
            metadata_url:
                "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token"
                    .to_string(),
        }
    }
}

/// Span export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Enable span export.
    pub enabled: bool,

    /// `service.name` attached to every span.
    pub service_name: String,

    pub exporter: ExporterKind,

    /// Collector URL for the `http` exporter.
    pub collector_endpoint: String,

    pub credentials: CredentialsConfig,

    /// Spans buffered before new ones are dropped.
    pub max_queue_size: usize,

    /// Spans per export call; a full batch triggers an immediate flush.
    pub max_export_batch_size: usize,

    /// Flush interval in milliseconds.
    pub scheduled_delay_ms: u64,

    /// Deadline for a single export call in milliseconds.
    pub export_timeout_ms: u64,

    /// Attempts per batch before it is dropped.
    pub max_export_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub retry_max_delay_ms: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "iris-classifier".to_string(),
            exporter: ExporterKind::Log,
            collector_endpoint: "http://localhost:4318/v1/traces".to_string(),
            credentials: CredentialsConfig::default(),
            max_queue_size: 2048,
            max_export_batch_size: 512,
            scheduled_delay_ms: 5000,
            export_timeout_ms: 10_000,
            max_export_attempts: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Scaling policy for the replica pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub min_replicas: u32,

    pub max_replicas: u32,

    /// Target average CPU utilization, as a fraction in (0, 1].
    pub target_utilization: f64,

    /// Relative deviation from target that is treated as on-target.
    pub tolerance: f64,

    /// Largest replica change per scaling event.
    pub max_step: u32,

    /// Seconds between utilization samples.
    pub sync_interval_secs: u64,

    /// Minimum seconds since the last scaling event before scaling up.
    pub scale_up_cooldown_secs: u64,

    /// Minimum seconds since the last scaling event before scaling down.
    pub scale_down_cooldown_secs: u64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 5,
            target_utilization: 0.6,
            tolerance: 0.1,
            max_step: 1,
            sync_interval_secs: 15,
            scale_up_cooldown_secs: 60,
            scale_down_cooldown_secs: 300,
        }
    }
}
