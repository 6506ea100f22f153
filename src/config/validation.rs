//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before the config is accepted into the system

use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{CredentialKind, ExporterKind, ServiceConfig};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }

    if config.model.path.trim().is_empty() {
        errors.push(ValidationError::new("model.path", "must not be empty"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    validate_tracing(config, &mut errors);

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("expected one of {:?}", LOG_LEVELS),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    validate_scaling(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_tracing(config: &ServiceConfig, errors: &mut Vec<ValidationError>) {
    let tracing = &config.tracing;
    if !tracing.enabled || tracing.exporter == ExporterKind::None {
        return;
    }

    if tracing.service_name.trim().is_empty() {
        errors.push(ValidationError::new("tracing.service_name", "must not be empty"));
    }
    if tracing.max_queue_size == 0 {
        errors.push(ValidationError::new("tracing.max_queue_size", "must be > 0"));
    }
    if tracing.max_export_batch_size == 0 || tracing.max_export_batch_size > tracing.max_queue_size {
        errors.push(ValidationError::new(
            "tracing.max_export_batch_size",
            "must be > 0 and <= max_queue_size",
        ));
    }
    if tracing.scheduled_delay_ms == 0 {
        errors.push(ValidationError::new("tracing.scheduled_delay_ms", "must be > 0"));
    }
    if tracing.export_timeout_ms == 0 {
        errors.push(ValidationError::new("tracing.export_timeout_ms", "must be > 0"));
    }
    if tracing.max_export_attempts == 0 {
        errors.push(ValidationError::new("tracing.max_export_attempts", "must be >= 1"));
    }
    if tracing.retry_base_delay_ms > tracing.retry_max_delay_ms {
        errors.push(ValidationError::new(
            "tracing.retry_base_delay_ms",
            "must be <= retry_max_delay_ms",
        ));
    }

    if tracing.exporter == ExporterKind::Http {
        match Url::parse(&tracing.collector_endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => errors.push(ValidationError::new(
                "tracing.collector_endpoint",
                format!("'{}' is not an http(s) URL", tracing.collector_endpoint),
            )),
        }

        let credentials = &tracing.credentials;
        match credentials.source {
            CredentialKind::File if credentials.token_file.is_none() => {
                errors.push(ValidationError::new(
                    "tracing.credentials.token_file",
                    "required when source = \"file\"",
                ));
            }
            CredentialKind::Env if credentials.token_env.trim().is_empty() => {
                errors.push(ValidationError::new(
                    "tracing.credentials.token_env",
                    "required when source = \"env\"",
                ));
            }
            CredentialKind::Metadata if Url::parse(&credentials.metadata_url).is_err() => {
                errors.push(ValidationError::new(
                    "tracing.credentials.metadata_url",
                    "must be a URL",
                ));
            }
            _ => {}
        }
    }
}

fn validate_scaling(config: &ServiceConfig, errors: &mut Vec<ValidationError>) {
    let scaling = &config.scaling;
    if scaling.min_replicas == 0 {
        errors.push(ValidationError::new("scaling.min_replicas", "must be >= 1"));
    }
    if scaling.min_replicas > scaling.max_replicas {
        errors.push(ValidationError::new(
            "scaling.min_replicas",
            format!(
                "{} exceeds max_replicas {}",
                scaling.min_replicas, scaling.max_replicas
            ),
        ));
    }
    if !(scaling.target_utilization > 0.0 && scaling.target_utilization <= 1.0) {
        errors.push(ValidationError::new(
            "scaling.target_utilization",
            "must be in (0, 1]",
        ));
    }
    if !(0.0..1.0).contains(&scaling.tolerance) {
        errors.push(ValidationError::new("scaling.tolerance", "must be in [0, 1)"));
    }
    if scaling.max_step == 0 {
        errors.push(ValidationError::new("scaling.max_step", "must be >= 1"));
    }
    if scaling.sync_interval_secs == 0 {
        errors.push(ValidationError::new("scaling.sync_interval_secs", "must be > 0"));
    }
}
