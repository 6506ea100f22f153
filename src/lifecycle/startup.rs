//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the model artifact (fatal on failure)
//! - Install the span export pipeline chosen by configuration
//! - Bind the listener last, so traffic only arrives when ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and exits with status 1
//! - Subsystems initialize in order, not concurrently

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use url::Url;

use crate::config::{ExporterKind, ListenerConfig, ModelConfig, TracingConfig};
use crate::model::{ArtifactError, Classifier, DecisionTree};
use crate::trace::{
    BatchConfig, CredentialSource, ExportError, HttpExporter, LogExporter, TracerProvider,
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load model: {0}")]
    Model(#[from] ArtifactError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("invalid address '{0}'")]
    Address(String),

    #[error("invalid collector endpoint: {0}")]
    CollectorEndpoint(#[from] url::ParseError),

    #[error("failed to build collector client: {0}")]
    HttpClient(reqwest::Error),

    #[error("collector credentials: {0}")]
    Credentials(#[from] ExportError),

    #[error("HTTP server failed: {0}")]
    Serve(std::io::Error),
}

/// Load and validate the decision tree artifact.
pub fn load_model(config: &ModelConfig) -> Result<Arc<dyn Classifier>, StartupError> {
    let tree = DecisionTree::load(Path::new(&config.path))?;
    let info = tree.info();
    tracing::info!(
        path = %config.path,
        nodes = info.node_count,
        depth = info.depth,
        "Model loaded"
    );
    Ok(Arc::new(tree))
}

/// Install the span pipeline. Must be called inside a Tokio runtime.
pub fn install_tracer(config: &TracingConfig) -> Result<TracerProvider, StartupError> {
    if !config.enabled || config.exporter == ExporterKind::None {
        tracing::info!("Span export disabled");
        return Ok(TracerProvider::noop(&config.service_name));
    }

    let batch = BatchConfig::from_config(config);
    let provider = match config.exporter {
        ExporterKind::Http => {
            let endpoint = Url::parse(&config.collector_endpoint)?;
            let client = reqwest::Client::builder()
                .timeout(Duration::from_millis(config.export_timeout_ms))
                .build()
                .map_err(StartupError::HttpClient)?;
            let credentials = CredentialSource::from_config(&config.credentials, &client)?;
            tracing::info!(
                endpoint = %endpoint,
                credentials = ?config.credentials.source,
                "Exporting spans to collector"
            );
            let exporter = HttpExporter::new(client, endpoint, &config.service_name, credentials);
            TracerProvider::install(&config.service_name, batch, exporter)
        }
        ExporterKind::Log | ExporterKind::None => {
            TracerProvider::install(&config.service_name, batch, LogExporter)
        }
    };
    Ok(provider)
}

pub async fn bind_listener(config: &ListenerConfig) -> Result<TcpListener, StartupError> {
    TcpListener::bind(&config.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.bind_address.clone(),
            source,
        })
}
