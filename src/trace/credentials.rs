//! Ambient credentials for the collector.
//!
//! # Responsibilities
//! - Resolve a bearer token from the replica's workload identity
//! - Never read secrets from the configuration file itself
//!
//! # Sources
//! - `env`: token in an environment variable (injected by the platform)
//! - `file`: projected service account token, re-read on every export so
//!   rotation needs no restart
//! - `metadata`: instance metadata server, cached until shortly before expiry

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use super::exporter::ExportError;
use crate::config::{CredentialKind, CredentialsConfig};

/// Refresh metadata tokens this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub enum CredentialSource {
    None,
    Env(String),
    File(PathBuf),
    Metadata(MetadataToken),
}

impl CredentialSource {
    pub fn from_config(
        config: &CredentialsConfig,
        client: &reqwest::Client,
    ) -> Result<Self, ExportError> {
        match config.source {
            CredentialKind::None => Ok(CredentialSource::None),
            CredentialKind::Env => Ok(CredentialSource::Env(config.token_env.clone())),
            CredentialKind::File => config
                .token_file
                .as_ref()
                .map(|p| CredentialSource::File(PathBuf::from(p)))
                .ok_or_else(|| ExportError::Credential("token_file is not configured".into())),
            CredentialKind::Metadata => {
                let url = Url::parse(&config.metadata_url)
                    .map_err(|e| ExportError::Credential(format!("invalid metadata_url: {}", e)))?;
                Ok(CredentialSource::Metadata(MetadataToken::new(url, client.clone())))
            }
        }
    }

    /// Current bearer token, if this source provides one.
    pub async fn bearer_token(&self) -> Result<Option<String>, ExportError> {
        match self {
            CredentialSource::None => Ok(None),
            CredentialSource::Env(var) => std::env::var(var)
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .map(Some)
                .ok_or_else(|| ExportError::Credential(format!("{} is not set", var))),
            CredentialSource::File(path) => {
                let token = tokio::fs::read_to_string(path).await.map_err(|e| {
                    ExportError::Credential(format!("cannot read {}: {}", path.display(), e))
                })?;
                let token = token.trim();
                if token.is_empty() {
                    return Err(ExportError::Credential(format!(
                        "{} is empty",
                        path.display()
                    )));
                }
                Ok(Some(token.to_string()))
            }
            CredentialSource::Metadata(metadata) => metadata.token().await.map(Some),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Token from the instance metadata server.
#[derive(Debug)]
pub struct MetadataToken {
    url: Url,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataToken {
    pub fn new(url: Url, client: reqwest::Client) -> Self {
        Self {
            url,
            client,
            cached: Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String, ExportError> {
        // Held across the fetch so concurrent exports share one refresh.
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .get(self.url.clone())
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| ExportError::Credential(format!("metadata server unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ExportError::Credential(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ExportError::Credential(format!("bad token response: {}", e)))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(REFRESH_MARGIN);
        tracing::debug!(expires_in = body.expires_in, "Refreshed collector access token");

        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(body.access_token)
    }
}
