use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::time::Instant;

use iris_serve::config::{load_config, validate_config, ConfigError, ServiceConfig};
use iris_serve::http::{AppState, HttpServer};
use iris_serve::lifecycle::startup::{bind_listener, install_tracer, load_model};
use iris_serve::lifecycle::{Shutdown, StartupError};
use iris_serve::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "iris-serve", version, about = "Iris classifier inference service")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(long)]
    bind: Option<String>,

    /// Override model.path.
    #[arg(long)]
    model: Option<String>,
}

fn resolve_config(args: &Args) -> Result<ServiceConfig, ConfigError> {
    let mut config = load_config(args.config.as_deref())?;
    if args.bind.is_none() && args.model.is_none() {
        return Ok(config);
    }

    if let Some(bind) = &args.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(model) = &args.model {
        config.model.path = model.clone();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("iris-serve: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "iris-serve starting");

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServiceConfig) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        model = %config.model.path,
        exporter = ?config.tracing.exporter,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::Address(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let model = load_model(&config.model)?;
    let provider = install_tracer(&config.tracing)?;
    let state = AppState::new(model, provider.tracer(), provider.exporter_kind());
    let server = HttpServer::new(&config, state);

    let listener = bind_listener(&config.listener).await?;
    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let served = tokio::select! {
        _ = shutdown.trigger_on_signal() => None,
        result = &mut server_task => Some(result),
    };

    let grace = Duration::from_secs(config.timeouts.shutdown_grace_secs);
    let deadline = Instant::now() + grace;

    let served = match served {
        Some(result) => result,
        None => {
            match tokio::time::timeout_at(deadline, &mut server_task).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(grace_secs = grace.as_secs(), "In-flight requests did not drain in time");
                    server_task.abort();
                    Ok(Ok(()))
                }
            }
        }
    };

    match tokio::time::timeout_at(deadline, provider.shutdown()).await {
        Ok(stats) => tracing::info!(
            exported = stats.exported,
            dropped = stats.dropped_queue_full + stats.dropped_export_failed,
            "Spans flushed"
        ),
        Err(_) => tracing::warn!("Span flush abandoned at shutdown deadline"),
    }

    match served {
        Ok(result) => result.map_err(StartupError::Serve),
        Err(e) => {
            tracing::error!(error = %e, "HTTP server task panicked");
            Ok(())
        }
    }
}
