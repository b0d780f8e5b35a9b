//! Job Success Predictor - Serving Entry Point
//!
//! Loads the trained pipeline artifact and answers predictions over HTTP.
//! A missing or invalid artifact does not stop the server; it starts unready
//! and can be brought up later with `POST /model/reload` (or SIGHUP).

use anyhow::{Context, Result};
use clap::Parser;
use job_success_predictor::{
    config::AppConfig,
    logging,
    metrics::{MetricsReporter, ServingMetrics},
    models::inference::InferenceEngine,
    server::{self, AppState},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Serve job success predictions over HTTP.
#[derive(Parser)]
#[command(name = "job-predictor-serve", version, about)]
struct Args {
    /// Configuration file (optional; defaults and environment apply without it)
    #[arg(short, long, default_value = job_success_predictor::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the model artifact path
    #[arg(long)]
    artifact: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_from_path(&args.config)?;
    if let Some(artifact) = args.artifact {
        config.model.artifact_path = artifact;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    logging::init(&config.logging)?;
    info!("Starting Job Success Predictor service");
    info!(
        artifact = %config.model.artifact_path.display(),
        timeout_ms = config.server.request_timeout_ms,
        "Configuration loaded"
    );

    // Startup load failures leave the engine unready rather than aborting.
    let engine = Arc::new(InferenceEngine::new(&config));
    let metrics = Arc::new(ServingMetrics::new());

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    #[cfg(unix)]
    spawn_reload_on_hangup(engine.clone(), metrics.clone())?;

    let app = server::router(
        AppState::new(engine, metrics.clone()),
        Duration::from_millis(config.server.request_timeout_ms),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Service shutting down...");
    metrics.log_summary();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}

#[cfg(unix)]
fn spawn_reload_on_hangup(engine: Arc<InferenceEngine>, metrics: Arc<ServingMetrics>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received; reloading model artifact");
            let engine = engine.clone();
            match tokio::task::spawn_blocking(move || engine.reload()).await {
                Ok(Ok(_)) => metrics.record_reload(),
                Ok(Err(e)) => warn!(error = %e, "Reload failed; keeping current model"),
                Err(e) => error!(error = %e, "Reload task panicked"),
            }
        }
    });
    Ok(())
}
