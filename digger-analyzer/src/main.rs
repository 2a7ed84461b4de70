//! Crate Digger Analyzer (digger-analyzer) - Main entry point
//!
//! Records a clip, identifies the track, looks up its samples and serves the
//! analyzer and dashboard views over HTTP + SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use digger_analyzer::config::{AnalyzerConfig, ConfigOverrides};
use digger_analyzer::recording::RecordingSource;
use digger_analyzer::services::SampleApiClient;
use digger_analyzer::{build_router, AppState, EVENT_BUS_CAPACITY};
use digger_common::events::EventBus;

/// Command-line arguments for digger-analyzer
#[derive(Parser, Debug)]
#[command(name = "digger-analyzer")]
#[command(about = "Song identification and sample lookup service for Crate Digger")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "DIGGER_ANALYZER_PORT")]
    port: Option<u16>,

    /// Base URL of the identification / sample lookup service
    #[arg(long, env = "DIGGER_SERVICE_URL")]
    service_url: Option<String>,

    /// Timeout for each remote call, in seconds
    #[arg(long, env = "DIGGER_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Capture device name (default input device if unset)
    #[arg(long, env = "DIGGER_INPUT_DEVICE")]
    input_device: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "DIGGER_LOG_LEVEL")]
    log_level: Option<String>,

    /// TOML config file (default: <config dir>/crate-digger/digger-analyzer.toml)
    #[arg(short, long, env = "DIGGER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        port: args.port,
        service_url: args.service_url,
        request_timeout_secs: args.request_timeout_secs,
        input_device: args.input_device,
        log_level: args.log_level,
    };
    let config = AnalyzerConfig::load(args.config.as_deref(), overrides)
        .context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("digger_analyzer={0},digger_common={0},tower_http=info", config.log_level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Crate Digger Analyzer on port {}", config.port);
    info!("Analysis service: {}", config.service_url);

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let service = Arc::new(
        SampleApiClient::new(config.service_url.clone(), config.request_timeout)
            .context("Failed to create analysis service client")?,
    );
    let source = recording_source(&config);

    let state = AppState::new(source, service, event_bus);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(feature = "microphone")]
fn recording_source(config: &AnalyzerConfig) -> Arc<dyn RecordingSource> {
    use digger_analyzer::recording::MicrophoneSource;

    match MicrophoneSource::list_devices() {
        Ok(devices) => info!("Input devices: {:?}", devices),
        Err(e) => tracing::warn!("Could not list input devices: {}", e),
    }
    Arc::new(MicrophoneSource::new(config.input_device.clone()))
}

#[cfg(not(feature = "microphone"))]
fn recording_source(config: &AnalyzerConfig) -> Arc<dyn RecordingSource> {
    use digger_analyzer::recording::UnavailableSource;

    if let Some(device) = &config.input_device {
        tracing::warn!("Ignoring input device '{}': built without microphone support", device);
    }
    Arc::new(UnavailableSource::new(
        "built without the `microphone` feature",
    ))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
