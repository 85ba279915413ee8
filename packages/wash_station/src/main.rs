use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod detection;
mod event_logger;
mod handlers;
mod metrics;
mod probe;
mod sensor;
#[cfg(test)]
mod test_helpers;
mod views;

use station_core::StationState;

use crate::config::{FileConfig, Profile, SensorSource, StationConfig};
use crate::detection::DetectionLoop;
use crate::event_logger::EventLogger;
use crate::metrics::StationMetrics;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "washd")]
#[command(about = "Touchless hand-wash station display server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config directory holding config.toml (defaults to ~/.config/wash_station)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Sensor timing preset (overrides `profile` in config.toml)
    #[arg(long, global = true, value_enum)]
    profile: Option<Profile>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the station in the foreground (default)
    Serve(ServeArgs),

    /// Print raw sensor samples and their classification
    Probe(ProbeArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Port for the web server
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,
}

#[derive(Args)]
struct ProbeArgs {
    /// Number of samples to read
    #[arg(short = 'n', long, default_value = "20")]
    samples: usize,

    /// Read from this source instead of the configured one
    #[arg(long, value_enum)]
    source: Option<SensorSource>,
}

#[derive(Clone)]
pub(crate) struct AppState {
    /// One message per state change, published by the sampler
    pub changes: broadcast::Sender<StationState>,
    /// Latest state
    pub current: watch::Receiver<StationState>,
    pub logger: EventLogger,
    /// Station metrics for observability
    pub metrics: Arc<StationMetrics>,
    /// Cancelled on shutdown; ends the sampler and open streams
    pub cancel: CancellationToken,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(config::default_config_dir);
    let file_config: FileConfig = config::load_config(&config_dir, cli.profile.as_ref())
        .extract()
        .with_context(|| format!("Failed to load config from {}", config_dir.display()))?;

    match cli.command {
        None => run_server(ServeArgs::default(), file_config).await,
        Some(Commands::Serve(args)) => run_server(args, file_config).await,
        Some(Commands::Probe(args)) => run_probe(args, file_config).await,
    }
}

fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "washd=debug,station_core=debug,tower_http=debug,info"
    } else {
        "washd=info,station_core=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(views::index_page))
        .route("/stream", get(handlers::stream_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .with_state(state)
}

async fn run_server(args: ServeArgs, mut file_config: FileConfig) -> Result<()> {
    info!("Starting wash station");

    // CLI flags win over config.toml and env
    if args.host.is_some() {
        file_config.server.host = args.host;
    }
    if args.port.is_some() {
        file_config.server.port = args.port;
    }
    let config = StationConfig::from_file(&file_config)?;

    let metrics = Arc::new(StationMetrics::new());
    let (logger, logger_task) = EventLogger::spawn(&config.logger, metrics.clone())?;
    let cancel = CancellationToken::new();

    let detection = DetectionLoop::new(
        sensor::from_config(&config.sensor),
        config.thresholds,
        config.timeouts,
        logger.clone(),
        metrics.clone(),
        cancel.clone(),
    )?
    .with_error_backoff(config.sensor.timing_budget);

    let (changes, _) = broadcast::channel(config.stream_capacity);
    let (current_tx, current) = watch::channel(StationState::Init);
    let sampler = detection::spawn_sampler(detection, changes.clone(), current_tx);

    let app = build_router(AppState {
        changes,
        current,
        logger,
        metrics,
        cancel: cancel.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Wash station listening on http://{}", actual_addr);
    info!("  GET /        - Station display");
    info!("  GET /stream  - Live state stream (text/event-stream)");
    info!("  GET /health  - Health check");
    info!("  GET /metrics - Counters");

    let shutdown_signal = {
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal, cleaning up...");
            // Open streams never finish on their own
            cancel.cancel();
        }
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    cancel.cancel();
    info!("Stopping sampler...");
    if let Err(e) = sampler.await {
        warn!("Sampler task failed: {}", e);
    }

    // Every logger handle is gone now, so the queue drains and the task ends
    if let Some(task) = logger_task {
        info!("Flushing usage log queue...");
        match tokio::time::timeout(Duration::from_secs(5), task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Usage logger task failed: {}", e),
            Err(_) => warn!("Usage log queue not drained before shutdown"),
        }
    }

    info!("Shutdown complete");
    server_result
}

async fn run_probe(args: ProbeArgs, file_config: FileConfig) -> Result<()> {
    let config = StationConfig::from_file(&file_config)?;
    let mut sensor_config = config.sensor.clone();
    if let Some(source) = args.source {
        sensor_config.source = source;
    }
    let thresholds = config.thresholds;

    tokio::task::spawn_blocking(move || {
        let mut sensor = sensor::from_config(&sensor_config);
        probe::probe_samples(
            sensor.as_mut(),
            thresholds,
            args.samples,
            &mut std::io::stdout().lock(),
        )
    })
    .await
    .context("Probe task panicked")?
}
