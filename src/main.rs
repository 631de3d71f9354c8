//! Region occupancy counter
//!
//! Counts tracked entities entering and leaving a configurable polygon from
//! a stream of per-frame detections, and serves counters, history, and
//! region configuration over HTTP.
//!
//! Module structure:
//! - `domain/` - Core types (Point, Detection, RegionState, OccupancyEvent)
//! - `io/` - External interfaces (MQTT ingest, JSONL replay, HTTP API)
//! - `services/` - Occupancy logic (Tracker, Classifier, PolygonStore, Counters)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use clap::Parser;
use region_counter::infra::{Config, Metrics};
use region_counter::io::{start_api_server, ApiContext};
use region_counter::services::{ConfigService, OccupancyState, OccupancyTracker, QueryService};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Region occupancy counter - entry/exit counting over a polygon
#[derive(Parser, Debug)]
#[command(name = "region-counter", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Replay frames from a JSONL file (overrides [replay] file)
    #[arg(long)]
    replay: Option<String>,

    /// Replay pacing in frames per second (overrides [replay] fps)
    #[arg(long)]
    fps: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-frame visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "region-counter starting");

    let args = Args::parse();
    let config = match Config::load_from_path(&args.config)
        .and_then(|config| config.with_replay(args.replay, args.fps))
    {
        Ok(config) => config,
        Err(e) => {
            error!(config_file = %args.config, error = %format!("{:#}", e), "config_invalid");
            return Err(e.into());
        }
    };

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        api = %format!("{}:{}", config.api_bind_address(), config.api_port()),
        mqtt_enabled = %config.mqtt_enabled(),
        mqtt_host = %config.mqtt_host(),
        mqtt_topic = %config.mqtt_topic(),
        broker_enabled = %config.broker_enabled(),
        replay_file = ?config.replay_file(),
        target_class = %config.target_class(),
        min_confidence = %config.min_confidence(),
        boundary = %config.boundary_policy().as_str(),
        region_status = %config.initial_region().status(),
        region_points = ?config.initial_region().points(),
        "config_loaded"
    );

    if config.broker_enabled() {
        region_counter::infra::broker::start_embedded_broker(&config)?;
    }

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let metrics = Arc::new(Metrics::new());
    let state = Arc::new(OccupancyState::new(config.initial_region().clone()));

    // Create frame channel (bounded for backpressure)
    let (frame_tx, frame_rx) = mpsc::channel(config.channel_capacity());

    // Start MQTT client
    if config.mqtt_enabled() {
        let mqtt_config = config.clone();
        let mqtt_tx = frame_tx.clone();
        let mqtt_metrics = metrics.clone();
        let mqtt_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = region_counter::io::start_mqtt_client(
                &mqtt_config,
                mqtt_tx,
                mqtt_metrics,
                mqtt_shutdown,
            )
            .await
            {
                error!(error = %e, "mqtt_client_error");
            }
        });
    }

    // Start JSONL replay
    if let Some(replay_file) = config.replay_file() {
        let replay_file = replay_file.to_string();
        let fps = config.replay_fps();
        let replay_tx = frame_tx.clone();
        let replay_metrics = metrics.clone();
        let replay_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = region_counter::io::replay_file(
                &replay_file,
                fps,
                replay_tx,
                replay_metrics,
                replay_shutdown,
            )
            .await
            {
                error!(error = %e, file = %replay_file, "replay_error");
            }
        });
    }

    // Only the sources hold senders now; the channel closes when they finish
    drop(frame_tx);

    // Start HTTP API (if port > 0)
    if config.api_port() > 0 {
        let ctx = ApiContext {
            query: QueryService::new(state.clone()),
            config: ConfigService::new(state.clone(), config.frame_bounds(), metrics.clone()),
            metrics: metrics.clone(),
            site_id: Arc::from(config.site_id()),
        };
        let bind_address = config.api_bind_address().to_string();
        let port = config.api_port();
        let api_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_api_server(&bind_address, port, ctx, api_shutdown).await {
                error!(error = %e, "api_server_error");
            }
        });
    }

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run tracker - consumes frames until every source is done or shutdown
    let mut tracker = OccupancyTracker::new(&config, state.clone(), metrics.clone());
    tracker.run(frame_rx, shutdown_rx.clone()).await;

    // Sources exhausted (e.g. replay finished): keep serving queries until shutdown
    let mut shutdown = shutdown_rx;
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }

    let counters = state.counters.snapshot();
    info!(
        entries = %counters.entries,
        exits = %counters.exits,
        live_count = %counters.live,
        tracked_entities = %tracker.tracked_entities(),
        "region-counter shutdown complete"
    );
    Ok(())
}
