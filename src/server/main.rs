//! Water lookup server.
//!
//! Loads the water datasets, builds the spatial indices and serves the
//! `is-on-water` HTTP API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use onwater::api::{self, AppState};
use onwater::config::Config;
use onwater::telemetry;
use onwater::WaterClassifier;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// How often idle rate limiter entries are dropped.
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Answers whether a coordinate is on water")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Log filter (overrides the config file; RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    // Initialize logging
    telemetry::init_logging(&config.log_level, config.log_format, &config.telemetry)?;

    info!("Onwater Server");

    // Load and index datasets before accepting traffic; any failure is fatal
    let started = Instant::now();
    let classifier = tokio::task::spawn_blocking({
        let datasets = config.datasets.clone();
        move || WaterClassifier::load(&datasets)
    })
    .await?
    .context("Failed to load water datasets")?;

    info!(
        "Loaded {} water collections in {:.1}s",
        classifier.collections().len(),
        started.elapsed().as_secs_f64()
    );

    let state = Arc::new(AppState::new(classifier, &config));
    let pruner = Arc::clone(&state.rate_limit).spawn_pruner(RATE_LIMIT_PRUNE_INTERVAL);

    let app = api::router(Arc::clone(&state), &config);

    info!("Starting server on {}", config.listen);

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(pruner) = pruner {
        pruner.abort();
    }
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
