//! smsburst binary
//!
//! Reads inbound SMS payloads as JSON lines on stdin, coalesces them per
//! sender and logs one line per completed burst.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! smsburst --config smsburst.yaml < inbound.ndjson
//!
//! # With environment variables only
//! SMSBURST_COALESCER__WINDOW_DURATION_SECS=30 smsburst
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tokio::signal;
use tracing::{error, info};

use smsburst_domain::Coalescer;
use smsburst_server::observability::{init_logging, init_metrics, LoggingConfig};
use smsburst_server::{ingest_lines, LoggingBatchConsumer, ServerConfig};

/// smsburst - coalesce bursts of SMS from the same sender
#[derive(Parser, Debug)]
#[command(name = "smsburst")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if let Some(config_path) = args.config {
        ServerConfig::load(&config_path)?
    } else {
        ServerConfig::from_env()?
    };

    init_logging(LoggingConfig::from_settings(&config.logging));

    info!(version = env!("CARGO_PKG_VERSION"), "Starting smsburst");

    if config.metrics.enabled {
        let addr = init_metrics(&config.metrics.listen_address)?;
        info!(%addr, "Prometheus metrics listening");
    }

    let coalescer_config = config.coalescer.to_coalescer_config()?;
    info!(
        window_secs = coalescer_config.window_duration.as_secs(),
        policy = %coalescer_config.window_policy,
        admission_capacity = coalescer_config.admission_cache_capacity,
        "Coalescer configured"
    );
    let coalescer = Coalescer::new(coalescer_config, Arc::new(LoggingBatchConsumer));

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = ingest_lines(&coalescer, stdin) => {
            match result {
                Ok(stats) => info!(
                    lines = stats.lines,
                    accepted = stats.accepted,
                    duplicates = stats.duplicates,
                    rejected = stats.rejected,
                    malformed = stats.malformed,
                    "Input closed"
                ),
                Err(e) => error!(error = %e, "Failed reading input"),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping ingestion");
        }
    }

    let flushed = coalescer.flush_all().await;
    info!(windows = flushed, "Pending windows flushed, exiting");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
