//! Prometheus metrics exporter.
//!
//! The batching core records through the `metrics` facade; this module
//! installs the Prometheus recorder and serves the scrape endpoint.
//!
//! # Metrics Exposed
//!
//! - `smsburst_events_admitted_total` - Events admitted for batching
//! - `smsburst_events_duplicate_total` - Events rejected as duplicates
//! - `smsburst_admission_evictions_total` - Ids evicted by cache capacity
//! - `smsburst_windows_opened_total` - Windows opened
//! - `smsburst_batches_dispatched_total` - Batches dispatched by outcome
//! - `smsburst_batch_size` - Events per batch histogram
//! - `smsburst_consumer_failures_total` - Consumer errors and panics
//! - `smsburst_scheduling_faults_total` - Timers torn down before firing
//! - `smsburst_pending_windows` - Windows currently buffered
//! - `smsburst_inbound_malformed_total` - Input lines that failed to parse

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use smsburst_domain::telemetry::describe_metrics;

/// Error type for metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("invalid metrics listen address '{address}'")]
    InvalidAddress { address: String },

    #[error("failed to install Prometheus exporter: {message}")]
    Install { message: String },
}

/// Installs the Prometheus recorder and serves it on `listen_address`.
///
/// Must be called from within a Tokio runtime, once per process.
///
/// # Errors
///
/// Returns an error if the address does not parse or a recorder is already
/// installed.
pub fn init_metrics(listen_address: &str) -> Result<SocketAddr, MetricsError> {
    let addr: SocketAddr = listen_address
        .parse()
        .map_err(|_| MetricsError::InvalidAddress {
            address: listen_address.to_string(),
        })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install {
            message: e.to_string(),
        })?;

    describe_metrics();
    metrics::describe_counter!(
        crate::ingest::INBOUND_MALFORMED_TOTAL,
        "Total number of inbound lines that failed to parse"
    );

    Ok(addr)
}
