//! Observability infrastructure for smsburst.
//!
//! This module provides:
//! - Structured logging configuration
//! - Prometheus metrics exporter setup

mod logging;
mod metrics;

pub use logging::{create_json_layer, init_logging, parse_log_level, LoggingConfig};
pub use metrics::{init_metrics, MetricsError};
