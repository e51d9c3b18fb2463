//! smsburst-server: Service wiring around the coalescer
//!
//! This crate contains everything the `smsburst` binary needs besides the
//! batching core:
//! - Configuration loading (YAML file + environment overrides)
//! - Structured logging and Prometheus metrics setup
//! - The inbound SMS record format and line ingestion
//! - A reference batch consumer that logs each batch
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              smsburst-server                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs      - Configuration management  │
//! │  inbound.rs     - SMS record parsing        │
//! │  ingest.rs      - stdin → coalescer loop    │
//! │  consumer.rs    - Logging batch consumer    │
//! │  observability/ - Logging and metrics       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod consumer;
pub mod inbound;
pub mod ingest;
pub mod observability;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use consumer::{BatchSummary, LoggingBatchConsumer};
pub use inbound::{parse_line, InboundError, SmsRecord};
pub use ingest::{ingest_lines, IngestStats};
