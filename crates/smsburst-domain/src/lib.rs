//! smsburst-domain: Per-originator event coalescing
//!
//! This crate contains the core batching logic including:
//! - Duplicate suppression for replayed event ids
//! - Per-key buffering with one window timer per key
//! - Order-preserving batch extraction and dispatch
//! - Key normalization for originator identifiers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              smsburst-domain                │
//! ├─────────────────────────────────────────────┤
//! │  admission.rs  - Bounded FIFO id cache      │
//! │  buffer.rs     - Per-key window store       │
//! │  scheduler.rs  - One timer per window       │
//! │  dispatcher.rs - Drain + consumer handoff   │
//! │  telemetry.rs  - Metric names               │
//! │  coalescer/    - Submit facade and config   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! All state is process-local. Pending windows and the admission cache are
//! lost on restart.

pub mod admission;
pub mod buffer;
pub mod coalescer;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod normalize;
pub mod scheduler;
pub mod telemetry;

// Re-export commonly used types at the crate root
pub use admission::{AdmissionCache, AdmissionDecision, DEFAULT_ADMISSION_CAPACITY};
pub use buffer::{AppendOutcome, FiredWindow, KeyBufferStore, TakeOutcome, WindowSnapshot};
pub use coalescer::{Coalescer, CoalescerConfig, DEFAULT_WINDOW_DURATION};
pub use dispatcher::{BatchConsumer, DispatchOutcome, Dispatcher};
pub use error::{ConsumerError, ConsumerResult, SubmitError, SubmitResult};
pub use event::{AdmissionResult, Event, EventId};
pub use normalize::{FnNormalizer, IdentityNormalizer, KeyNormalizer, PhoneNumberNormalizer};
pub use scheduler::{TimerHandle, WindowPolicy, WindowScheduler};
