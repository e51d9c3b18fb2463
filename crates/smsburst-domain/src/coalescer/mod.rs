//! Event coalescer: the single ingress for inbound events.
//!
//! Submitting an event runs the whole admission path synchronously:
//!
//! 1. **Normalize**: the raw originator is mapped to its grouping key
//! 2. **Admit**: the event id is checked against the admission cache
//! 3. **Buffer**: the event is appended to its key's window
//! 4. **Arm**: the first event of a window arms its timer
//!
//! Nothing on this path blocks or performs I/O. When a window's timer fires,
//! the window is detached and handed to the [`BatchConsumer`] on the timer's
//! own task. `submit` has long returned by then, so consumer failures are
//! never reported to the submitter.
//!
//! [`BatchConsumer`]: crate::dispatcher::BatchConsumer

mod config;
mod service;

pub use config::{CoalescerConfig, DEFAULT_WINDOW_DURATION};
pub use service::Coalescer;

#[cfg(test)]
mod tests;
