//! Event model shared by every component of the coalescer.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Opaque unique token identifying one inbound event (e.g. a provider GUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new event id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An admitted event.
///
/// The arrival order is stamped by the [`KeyBufferStore`](crate::buffer::KeyBufferStore)
/// inside the per-key critical section, so it is strictly increasing within
/// one window. Once buffered an event is never mutated.
#[derive(Debug, Clone)]
pub struct Event<P> {
    id: EventId,
    key: String,
    payload: P,
    arrival_order: u64,
    received_at: Instant,
}

impl<P> Event<P> {
    /// Creates an event that has not yet been stamped with an arrival order.
    pub fn new(id: impl Into<EventId>, key: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            payload,
            arrival_order: 0,
            received_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Sequence number assigned when the event joined its window.
    pub fn arrival_order(&self) -> u64 {
        self.arrival_order
    }

    /// Monotonic instant at which the event was constructed by `submit`.
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Consumes the event, returning its payload.
    pub fn into_payload(self) -> P {
        self.payload
    }

    pub(crate) fn stamp(&mut self, arrival_order: u64) {
        self.arrival_order = arrival_order;
    }
}

/// Outcome of submitting an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionResult {
    /// The event was new and has been buffered for its key.
    Accepted,
    /// The id was already seen; the event was dropped.
    Duplicate,
}

impl AdmissionResult {
    pub fn is_accepted(self) -> bool {
        matches!(self, AdmissionResult::Accepted)
    }
}
