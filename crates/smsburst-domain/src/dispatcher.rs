//! Batch handoff to the downstream consumer.
//!
//! The dispatcher calls the consumer at most once per fired window. Consumer
//! errors and panics are caught here, logged with the key and batch size,
//! and the batch is dropped. A failed batch is never redelivered.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error};

use crate::buffer::KeyBufferStore;
use crate::error::{ConsumerError, ConsumerResult};
use crate::event::Event;
use crate::telemetry;

/// Downstream processing for a completed batch.
///
/// Implementations must tolerate concurrent calls for distinct keys. The
/// coalescer never calls `on_batch_ready` twice for the same window.
#[async_trait]
pub trait BatchConsumer<P>: Send + Sync {
    /// Handles the events buffered for `key`, in arrival order.
    async fn on_batch_ready(&self, key: &str, events: Vec<Event<P>>) -> ConsumerResult<()>;
}

/// Outcome of a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The consumer accepted the batch.
    Delivered { count: usize },
    /// There was nothing to deliver; the consumer was not called.
    Empty,
    /// The consumer failed; the batch was dropped.
    Failed { count: usize, error: ConsumerError },
}

/// Invokes the consumer for extracted batches.
pub struct Dispatcher<P> {
    consumer: Arc<dyn BatchConsumer<P>>,
}

impl<P> Dispatcher<P>
where
    P: Send + Sync + 'static,
{
    pub fn new(consumer: Arc<dyn BatchConsumer<P>>) -> Self {
        Self { consumer }
    }

    /// Delivers `events` for `key` to the consumer.
    pub async fn dispatch(&self, key: &str, events: Vec<Event<P>>) -> DispatchOutcome {
        if events.is_empty() {
            debug!(key = %key, "empty batch, consumer not called");
            return DispatchOutcome::Empty;
        }

        let count = events.len();
        metrics::histogram!(telemetry::BATCH_SIZE).record(count as f64);

        let call = AssertUnwindSafe(self.consumer.on_batch_ready(key, events)).catch_unwind();
        let result = match call.await {
            Ok(result) => result,
            Err(panic) => Err(ConsumerError::panicked(panic.as_ref())),
        };

        match result {
            Ok(()) => {
                metrics::counter!(telemetry::BATCHES_DISPATCHED_TOTAL, "outcome" => "delivered")
                    .increment(1);
                debug!(key = %key, count, "batch delivered");
                DispatchOutcome::Delivered { count }
            }
            Err(error) => {
                metrics::counter!(telemetry::BATCHES_DISPATCHED_TOTAL, "outcome" => "failed")
                    .increment(1);
                metrics::counter!(telemetry::CONSUMER_FAILURES_TOTAL).increment(1);
                error!(key = %key, count, error = %error, "batch consumer failed, batch dropped");
                DispatchOutcome::Failed { count, error }
            }
        }
    }

    /// Drains `key` from `store` and delivers whatever was buffered.
    pub async fn extract_and_dispatch(
        &self,
        store: &KeyBufferStore<P>,
        key: &str,
    ) -> DispatchOutcome {
        let events = store.take_and_clear(key);
        self.dispatch(key, events).await
    }
}
