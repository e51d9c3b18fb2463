//! Reference batch consumer.
//!
//! [`LoggingBatchConsumer`] writes one structured log line per completed
//! window. Downstream classification plugs in at the same seam by
//! implementing [`BatchConsumer`] for [`SmsRecord`].

use async_trait::async_trait;
use smsburst_domain::{BatchConsumer, ConsumerResult, Event};
use tracing::info;

use crate::inbound::SmsRecord;

/// Summary of one originator's burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub key: String,
    pub count: usize,
    pub guids: Vec<String>,
    /// Message bodies in arrival order, joined by a single space.
    pub text: String,
    /// Milliseconds between the first and last arrival.
    pub span_ms: u64,
}

impl BatchSummary {
    pub fn from_events(key: &str, events: &[Event<SmsRecord>]) -> Self {
        let guids = events.iter().map(|e| e.payload().guid.clone()).collect();
        let text = events
            .iter()
            .map(|e| e.payload().message.trim())
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let span_ms = match (events.first(), events.last()) {
            (Some(first), Some(last)) => {
                let span = last
                    .received_at()
                    .saturating_duration_since(first.received_at());
                u64::try_from(span.as_millis()).unwrap_or(u64::MAX)
            }
            _ => 0,
        };

        Self {
            key: key.to_string(),
            count: events.len(),
            guids,
            text,
            span_ms,
        }
    }
}

/// Logs every batch it receives and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBatchConsumer;

#[async_trait]
impl BatchConsumer<SmsRecord> for LoggingBatchConsumer {
    async fn on_batch_ready(&self, key: &str, events: Vec<Event<SmsRecord>>) -> ConsumerResult<()> {
        let summary = BatchSummary::from_events(key, &events);
        info!(
            key = %summary.key,
            count = summary.count,
            guids = ?summary.guids,
            span_ms = summary.span_ms,
            text = %summary.text,
            "batch ready"
        );
        Ok(())
    }
}
