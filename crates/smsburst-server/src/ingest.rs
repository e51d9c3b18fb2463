//! Line-oriented ingestion into a coalescer.

use smsburst_domain::{AdmissionResult, Coalescer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::inbound::{parse_line, SmsRecord};

/// Counter of input lines that did not parse as SMS records.
pub const INBOUND_MALFORMED_TOTAL: &str = "smsburst_inbound_malformed_total";

/// Counters for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: u64,
    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub malformed: u64,
}

/// Reads payloads from `reader` until EOF and submits every record.
///
/// Malformed lines and rejected records are logged and skipped; only I/O
/// errors end the run early.
pub async fn ingest_lines<R>(
    coalescer: &Coalescer<SmsRecord>,
    reader: R,
) -> std::io::Result<IngestStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = IngestStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        stats.lines += 1;

        let records = match parse_line(&line) {
            Ok(records) => records,
            Err(e) => {
                warn!(line = stats.lines, error = %e, "skipping malformed input");
                stats.malformed += 1;
                metrics::counter!(INBOUND_MALFORMED_TOTAL).increment(1);
                continue;
            }
        };

        for record in records {
            let number = record.number.clone();
            let guid = record.guid.clone();
            match coalescer.submit(&number, guid.as_str(), record) {
                Ok(AdmissionResult::Accepted) => stats.accepted += 1,
                Ok(AdmissionResult::Duplicate) => stats.duplicates += 1,
                Err(e) => {
                    warn!(number = %number, guid = %guid, error = %e, "record rejected");
                    stats.rejected += 1;
                }
            }
        }
    }

    debug!(?stats, "input exhausted");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use smsburst_domain::{
        BatchConsumer, CoalescerConfig, ConsumerResult, Event, PhoneNumberNormalizer,
    };
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Collect {
        batches: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl BatchConsumer<SmsRecord> for Collect {
        async fn on_batch_ready(
            &self,
            key: &str,
            events: Vec<Event<SmsRecord>>,
        ) -> ConsumerResult<()> {
            let guids = events.iter().map(|e| e.payload().guid.clone()).collect();
            self.batches.lock().unwrap().push((key.to_string(), guids));
            Ok(())
        }
    }

    fn coalescer(consumer: Arc<Collect>) -> Coalescer<SmsRecord> {
        Coalescer::new(
            CoalescerConfig::default()
                .with_window_duration(Duration::from_secs(60))
                .with_key_normalizer(PhoneNumberNormalizer::default()),
            consumer,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_counts_every_outcome() {
        let consumer = Arc::new(Collect::default());
        let coalescer = coalescer(consumer.clone());
        let input = concat!(
            r#"{"guid":"g1","number":"+63 912 345 6789","message":"yes"}"#,
            "\n",
            "{broken\n",
            "\n",
            r#"[{"guid":"g2","number":"09123456789","message":"I can"},{"guid":"g1","number":"09123456789","message":"yes"}]"#,
            "\n",
            r#"{"guid":"g3","number":"   ","message":"who?"}"#,
            "\n",
        );

        let stats = ingest_lines(&coalescer, input.as_bytes()).await.unwrap();

        assert_eq!(
            stats,
            IngestStats {
                lines: 5,
                accepted: 2,
                duplicates: 1,
                rejected: 1,
                malformed: 1,
            }
        );

        let pending = coalescer.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, "09123456789");
        assert_eq!(pending[0].count, 2);

        assert_eq!(coalescer.flush_all().await, 1);
        let batches = consumer.batches.lock().unwrap().clone();
        assert_eq!(
            batches,
            vec![(
                "09123456789".to_string(),
                vec!["g1".to_string(), "g2".to_string()]
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_empty_input() {
        let coalescer = coalescer(Arc::new(Collect::default()));
        let stats = ingest_lines(&coalescer, &b""[..]).await.unwrap();
        assert_eq!(stats, IngestStats::default());
    }
}
