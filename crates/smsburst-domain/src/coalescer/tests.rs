//! Tests for the coalescer.

use super::*;
use crate::dispatcher::BatchConsumer;
use crate::error::{ConsumerError, ConsumerResult, SubmitError};
use crate::event::{AdmissionResult, Event};
use crate::normalize::PhoneNumberNormalizer;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================
// Test Mocks
// ============================================================

/// Records every batch it receives; fails for keys listed in `failing_keys`.
#[derive(Default)]
struct RecordingConsumer {
    batches: Mutex<Vec<(String, Vec<String>)>>,
    failing_keys: Vec<String>,
}

impl RecordingConsumer {
    fn failing_for(keys: &[&str]) -> Self {
        Self {
            failing_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    fn batches(&self) -> Vec<(String, Vec<String>)> {
        self.batches.lock().unwrap().clone()
    }

    fn batch_for(&self, key: &str) -> Option<Vec<String>> {
        self.batches()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, ids)| ids)
    }
}

#[async_trait]
impl BatchConsumer<String> for RecordingConsumer {
    async fn on_batch_ready(&self, key: &str, events: Vec<Event<String>>) -> ConsumerResult<()> {
        let ids = events.iter().map(|e| e.id().to_string()).collect();
        self.batches.lock().unwrap().push((key.to_string(), ids));
        if self.failing_keys.iter().any(|k| k == key) {
            return Err(ConsumerError::rejected(format!("cannot handle {key}")));
        }
        Ok(())
    }
}

const W: Duration = Duration::from_secs(60);

fn create_test_coalescer() -> (Coalescer<String>, Arc<RecordingConsumer>) {
    let consumer = Arc::new(RecordingConsumer::default());
    let coalescer = Coalescer::new(
        CoalescerConfig::default().with_window_duration(W),
        consumer.clone(),
    );
    (coalescer, consumer)
}

// ============================================================
// Section 1: Input Validation
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_blank_id_is_rejected() {
    let (coalescer, _) = create_test_coalescer();

    let result = coalescer.submit("A", "  ", "hello".to_string());

    assert_eq!(result, Err(SubmitError::EmptyId));
    assert!(coalescer.pending().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_blank_key_is_rejected_without_consuming_id() {
    let (coalescer, _) = create_test_coalescer();

    let result = coalescer.submit("   ", "m1", "hello".to_string());
    assert!(matches!(result, Err(SubmitError::EmptyKey { .. })));

    // The id was not recorded, so a valid retry is accepted
    let retry = coalescer.submit("A", "m1", "hello".to_string());
    assert_eq!(retry, Ok(AdmissionResult::Accepted));
}

// ============================================================
// Section 2: Admission
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_duplicate_id_never_reaches_batch() {
    let (coalescer, consumer) = create_test_coalescer();

    assert_eq!(
        coalescer.submit("A", "x1", "first".to_string()),
        Ok(AdmissionResult::Accepted)
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        coalescer.submit("A", "x1", "retry".to_string()),
        Ok(AdmissionResult::Duplicate)
    );

    tokio::time::sleep(W).await;
    assert_eq!(consumer.batch_for("A"), Some(vec!["x1".to_string()]));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_across_keys_is_rejected() {
    let (coalescer, consumer) = create_test_coalescer();

    coalescer.submit("A", "shared", "a".to_string()).unwrap();
    let second = coalescer.submit("B", "shared", "b".to_string()).unwrap();

    assert_eq!(second, AdmissionResult::Duplicate);
    tokio::time::sleep(W + Duration::from_secs(1)).await;
    assert_eq!(consumer.batches().len(), 1);
    assert_eq!(consumer.batch_for("B"), None);
}

#[tokio::test(start_paused = true)]
async fn test_evicted_id_becomes_admittable() {
    let consumer = Arc::new(RecordingConsumer::default());
    let capacity = 3;
    let coalescer = Coalescer::new(
        CoalescerConfig::default().with_admission_cache_capacity(capacity),
        consumer.clone(),
    );

    for i in 0..=capacity {
        coalescer
            .submit("A", format!("id-{i}"), String::new())
            .unwrap();
    }

    assert_eq!(
        coalescer.submit("A", "id-0", String::new()),
        Ok(AdmissionResult::Accepted)
    );
    for i in 2..=capacity {
        assert_eq!(
            coalescer.submit("A", format!("id-{i}"), String::new()),
            Ok(AdmissionResult::Duplicate),
            "id-{i} must not be evicted early"
        );
    }
}

// ============================================================
// Section 3: Normalization
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_normalized_keys_share_a_window() {
    let consumer = Arc::new(RecordingConsumer::default());
    let coalescer = Coalescer::new(
        CoalescerConfig::default().with_key_normalizer(PhoneNumberNormalizer::default()),
        consumer.clone(),
    );

    coalescer
        .submit("+63 912 345 6789", "m1", "yes".to_string())
        .unwrap();
    coalescer
        .submit("09123456789", "m2", "I can".to_string())
        .unwrap();

    let pending = coalescer.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key, "09123456789");
    assert_eq!(pending[0].count, 2);

    tokio::time::sleep(W + Duration::from_secs(1)).await;
    assert_eq!(
        consumer.batch_for("09123456789"),
        Some(vec!["m1".to_string(), "m2".to_string()])
    );
}

// ============================================================
// Section 4: Dispatch and Fault Isolation
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_consumer_failure_does_not_affect_other_keys() {
    let consumer = Arc::new(RecordingConsumer::failing_for(&["A"]));
    let coalescer = Coalescer::new(CoalescerConfig::default(), consumer.clone());

    coalescer.submit("A", "a1", String::new()).unwrap();
    coalescer.submit("B", "b1", String::new()).unwrap();
    coalescer.submit("B", "b2", String::new()).unwrap();

    tokio::time::sleep(W + Duration::from_secs(1)).await;

    assert_eq!(consumer.batch_for("A"), Some(vec!["a1".to_string()]));
    assert_eq!(
        consumer.batch_for("B"),
        Some(vec!["b1".to_string(), "b2".to_string()])
    );
    assert_eq!(consumer.batches().len(), 2, "failed batch is not retried");

    // The failed key accepts new events into a fresh window
    coalescer.submit("A", "a2", String::new()).unwrap();
    assert_eq!(coalescer.buffer_store().count("A"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_all_dispatches_pending_windows_once() {
    let (coalescer, consumer) = create_test_coalescer();

    coalescer.submit("A", "a1", String::new()).unwrap();
    coalescer.submit("B", "b1", String::new()).unwrap();

    let flushed = coalescer.flush_all().await;
    assert_eq!(flushed, 2);
    assert!(coalescer.pending().is_empty());

    // The cancelled timers must not dispatch again
    tokio::time::sleep(W * 2).await;
    assert_eq!(consumer.batches().len(), 2);
    assert_eq!(coalescer.flush_all().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submitters_across_many_keys() {
    let consumer = Arc::new(RecordingConsumer::default());
    let coalescer = Arc::new(Coalescer::new(
        CoalescerConfig::default()
            .with_window_duration(Duration::from_millis(200))
            .with_admission_cache_capacity(10_000),
        consumer.clone(),
    ));

    let keys = 20;
    let per_key = 25;
    let tasks: Vec<_> = (0..keys)
        .map(|k| {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move {
                for i in 0..per_key {
                    coalescer
                        .submit(&format!("key-{k}"), format!("{k}-{i}"), String::new())
                        .unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(600)).await;

    let batches = consumer.batches();
    assert_eq!(batches.len(), keys);
    for (key, ids) in batches {
        let k = key.trim_start_matches("key-");
        let expected: Vec<String> = (0..per_key).map(|i| format!("{k}-{i}")).collect();
        assert_eq!(ids, expected, "batch for {key} must keep submission order");
    }
}

// ============================================================
// Section 5: Runtime Binding
// ============================================================

#[test]
fn test_with_runtime_arms_timers_from_plain_threads() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .build()
        .unwrap();
    let consumer = Arc::new(RecordingConsumer::default());
    let coalescer = Coalescer::new(
        CoalescerConfig::default().with_window_duration(Duration::from_millis(50)),
        consumer.clone(),
    )
    .with_runtime(runtime.handle().clone());

    coalescer.submit("A", "a1", String::new()).unwrap();
    assert!(coalescer.pending()[0].timer_active);

    runtime.block_on(async { tokio::time::sleep(Duration::from_millis(300)).await });
    assert_eq!(consumer.batch_for("A"), Some(vec!["a1".to_string()]));
}

#[test]
fn test_submit_without_runtime_leaves_window_unarmed() {
    let (coalescer, consumer) = create_test_coalescer();

    let result = coalescer.submit("A", "a1", String::new());

    assert_eq!(result, Ok(AdmissionResult::Accepted));
    let pending = coalescer.pending();
    assert_eq!(pending.len(), 1);
    assert!(!pending[0].timer_active);
    assert!(consumer.batches().is_empty());
}

// ============================================================
// Section 6: Firing Races and Limits
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submits_racing_window_firing_land_in_exactly_one_batch() {
    let consumer = Arc::new(RecordingConsumer::default());
    let coalescer = Arc::new(Coalescer::new(
        CoalescerConfig::default()
            .with_window_duration(Duration::from_millis(2))
            .with_admission_cache_capacity(100_000),
        consumer.clone(),
    ));

    let submitters = 8;
    let per_submitter = 3000;
    let tasks: Vec<_> = (0..submitters)
        .map(|t| {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move {
                for i in 0..per_submitter {
                    let result = coalescer.submit("K", format!("{t}-{i}"), String::new());
                    assert_eq!(result, Ok(AdmissionResult::Accepted));
                    if i % 100 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    coalescer.flush_all().await;

    let batches = consumer.batches();
    assert!(batches.len() > 1, "window should have fired repeatedly");

    let delivered: Vec<String> = batches.into_iter().flat_map(|(_, ids)| ids).collect();
    let distinct: std::collections::HashSet<&String> = delivered.iter().collect();
    assert_eq!(distinct.len(), delivered.len(), "an id was delivered twice");
    assert_eq!(delivered.len(), submitters * per_submitter, "an id was lost");
}

#[tokio::test(start_paused = true)]
async fn test_huge_window_duration_does_not_panic_submit() {
    let consumer = Arc::new(RecordingConsumer::default());
    let coalescer = Coalescer::new(
        CoalescerConfig::default().with_window_duration(Duration::from_secs(u64::MAX)),
        consumer.clone(),
    );

    assert_eq!(
        coalescer.submit("A", "m1", String::new()),
        Ok(AdmissionResult::Accepted)
    );
    assert_eq!(coalescer.pending().len(), 1);
    assert_eq!(coalescer.flush_all().await, 1);
    assert_eq!(consumer.batch_for("A"), Some(vec!["m1".to_string()]));
}
