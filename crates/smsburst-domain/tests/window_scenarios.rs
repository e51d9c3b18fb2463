//! End-to-end window timing scenarios.
//!
//! All tests run on a paused Tokio clock, so `sleep` advances virtual time
//! deterministically and timers fire at their exact deadlines.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use smsburst_domain::{
    AdmissionResult, BatchConsumer, Coalescer, CoalescerConfig, ConsumerResult, Event,
    WindowPolicy,
};

const W: Duration = Duration::from_secs(60);

/// A delivered batch with the virtual time (seconds since test start) it arrived.
#[derive(Debug, Clone, PartialEq)]
struct Delivery {
    key: String,
    ids: Vec<String>,
    at_secs: u64,
}

struct TimedConsumer {
    start: Instant,
    deliveries: Mutex<Vec<Delivery>>,
}

impl TimedConsumer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            deliveries: Mutex::new(Vec::new()),
        }
    }

    fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    fn for_key(&self, key: &str) -> Vec<Delivery> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.key == key)
            .collect()
    }
}

#[async_trait]
impl BatchConsumer<&'static str> for TimedConsumer {
    async fn on_batch_ready(
        &self,
        key: &str,
        events: Vec<Event<&'static str>>,
    ) -> ConsumerResult<()> {
        let delivery = Delivery {
            key: key.to_string(),
            ids: events.iter().map(|e| e.id().to_string()).collect(),
            at_secs: self.start.elapsed().as_secs(),
        };
        self.deliveries.lock().unwrap().push(delivery);
        Ok(())
    }
}

fn setup(policy: WindowPolicy) -> (Coalescer<&'static str>, Arc<TimedConsumer>) {
    let consumer = Arc::new(TimedConsumer::new());
    let config = CoalescerConfig::default()
        .with_window_duration(W)
        .with_window_policy(policy);
    (Coalescer::new(config, consumer.clone()), consumer)
}

/// Sleeps until `secs` seconds after the consumer's start instant.
async fn at(consumer: &TimedConsumer, secs: u64) {
    tokio::time::sleep_until(consumer.start + Duration::from_secs(secs)).await;
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn scenario_a_basic_batch_preserves_order() {
    let (coalescer, consumer) = setup(WindowPolicy::Tumbling);

    coalescer.submit("A", "m1", "first").unwrap();
    at(&consumer, 2).await;
    coalescer.submit("A", "m2", "second").unwrap();
    at(&consumer, 5).await;
    coalescer.submit("A", "m3", "third").unwrap();

    at(&consumer, 59).await;
    assert!(consumer.deliveries().is_empty());

    at(&consumer, 61).await;
    assert_eq!(
        consumer.deliveries(),
        vec![Delivery {
            key: "A".to_string(),
            ids: ids(&["m1", "m2", "m3"]),
            at_secs: 60,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_b_duplicate_is_reported_and_dropped() {
    let (coalescer, consumer) = setup(WindowPolicy::Tumbling);

    assert_eq!(
        coalescer.submit("A", "x1", "hello"),
        Ok(AdmissionResult::Accepted)
    );
    at(&consumer, 1).await;
    assert_eq!(
        coalescer.submit("A", "x1", "hello again"),
        Ok(AdmissionResult::Duplicate)
    );

    at(&consumer, 61).await;
    let deliveries = consumer.for_key("A");
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].ids, ids(&["x1"]));
}

#[tokio::test(start_paused = true)]
async fn scenario_c_keys_fire_independently() {
    let (coalescer, consumer) = setup(WindowPolicy::Tumbling);

    coalescer.submit("A", "a1", "from A").unwrap();
    at(&consumer, 10).await;
    coalescer.submit("B", "b1", "from B").unwrap();

    at(&consumer, 61).await;
    assert_eq!(consumer.for_key("A").len(), 1);
    assert_eq!(consumer.for_key("A")[0].at_secs, 60);
    assert!(consumer.for_key("B").is_empty());

    at(&consumer, 71).await;
    let b = consumer.for_key("B");
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].at_secs, 70);
    assert_eq!(b[0].ids, ids(&["b1"]));
}

#[tokio::test(start_paused = true)]
async fn scenario_d_tumbling_window_is_not_extended() {
    let (coalescer, consumer) = setup(WindowPolicy::Tumbling);

    coalescer.submit("A", "t0", "early").unwrap();
    at(&consumer, 59).await;
    coalescer.submit("A", "t59", "just in time").unwrap();
    at(&consumer, 61).await;
    coalescer.submit("A", "t61", "late").unwrap();

    at(&consumer, 122).await;
    let deliveries = consumer.for_key("A");
    assert_eq!(
        deliveries,
        vec![
            Delivery {
                key: "A".to_string(),
                ids: ids(&["t0", "t59"]),
                at_secs: 60,
            },
            Delivery {
                key: "A".to_string(),
                ids: ids(&["t61"]),
                at_secs: 121,
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn sliding_window_defers_until_quiet() {
    let (coalescer, consumer) = setup(WindowPolicy::Sliding);

    coalescer.submit("A", "t0", "early").unwrap();
    at(&consumer, 59).await;
    coalescer.submit("A", "t59", "keeps it open").unwrap();

    at(&consumer, 61).await;
    assert!(consumer.deliveries().is_empty());

    at(&consumer, 120).await;
    let deliveries = consumer.for_key("A");
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].ids, ids(&["t0", "t59"]));
    assert_eq!(deliveries[0].at_secs, 119);
}

#[tokio::test(start_paused = true)]
async fn many_events_within_window_arrive_in_submission_order() {
    let (coalescer, consumer) = setup(WindowPolicy::Tumbling);
    let n = 200;

    for i in 0..n {
        coalescer.submit("A", format!("m{i:03}"), "x").unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    at(&consumer, 61).await;
    let deliveries = consumer.for_key("A");
    assert_eq!(deliveries.len(), 1);
    let expected: Vec<String> = (0..n).map(|i| format!("m{i:03}")).collect();
    assert_eq!(deliveries[0].ids, expected);
}

#[tokio::test(start_paused = true)]
async fn failed_key_does_not_disturb_other_key() {
    struct Flaky {
        inner: TimedConsumer,
    }

    #[async_trait]
    impl BatchConsumer<&'static str> for Flaky {
        async fn on_batch_ready(
            &self,
            key: &str,
            events: Vec<Event<&'static str>>,
        ) -> ConsumerResult<()> {
            if key == "A" {
                panic!("classifier crashed for {key}");
            }
            self.inner.on_batch_ready(key, events).await
        }
    }

    let flaky = Arc::new(Flaky {
        inner: TimedConsumer::new(),
    });
    let coalescer = Coalescer::new(CoalescerConfig::default(), flaky.clone());

    coalescer.submit("A", "a1", "x").unwrap();
    coalescer.submit("B", "b1", "y").unwrap();
    coalescer.submit("B", "b2", "z").unwrap();

    at(&flaky.inner, 61).await;
    let b = flaky.inner.for_key("B");
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].ids, ids(&["b1", "b2"]));

    // The panicking key still accepts new windows
    assert_eq!(coalescer.submit("A", "a2", "x"), Ok(AdmissionResult::Accepted));
    assert_eq!(coalescer.pending().len(), 1);
}
