//! Bounded duplicate suppression for inbound event ids.
//!
//! Providers retry webhook deliveries, so the same event id can arrive more
//! than once. The admission cache remembers the last `capacity` distinct ids
//! in insertion order and rejects any id it still holds.
//!
//! # Bounded Memory Tradeoff
//!
//! The cache never reports a false duplicate: an id is rejected only if it
//! was genuinely admitted before. It *can* miss a duplicate: once more than
//! `capacity` distinct ids have been admitted, the oldest ids are evicted
//! (FIFO) and become admittable again. Callers that need stronger guarantees
//! must size the capacity to cover the provider's retry horizon.
//!
//! # Performance Characteristics
//!
//! - **Lookup**: O(1) expected (hash set)
//! - **Insert**: O(1) amortized (hash set + ring buffer)
//! - **Evict**: O(1) (pop front of the ring buffer)

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tracing::info;

use crate::event::EventId;
use crate::telemetry;

/// Default number of distinct ids remembered.
pub const DEFAULT_ADMISSION_CAPACITY: usize = 1000;

/// Result of an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The id was new and is now recorded.
    ///
    /// `evicted` is the oldest id pushed out to make room, if the cache was
    /// full. It is reported so capacity pressure can be told apart from real
    /// duplicates in logs.
    Admitted { evicted: Option<EventId> },
    /// The id is still resident; nothing was changed.
    Duplicate,
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admitted { .. })
    }
}

#[derive(Debug, Default)]
struct AdmissionState {
    seen: HashSet<EventId>,
    order: VecDeque<EventId>,
}

/// Fixed-capacity, insertion-ordered set of previously seen event ids.
///
/// # Thread Safety
///
/// All operations take a single short-held mutex; nothing blocking happens
/// while it is held. The cache can be shared behind an `Arc`.
#[derive(Debug)]
pub struct AdmissionCache {
    capacity: usize,
    state: Mutex<AdmissionState>,
}

impl AdmissionCache {
    /// Creates a cache remembering at most `capacity` ids.
    ///
    /// A capacity of zero is raised to one so the most recent id is always
    /// remembered.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(AdmissionState {
                seen: HashSet::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Records `id` if it is not already present.
    ///
    /// Returns `true` when the id was admitted and `false` for a duplicate.
    pub fn try_admit(&self, id: &EventId) -> bool {
        self.admit(id).is_admitted()
    }

    /// Records `id` if it is not already present, reporting any eviction.
    pub fn admit(&self, id: &EventId) -> AdmissionDecision {
        let mut state = self.lock();

        if state.seen.contains(id) {
            metrics::counter!(telemetry::EVENTS_DUPLICATE_TOTAL).increment(1);
            return AdmissionDecision::Duplicate;
        }

        let evicted = if state.order.len() >= self.capacity {
            let oldest = state.order.pop_front();
            if let Some(ref oldest) = oldest {
                state.seen.remove(oldest);
            }
            oldest
        } else {
            None
        };

        state.seen.insert(id.clone());
        state.order.push_back(id.clone());
        drop(state);

        if let Some(ref evicted_id) = evicted {
            metrics::counter!(telemetry::ADMISSION_EVICTIONS_TOTAL).increment(1);
            info!(
                evicted_id = %evicted_id,
                admitted_id = %id,
                capacity = self.capacity,
                "admission cache full, evicted oldest id"
            );
        }
        metrics::counter!(telemetry::EVENTS_ADMITTED_TOTAL).increment(1);

        AdmissionDecision::Admitted { evicted }
    }

    /// Returns true if `id` is currently resident.
    pub fn contains(&self, id: &EventId) -> bool {
        self.lock().seen.contains(id)
    }

    /// Number of ids currently resident.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forgets every remembered id.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.seen.clear();
        state.order.clear();
    }

    // Bookkeeping cannot leave the state half-updated across a panic, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for AdmissionCache {
    fn default() -> Self {
        Self::new(DEFAULT_ADMISSION_CAPACITY)
    }
}
