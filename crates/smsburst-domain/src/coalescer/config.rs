//! Coalescer configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::admission::DEFAULT_ADMISSION_CAPACITY;
use crate::normalize::{IdentityNormalizer, KeyNormalizer};
use crate::scheduler::WindowPolicy;

/// Default window length.
pub const DEFAULT_WINDOW_DURATION: Duration = Duration::from_secs(60);

/// Configuration for a [`Coalescer`](super::Coalescer).
#[derive(Clone)]
pub struct CoalescerConfig {
    /// How long a window stays open.
    pub window_duration: Duration,
    /// Whether later events move the deadline.
    pub window_policy: WindowPolicy,
    /// Number of distinct event ids remembered for duplicate suppression.
    pub admission_cache_capacity: usize,
    /// Maps raw originator identifiers to grouping keys.
    pub key_normalizer: Arc<dyn KeyNormalizer>,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            window_duration: DEFAULT_WINDOW_DURATION,
            window_policy: WindowPolicy::Tumbling,
            admission_cache_capacity: DEFAULT_ADMISSION_CAPACITY,
            key_normalizer: Arc::new(IdentityNormalizer),
        }
    }
}

impl fmt::Debug for CoalescerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoalescerConfig")
            .field("window_duration", &self.window_duration)
            .field("window_policy", &self.window_policy)
            .field("admission_cache_capacity", &self.admission_cache_capacity)
            .field("key_normalizer", &self.key_normalizer)
            .finish()
    }
}

impl CoalescerConfig {
    /// Sets the window duration.
    pub fn with_window_duration(mut self, window_duration: Duration) -> Self {
        self.window_duration = window_duration;
        self
    }

    /// Sets the window policy.
    pub fn with_window_policy(mut self, window_policy: WindowPolicy) -> Self {
        self.window_policy = window_policy;
        self
    }

    /// Sets the admission cache capacity.
    pub fn with_admission_cache_capacity(mut self, capacity: usize) -> Self {
        self.admission_cache_capacity = capacity;
        self
    }

    /// Sets the key normalizer.
    pub fn with_key_normalizer(mut self, normalizer: impl KeyNormalizer + 'static) -> Self {
        self.key_normalizer = Arc::new(normalizer);
        self
    }
}
