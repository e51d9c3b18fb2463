//! Per-key window store.
//!
//! Each key with at least one undispatched event owns exactly one window in
//! the store. A window is only ever appended to or removed in full; callers
//! never observe a partially drained window.
//!
//! # Window Lifecycle
//!
//! ```text
//! absent ──first event──▶ ARMED ──more events──▶ ARMED
//!                           │
//!                     timer due (atomic detach)
//!                           ▼
//!                     FIRING (FiredWindow) ──dispatch──▶ absent
//! ```
//!
//! An ARMED window lives in the map. Firing removes it from the map in the
//! same critical section that checks the deadline, so a concurrent append
//! either lands in the detached batch or opens a brand-new window. A
//! [`FiredWindow`] is never reachable from the map and cannot be appended to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

use crate::event::Event;
use crate::scheduler::{TimerHandle, WindowPolicy};
use crate::telemetry;

/// Deadline horizon used when `arrival + window_duration` is unrepresentable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A buffered window for one key (the ARMED state).
struct KeyWindow<P> {
    window_id: u64,
    events: Vec<Event<P>>,
    timer: Option<TimerHandle>,
    opened_at: Instant,
    deadline: Instant,
}

impl<P> KeyWindow<P> {
    fn cancel_timer(&self) {
        if let Some(timer) = &self.timer {
            timer.cancel();
        }
    }
}

/// A window detached from the store for dispatch (the FIRING state).
#[derive(Debug)]
pub struct FiredWindow<P> {
    pub key: String,
    pub window_id: u64,
    pub opened_at: Instant,
    pub events: Vec<Event<P>>,
}

/// Result of [`KeyBufferStore::append_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// True if this event opened a new window for its key.
    pub is_new_key: bool,
    /// Number of events buffered for the key after the append.
    pub count: usize,
    /// Generation number of the window the event joined.
    pub window_id: u64,
    /// Current deadline of that window.
    pub deadline: Instant,
}

/// Result of [`KeyBufferStore::take_if_due`].
#[derive(Debug)]
pub enum TakeOutcome<P> {
    /// The window was due and has been detached.
    Drained(FiredWindow<P>),
    /// The window still exists but its deadline moved to the given instant.
    NotDue(Instant),
    /// The window was already drained (or replaced by a newer one).
    Gone,
}

/// Read-only view of a buffered window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub key: String,
    pub window_id: u64,
    pub count: usize,
    pub opened_at: Instant,
    pub deadline: Instant,
    /// False if the window has no live timer (never armed, or its timer task
    /// ended without firing). Such a window will not dispatch on its own.
    pub timer_active: bool,
}

/// Map from key to its buffered window.
///
/// # Thread Safety
///
/// Every mutation for a key runs inside a single `DashMap` entry lock, which
/// serializes concurrent operations on the same key while leaving other keys
/// (on other shards) untouched. No lock is held across an await point or a
/// consumer call.
pub struct KeyBufferStore<P> {
    windows: DashMap<String, KeyWindow<P>>,
    window_duration: Duration,
    policy: WindowPolicy,
    next_window_id: AtomicU64,
    next_arrival: AtomicU64,
}

impl<P> std::fmt::Debug for KeyBufferStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBufferStore")
            .field("window_duration", &self.window_duration)
            .field("policy", &self.policy)
            .field("pending_windows", &self.windows.len())
            .finish()
    }
}

impl<P> KeyBufferStore<P> {
    /// Creates an empty store whose windows last `window_duration`.
    pub fn new(window_duration: Duration, policy: WindowPolicy) -> Self {
        Self {
            windows: DashMap::new(),
            window_duration,
            policy,
            next_window_id: AtomicU64::new(1),
            next_arrival: AtomicU64::new(1),
        }
    }

    pub fn window_duration(&self) -> Duration {
        self.window_duration
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    /// Appends `event` to its key's window, creating the window if absent.
    ///
    /// The event is stamped with its arrival order inside the key's critical
    /// section. A new window's deadline is measured from this event's
    /// arrival. Under [`WindowPolicy::Sliding`] every append also pushes the
    /// deadline out to `arrival + window_duration`.
    pub fn append_or_create(&self, mut event: Event<P>) -> AppendOutcome {
        let arrived = event.received_at();
        let extended = self.deadline_from(arrived);

        match self.windows.entry(event.key().to_string()) {
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                event.stamp(self.next_arrival.fetch_add(1, Ordering::Relaxed));
                window.events.push(event);
                if self.policy == WindowPolicy::Sliding && extended > window.deadline {
                    window.deadline = extended;
                }
                AppendOutcome {
                    is_new_key: false,
                    count: window.events.len(),
                    window_id: window.window_id,
                    deadline: window.deadline,
                }
            }
            Entry::Vacant(entry) => {
                let window_id = self.next_window_id.fetch_add(1, Ordering::Relaxed);
                event.stamp(self.next_arrival.fetch_add(1, Ordering::Relaxed));
                entry.insert(KeyWindow {
                    window_id,
                    events: vec![event],
                    timer: None,
                    opened_at: arrived,
                    deadline: extended,
                });
                metrics::counter!(telemetry::WINDOWS_OPENED_TOTAL).increment(1);
                metrics::gauge!(telemetry::PENDING_WINDOWS).increment(1.0);
                AppendOutcome {
                    is_new_key: true,
                    count: 1,
                    window_id,
                    deadline: extended,
                }
            }
        }
    }

    // Saturates instead of panicking on very large window durations.
    fn deadline_from(&self, arrived: Instant) -> Instant {
        arrived
            .checked_add(self.window_duration)
            .or_else(|| arrived.checked_add(FAR_FUTURE))
            .unwrap_or(arrived)
    }

    /// Stores the timer armed for `window_id`.
    ///
    /// Returns false if that window is no longer buffered (it may already have
    /// fired); the handle is dropped in that case.
    pub fn attach_timer(&self, key: &str, window_id: u64, timer: TimerHandle) -> bool {
        match self.windows.get_mut(key) {
            Some(mut window) if window.window_id == window_id => {
                window.timer = Some(timer);
                true
            }
            _ => false,
        }
    }

    /// Atomically removes and returns every event buffered for `key`.
    ///
    /// Returns an empty vector if no window exists, so calling it twice in a
    /// row is safe. Any timer still armed for the removed window is cancelled.
    pub fn take_and_clear(&self, key: &str) -> Vec<Event<P>> {
        match self.windows.remove(key) {
            Some((_, window)) => {
                window.cancel_timer();
                metrics::gauge!(telemetry::PENDING_WINDOWS).decrement(1.0);
                window.events
            }
            None => Vec::new(),
        }
    }

    /// Detaches the window `window_id` for `key` if its deadline has passed.
    ///
    /// This is the ARMED → FIRING transition. The generation check and the
    /// removal happen under one entry lock, so a timer can never drain a
    /// window it was not armed for.
    pub fn take_if_due(&self, key: &str, window_id: u64, now: Instant) -> TakeOutcome<P> {
        match self.windows.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().window_id == window_id => {
                if entry.get().deadline > now {
                    return TakeOutcome::NotDue(entry.get().deadline);
                }
                let (key, window) = entry.remove_entry();
                metrics::gauge!(telemetry::PENDING_WINDOWS).decrement(1.0);
                trace!(key = %key, window_id, count = window.events.len(), "window firing");
                TakeOutcome::Drained(FiredWindow {
                    key,
                    window_id,
                    opened_at: window.opened_at,
                    events: window.events,
                })
            }
            _ => TakeOutcome::Gone,
        }
    }

    /// Detaches every buffered window regardless of deadline.
    ///
    /// Timers armed for the removed windows are cancelled.
    pub fn drain_all(&self) -> Vec<FiredWindow<P>> {
        let keys: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        let mut drained = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((key, window)) = self.windows.remove(&key) {
                window.cancel_timer();
                metrics::gauge!(telemetry::PENDING_WINDOWS).decrement(1.0);
                drained.push(FiredWindow {
                    key,
                    window_id: window.window_id,
                    opened_at: window.opened_at,
                    events: window.events,
                });
            }
        }
        drained
    }

    /// Returns true if `window_id` is still the buffered window for `key`.
    pub fn contains_window(&self, key: &str, window_id: u64) -> bool {
        self.windows
            .get(key)
            .is_some_and(|window| window.window_id == window_id)
    }

    /// Number of events buffered for `key` (zero if absent).
    pub fn count(&self, key: &str) -> usize {
        self.windows.get(key).map_or(0, |window| window.events.len())
    }

    /// Snapshot of every buffered window, in no particular order.
    pub fn snapshot(&self) -> Vec<WindowSnapshot> {
        self.windows
            .iter()
            .map(|entry| {
                let window = entry.value();
                WindowSnapshot {
                    key: entry.key().clone(),
                    window_id: window.window_id,
                    count: window.events.len(),
                    opened_at: window.opened_at,
                    deadline: window.deadline,
                    timer_active: window.timer.as_ref().is_some_and(|t| !t.is_finished()),
                }
            })
            .collect()
    }

    /// Keys with a buffered window.
    pub fn keys(&self) -> Vec<String> {
        self.windows.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
