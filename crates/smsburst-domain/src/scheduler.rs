//! Window timers.
//!
//! Every window gets exactly one timer, armed when the window is opened.
//! The timer sleeps until the window deadline, detaches the window from the
//! store and hands it to the dispatcher. New events never reset or cancel a
//! running timer; under the sliding policy they move the deadline stored on
//! the window and the same timer sleeps again when it wakes early.
//!
//! # Scheduling Faults
//!
//! If a timer task is torn down before it fires (for example the runtime is
//! shutting down, or no runtime was available to spawn on), the window stays
//! buffered and will never dispatch on its own. This is logged once as a
//! fatal condition for that key. The timer is not re-armed: a supervisor can
//! find such windows through [`KeyBufferStore::snapshot`] (`timer_active` is
//! false) and decide what to do.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::buffer::{AppendOutcome, KeyBufferStore, TakeOutcome};
use crate::dispatcher::Dispatcher;
use crate::telemetry;

/// How later events affect a window's deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowPolicy {
    /// The deadline is fixed at first event + window duration.
    #[default]
    Tumbling,
    /// Every event pushes the deadline to its arrival + window duration.
    Sliding,
}

impl fmt::Display for WindowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowPolicy::Tumbling => f.write_str("tumbling"),
            WindowPolicy::Sliding => f.write_str("sliding"),
        }
    }
}

impl FromStr for WindowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tumbling" => Ok(WindowPolicy::Tumbling),
            "sliding" | "debounce" => Ok(WindowPolicy::Sliding),
            other => Err(format!(
                "unknown window policy '{other}', expected 'tumbling' or 'sliding'"
            )),
        }
    }
}

/// Cancellation handle for an armed window timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    fn new(abort: AbortHandle) -> Self {
        Self { abort }
    }

    /// Stops the timer without firing.
    ///
    /// Only used once the timer's window has already been drained by other
    /// means; the coalescer never cancels a timer whose window is buffered.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// True once the timer task has completed, been cancelled or died.
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Arms one timer per window and runs the FIRING transition when it expires.
pub struct WindowScheduler<P> {
    store: Arc<KeyBufferStore<P>>,
    dispatcher: Arc<Dispatcher<P>>,
    runtime: Option<Handle>,
}

impl<P> WindowScheduler<P>
where
    P: Send + Sync + 'static,
{
    /// Creates a scheduler that spawns timers on the caller's current runtime.
    pub fn new(store: Arc<KeyBufferStore<P>>, dispatcher: Arc<Dispatcher<P>>) -> Self {
        Self {
            store,
            dispatcher,
            runtime: None,
        }
    }

    /// Spawns timers on `runtime` instead of the caller's current runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Arms a timer if `outcome` opened a new window.
    ///
    /// Appends to an existing window (ARMED → ARMED) leave its timer alone.
    pub fn ensure_timer(&self, key: &str, outcome: &AppendOutcome) {
        if !outcome.is_new_key {
            return;
        }

        match self.arm(key, outcome.window_id, outcome.deadline) {
            Some(timer) => {
                // The window may already have fired if the duration is tiny.
                self.store.attach_timer(key, outcome.window_id, timer);
            }
            None => {
                metrics::counter!(telemetry::SCHEDULING_FAULTS_TOTAL).increment(1);
                error!(
                    key = %key,
                    window_id = outcome.window_id,
                    "no async runtime available to arm window timer, batch will not dispatch"
                );
            }
        }
    }

    /// Spawns the timer for `window_id`, firing at `deadline`.
    ///
    /// Returns `None` if there is no runtime to spawn on.
    pub fn arm(&self, key: &str, window_id: u64, deadline: Instant) -> Option<TimerHandle> {
        let runtime = match &self.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().ok()?,
        };

        let task = run_window_timer(
            Arc::clone(&self.store),
            Arc::clone(&self.dispatcher),
            key.to_string(),
            window_id,
            deadline,
        );
        let join = runtime.spawn(task);
        debug!(key = %key, window_id, "window timer armed");
        Some(TimerHandle::new(join.abort_handle()))
    }
}

async fn run_window_timer<P>(
    store: Arc<KeyBufferStore<P>>,
    dispatcher: Arc<Dispatcher<P>>,
    key: String,
    window_id: u64,
    mut deadline: Instant,
) where
    P: Send + Sync + 'static,
{
    let mut guard = TimerGuard {
        store: Arc::clone(&store),
        key: key.clone(),
        window_id,
        settled: false,
    };

    loop {
        tokio::time::sleep_until(deadline).await;

        match store.take_if_due(&key, window_id, Instant::now()) {
            TakeOutcome::Drained(window) => {
                guard.settle();
                dispatcher.dispatch(&window.key, window.events).await;
                return;
            }
            TakeOutcome::NotDue(next) => {
                deadline = next;
            }
            TakeOutcome::Gone => {
                guard.settle();
                debug!(key = %key, window_id, "window already drained, timer exiting");
                return;
            }
        }
    }
}

/// Detects a timer task being dropped before its window fired.
struct TimerGuard<P> {
    store: Arc<KeyBufferStore<P>>,
    key: String,
    window_id: u64,
    settled: bool,
}

impl<P> TimerGuard<P> {
    fn settle(&mut self) {
        self.settled = true;
    }
}

impl<P> Drop for TimerGuard<P> {
    fn drop(&mut self) {
        // A cancelled timer whose window was drained elsewhere is not a fault.
        if !self.settled && self.store.contains_window(&self.key, self.window_id) {
            metrics::counter!(telemetry::SCHEDULING_FAULTS_TOTAL).increment(1);
            error!(
                key = %self.key,
                window_id = self.window_id,
                count = self.store.count(&self.key),
                "window timer torn down before firing, batch stranded"
            );
        }
    }
}
