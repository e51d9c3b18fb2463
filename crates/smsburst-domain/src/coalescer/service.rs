//! Coalescer implementation.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};

use crate::admission::{AdmissionCache, AdmissionDecision};
use crate::buffer::{KeyBufferStore, WindowSnapshot};
use crate::dispatcher::{BatchConsumer, DispatchOutcome, Dispatcher};
use crate::error::{SubmitError, SubmitResult};
use crate::event::{AdmissionResult, Event, EventId};
use crate::scheduler::WindowScheduler;

use super::config::CoalescerConfig;

/// Groups events per key into time windows and dispatches each window once.
///
/// The admission cache, buffer store and dispatcher are explicit shared
/// objects owned by the coalescer; each timer task holds its own handle to
/// the store and dispatcher.
pub struct Coalescer<P> {
    config: CoalescerConfig,
    admission: Arc<AdmissionCache>,
    store: Arc<KeyBufferStore<P>>,
    dispatcher: Arc<Dispatcher<P>>,
    scheduler: WindowScheduler<P>,
}

impl<P> Coalescer<P>
where
    P: Send + Sync + 'static,
{
    /// Creates a coalescer that hands completed windows to `consumer`.
    ///
    /// Timers are spawned on the Tokio runtime current at `submit` time.
    pub fn new(config: CoalescerConfig, consumer: Arc<dyn BatchConsumer<P>>) -> Self {
        let admission = Arc::new(AdmissionCache::new(config.admission_cache_capacity));
        let store = Arc::new(KeyBufferStore::new(
            config.window_duration,
            config.window_policy,
        ));
        let dispatcher = Arc::new(Dispatcher::new(consumer));
        let scheduler = WindowScheduler::new(Arc::clone(&store), Arc::clone(&dispatcher));

        Self {
            config,
            admission,
            store,
            dispatcher,
            scheduler,
        }
    }

    /// Spawns window timers on `runtime` rather than the submitter's runtime.
    pub fn with_runtime(mut self, runtime: tokio::runtime::Handle) -> Self {
        self.scheduler = self.scheduler.with_runtime(runtime);
        self
    }

    /// Submits one event.
    ///
    /// Returns [`AdmissionResult::Duplicate`] if `id` is still remembered by
    /// the admission cache; the payload is dropped in that case. Otherwise
    /// the event joins the window for the normalized key, opening and arming
    /// a new window if none is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] if the id is blank or the key normalizes to an
    /// empty string. Rejected events do not consume an admission slot.
    pub fn submit(
        &self,
        raw_key: &str,
        id: impl Into<EventId>,
        payload: P,
    ) -> SubmitResult<AdmissionResult> {
        let id = id.into();
        if id.is_blank() {
            return Err(SubmitError::EmptyId);
        }

        let key = self.config.key_normalizer.normalize(raw_key);
        if key.trim().is_empty() {
            return Err(SubmitError::EmptyKey {
                raw: raw_key.to_string(),
            });
        }

        match self.admission.admit(&id) {
            AdmissionDecision::Duplicate => {
                info!(key = %key, event_id = %id, "duplicate event ignored");
                return Ok(AdmissionResult::Duplicate);
            }
            AdmissionDecision::Admitted { .. } => {}
        }

        let event_id = id.clone();
        let outcome = self.store.append_or_create(Event::new(id, key.clone(), payload));
        self.scheduler.ensure_timer(&key, &outcome);

        debug!(
            key = %key,
            event_id = %event_id,
            window_id = outcome.window_id,
            count = outcome.count,
            new_window = outcome.is_new_key,
            "event buffered"
        );

        Ok(AdmissionResult::Accepted)
    }

    /// Dispatches every buffered window immediately.
    ///
    /// Intended for graceful shutdown. Each window is delivered at most once:
    /// its timer is cancelled after the window is detached. Returns the number
    /// of windows handed to the consumer.
    pub async fn flush_all(&self) -> usize {
        let windows = self.store.drain_all();
        if windows.is_empty() {
            return 0;
        }

        info!(windows = windows.len(), "flushing pending windows");
        let dispatches = windows
            .into_iter()
            .map(|window| {
                let dispatcher = Arc::clone(&self.dispatcher);
                async move { dispatcher.dispatch(&window.key, window.events).await }
            })
            .collect::<Vec<_>>();

        join_all(dispatches)
            .await
            .into_iter()
            .filter(|outcome| !matches!(outcome, DispatchOutcome::Empty))
            .count()
    }

    /// Snapshot of every buffered window.
    pub fn pending(&self) -> Vec<WindowSnapshot> {
        self.store.snapshot()
    }

    pub fn config(&self) -> &CoalescerConfig {
        &self.config
    }

    pub fn admission_cache(&self) -> &Arc<AdmissionCache> {
        &self.admission
    }

    pub fn buffer_store(&self) -> &Arc<KeyBufferStore<P>> {
        &self.store
    }
}
