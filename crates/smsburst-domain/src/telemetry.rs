//! Metric names recorded by the coalescer.
//!
//! Recording goes through the `metrics` facade; installing an exporter is the
//! binary's job. Without a recorder every call is a no-op.

/// Events admitted past the duplicate check.
pub const EVENTS_ADMITTED_TOTAL: &str = "smsburst_events_admitted_total";
/// Events rejected as duplicates.
pub const EVENTS_DUPLICATE_TOTAL: &str = "smsburst_events_duplicate_total";
/// Ids pushed out of the admission cache by capacity.
pub const ADMISSION_EVICTIONS_TOTAL: &str = "smsburst_admission_evictions_total";
/// Windows opened (first event for an absent key).
pub const WINDOWS_OPENED_TOTAL: &str = "smsburst_windows_opened_total";
/// Batches handed to the consumer, labelled by `outcome`.
pub const BATCHES_DISPATCHED_TOTAL: &str = "smsburst_batches_dispatched_total";
/// Number of events per dispatched batch.
pub const BATCH_SIZE: &str = "smsburst_batch_size";
/// Consumer errors and panics.
pub const CONSUMER_FAILURES_TOTAL: &str = "smsburst_consumer_failures_total";
/// Window timers torn down before firing.
pub const SCHEDULING_FAULTS_TOTAL: &str = "smsburst_scheduling_faults_total";
/// Windows currently buffered.
pub const PENDING_WINDOWS: &str = "smsburst_pending_windows";

/// Registers descriptions for every coalescer metric.
pub fn describe_metrics() {
    metrics::describe_counter!(
        EVENTS_ADMITTED_TOTAL,
        "Total number of events admitted for batching"
    );
    metrics::describe_counter!(
        EVENTS_DUPLICATE_TOTAL,
        "Total number of events rejected as duplicates"
    );
    metrics::describe_counter!(
        ADMISSION_EVICTIONS_TOTAL,
        "Total number of ids evicted from the admission cache by capacity"
    );
    metrics::describe_counter!(WINDOWS_OPENED_TOTAL, "Total number of batch windows opened");
    metrics::describe_counter!(
        BATCHES_DISPATCHED_TOTAL,
        "Total number of batches dispatched by outcome"
    );
    metrics::describe_histogram!(BATCH_SIZE, "Number of events per dispatched batch");
    metrics::describe_counter!(
        CONSUMER_FAILURES_TOTAL,
        "Total number of batches whose consumer failed or panicked"
    );
    metrics::describe_counter!(
        SCHEDULING_FAULTS_TOTAL,
        "Total number of window timers torn down before firing"
    );
    metrics::describe_gauge!(PENDING_WINDOWS, "Number of windows currently buffered");
}
