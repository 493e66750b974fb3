//! Metrics instrumentation for the queue and dispatch pipeline.
//!
//! Emits through the `metrics` facade; the embedding application installs
//! whatever recorder it wants (Prometheus exporter, logging recorder, none).

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

/// Register metric descriptions with the installed recorder. Optional;
/// emission works without it.
pub fn init_metrics() {
    describe_counter!("grid_jobs_queued_total", Unit::Count, "Jobs admitted to the queue");
    describe_counter!("grid_jobs_ended_total", Unit::Count, "Jobs that left the system");
    describe_counter!("grid_dispatches_total", Unit::Count, "Bundles dispatched to channels");
    describe_counter!("grid_tasks_dispatched_total", Unit::Count, "Tasks dispatched to channels");
    describe_counter!("grid_returns_total", Unit::Count, "Bundles returned from channels");
    describe_counter!("grid_tasks_returned_total", Unit::Count, "Tasks returned from channels");
    describe_counter!(
        "grid_events_delivered_total",
        Unit::Count,
        "Job notifications delivered to listeners"
    );
    describe_counter!(
        "grid_events_dropped_total",
        Unit::Count,
        "Job notifications shed under overflow"
    );
    describe_gauge!("grid_queue_depth", Unit::Count, "Jobs currently in the priority order");
}

pub fn record_job_queued() {
    counter!("grid_jobs_queued_total").increment(1);
}

pub fn record_job_ended() {
    counter!("grid_jobs_ended_total").increment(1);
}

pub fn record_dispatch(task_count: usize) {
    counter!("grid_dispatches_total").increment(1);
    counter!("grid_tasks_dispatched_total").increment(task_count as u64);
}

pub fn record_return(task_count: usize) {
    counter!("grid_returns_total").increment(1);
    counter!("grid_tasks_returned_total").increment(task_count as u64);
}

pub fn record_event_delivered() {
    counter!("grid_events_delivered_total").increment(1);
}

pub fn record_event_dropped() {
    counter!("grid_events_dropped_total").increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("grid_queue_depth").set(depth as f64);
}
