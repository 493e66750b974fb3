//! Timer management for job start delays and expiration deadlines.
//!
//! Each schedule becomes one sleeping task. Timers are torn down when the
//! job leaves the queue, so a completed job never fires a stale expiration.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatch::DispatchTracker;
use crate::job::ServerJob;

#[derive(Default)]
struct JobTimers {
    start: Option<JoinHandle<()>>,
    expiration: Option<JoinHandle<()>>,
}

impl JobTimers {
    fn abort(&self) {
        if let Some(handle) = &self.start {
            handle.abort();
        }
        if let Some(handle) = &self.expiration {
            handle.abort();
        }
    }
}

/// Arms and disarms the per-job start and expiration timers.
pub struct ScheduleManager {
    tracker: Arc<DispatchTracker>,
    timers: DashMap<Uuid, JobTimers>,
}

impl ScheduleManager {
    pub fn new(tracker: Arc<DispatchTracker>) -> Self {
        Self { tracker, timers: DashMap::new() }
    }

    /// Arm the start timer if the job's SLA carries a start schedule. The job
    /// is pending (not dispatchable) until the delay elapses, at which point
    /// an update event announces the flip.
    pub fn handle_start_schedule(&self, job: &Arc<ServerJob>) {
        let Some(schedule) = job.sla().start_schedule else {
            return;
        };
        job.set_pending(true);
        let uuid = job.uuid();
        let job = Arc::clone(job);
        let tracker = Arc::clone(&self.tracker);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(schedule.delay).await;
            if job.is_done() {
                return;
            }
            debug!(job = %uuid, "start schedule elapsed; job now dispatchable");
            job.set_pending(false);
            tracker.job_updated(&job).await;
        });
        self.timers.entry(uuid).or_default().start = Some(handle);
    }

    /// Arm the expiration timer if the job's SLA carries one. On expiry the
    /// job is force-cancelled; its completion callbacks take it out of the
    /// queue.
    pub fn handle_expiration_schedule(&self, job: &Arc<ServerJob>) {
        let Some(schedule) = job.sla().expiration_schedule else {
            return;
        };
        let uuid = job.uuid();
        let job = Arc::clone(job);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(schedule.delay).await;
            if job.is_done() {
                return;
            }
            warn!(job = %uuid, "expiration schedule elapsed; cancelling job");
            job.job_expired();
        });
        self.timers.entry(uuid).or_default().expiration = Some(handle);
    }

    /// Disarm both timers for a job. Idempotent.
    pub fn clear_schedules(&self, uuid: Uuid) {
        if let Some((_, timers)) = self.timers.remove(&uuid) {
            timers.abort();
        }
    }

    /// Disarm everything. Used at shutdown.
    pub fn close(&self) {
        for entry in self.timers.iter() {
            entry.value().abort();
        }
        self.timers.clear();
    }
}
