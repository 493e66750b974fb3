//! Driver-side representation of one submitted job.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::bundle::{BundleId, ClientBundle, NodeBundle};
use super::metadata::{JobMetadata, MetadataCell};
use super::sla::{ClientSla, JobSla};
use super::state::{CallbackId, JobState, JobStatus};
use super::JobError;

/// One unit of work as tracked by the driver: immutable identity, mutable
/// SLA/metadata, atomic life-cycle state and task/channel accounting.
///
/// Task counts are mutated by the queue under its own lock; they are atomics
/// so monitoring code can read them without taking that lock.
pub struct ServerJob {
    uuid: Uuid,
    name: RwLock<String>,
    sla: RwLock<JobSla>,
    client_sla: ClientSla,
    metadata: MetadataCell,
    state: JobState,
    received_time: DateTime<Utc>,
    queue_entry_time: RwLock<Option<DateTime<Utc>>>,
    pending: AtomicBool,
    expired: AtomicBool,
    channels: AtomicUsize,
    initial_tasks: AtomicUsize,
    queued_tasks: AtomicUsize,
    completed_tasks: AtomicUsize,
    total_dispatches: AtomicUsize,
}

impl std::fmt::Debug for ServerJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerJob")
            .field("uuid", &self.uuid)
            .field("name", &*self.name.read())
            .field("status", &self.state.status())
            .field("queued_tasks", &self.task_count())
            .field("channels", &self.channel_count())
            .finish()
    }
}

impl ServerJob {
    /// Create a job from the first client bundle submitted under its uuid.
    /// Task counts start at zero; the queue merges bundles in explicitly.
    pub fn new(bundle: &ClientBundle) -> Self {
        Self {
            uuid: bundle.job_uuid,
            name: RwLock::new(bundle.name.clone()),
            sla: RwLock::new(bundle.sla.clone()),
            client_sla: bundle.client_sla.clone(),
            metadata: MetadataCell::new(bundle.metadata.clone()),
            state: JobState::new(),
            received_time: Utc::now(),
            queue_entry_time: RwLock::new(None),
            pending: AtomicBool::new(false),
            expired: AtomicBool::new(false),
            channels: AtomicUsize::new(0),
            initial_tasks: AtomicUsize::new(0),
            queued_tasks: AtomicUsize::new(0),
            completed_tasks: AtomicUsize::new(0),
            total_dispatches: AtomicUsize::new(0),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Rename the job. Local bookkeeping only: no update event is fired, and
    /// listeners see the new name on whatever snapshot is taken next.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    pub fn sla(&self) -> JobSla {
        self.sla.read().clone()
    }

    pub fn priority(&self) -> Option<i32> {
        self.sla.read().priority
    }

    pub(crate) fn set_priority(&self, priority: Option<i32>) {
        self.sla.write().priority = priority;
    }

    pub fn client_sla(&self) -> &ClientSla {
        &self.client_sla
    }

    pub fn received_time(&self) -> DateTime<Utc> {
        self.received_time
    }

    pub fn queue_entry_time(&self) -> Option<DateTime<Utc>> {
        *self.queue_entry_time.read()
    }

    pub(crate) fn mark_queued(&self) {
        *self.queue_entry_time.write() = Some(Utc::now());
    }

    // ---- life-cycle ----

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.state.cancel(may_interrupt)
    }

    pub fn add_on_done(&self, callback: impl Fn() + Send + Sync + 'static) -> CallbackId {
        self.state.add_on_done(callback)
    }

    pub fn remove_on_done(&self, id: CallbackId) -> bool {
        self.state.remove_on_done(id)
    }

    /// Whether the job is waiting for its scheduled start time.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn set_pending(&self, pending: bool) {
        self.pending.store(pending, Ordering::Release);
    }

    /// Whether a deadline has passed for this job.
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Mark the job expired and force cancellation.
    pub fn job_expired(&self) {
        self.expired.store(true, Ordering::Release);
        self.state.cancel(true);
    }

    // ---- metadata ----

    /// Snapshot of the job's metadata.
    pub fn metadata(&self) -> std::sync::Arc<JobMetadata> {
        self.metadata.snapshot()
    }

    /// Update a metadata entry. Once the job has started executing the key
    /// set is frozen: existing keys may be rewritten, new keys are rejected.
    pub fn set_metadata(
        &self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<(), JobError> {
        let frozen = self.status() >= JobStatus::Executing;
        self.metadata.set(key, value.into(), frozen)
    }

    // ---- channel accounting ----

    /// Number of channels currently holding a dispatch for this job.
    pub fn channel_count(&self) -> usize {
        self.channels.load(Ordering::Acquire)
    }

    pub(crate) fn add_channel(&self) {
        self.channels.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the channel count, clamped at zero. An underflow indicates
    /// a return without a matching dispatch and is logged, not propagated.
    pub(crate) fn remove_channel(&self) {
        let result = self.channels.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            n.checked_sub(1)
        });
        if result.is_err() {
            tracing::warn!(job = %self.uuid, "channel count underflow; clamping at zero");
        }
    }

    // ---- task accounting ----

    /// Tasks still queued (not yet dispatched).
    pub fn task_count(&self) -> usize {
        self.queued_tasks.load(Ordering::Acquire)
    }

    pub fn initial_task_count(&self) -> usize {
        self.initial_tasks.load(Ordering::Acquire)
    }

    pub fn completed_task_count(&self) -> usize {
        self.completed_tasks.load(Ordering::Acquire)
    }

    pub fn total_dispatches(&self) -> usize {
        self.total_dispatches.load(Ordering::Acquire)
    }

    /// Merge a client bundle's tasks into this job. Returns the number of
    /// tasks added.
    pub(crate) fn merge_bundle(&self, bundle: &ClientBundle) -> usize {
        self.initial_tasks.fetch_add(bundle.task_count, Ordering::AcqRel);
        self.queued_tasks.fetch_add(bundle.task_count, Ordering::AcqRel);
        bundle.task_count
    }

    /// Carve a node dispatch of `task_count` tasks out of the queued tasks.
    /// The first dispatch moves the job from `New` to `Executing`.
    pub(crate) fn create_node_dispatch(&self, task_count: usize) -> NodeBundle {
        self.queued_tasks.fetch_sub(task_count, Ordering::AcqRel);
        self.total_dispatches.fetch_add(1, Ordering::AcqRel);
        self.state.update_status(JobStatus::New, JobStatus::Executing);
        NodeBundle {
            id: BundleId::next(),
            job_uuid: self.uuid,
            task_count,
            priority: self.priority(),
        }
    }

    /// Put a dispatched bundle's tasks back into the queued count, e.g. after
    /// a channel failure.
    pub(crate) fn return_tasks(&self, task_count: usize) {
        self.queued_tasks.fetch_add(task_count, Ordering::AcqRel);
    }

    /// Record results received for `task_count` tasks.
    pub fn results_received(&self, task_count: usize) {
        self.completed_tasks.fetch_add(task_count, Ordering::AcqRel);
    }

    /// Whether every submitted task has a result and nothing remains queued.
    pub fn has_completed(&self) -> bool {
        let initial = self.initial_task_count();
        initial > 0 && self.completed_task_count() >= initial && self.task_count() == 0
    }
}

#[cfg(test)]
#[path = "server_job_tests.rs"]
mod tests;
