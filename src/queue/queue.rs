//! The driver's job queue: priority-ordered admission, extraction of node
//! dispatches, requeue and removal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::ChannelDescriptor;
use crate::dispatch::{DispatchTracker, QueueEvent, QueueListener};
use crate::job::{accepts_channel, ClientBundle, JobStatus, NodeBundle, ServerJob};
use crate::schedule::ScheduleManager;
use crate::telemetry::metrics;

use super::priority_map::PriorityMap;
use super::size_info::SizeInfo;

/// Errors raised by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A bundle arrived for a job that already reached a terminal state.
    #[error("job {uuid} has already ended")]
    JobEnded { uuid: Uuid },
    /// The queue no longer accepts submissions.
    #[error("queue is closed")]
    Closed,
}

struct QueueCore {
    priority_map: PriorityMap,
    jobs: HashMap<Uuid, Arc<ServerJob>>,
}

/// Priority job queue. All structural mutation happens under one async lock;
/// job events fire from inside the critical section so listeners observe
/// them in mutation order.
pub struct JobQueue {
    core: Mutex<QueueCore>,
    size_info: SizeInfo,
    tracker: Arc<DispatchTracker>,
    schedules: Arc<ScheduleManager>,
    queue_listeners: RwLock<Vec<Arc<dyn QueueListener>>>,
    cleanup_tx: mpsc::UnboundedSender<Uuid>,
    closed: AtomicBool,
}

impl JobQueue {
    /// Create the queue and spawn its cleanup task: jobs reaching a terminal
    /// state enqueue their uuid, and the task removes them from the queue
    /// outside whatever call path completed them.
    pub fn new(tracker: Arc<DispatchTracker>, schedules: Arc<ScheduleManager>) -> Arc<Self> {
        let (cleanup_tx, mut cleanup_rx) = mpsc::unbounded_channel::<Uuid>();
        let queue = Arc::new(Self {
            core: Mutex::new(QueueCore { priority_map: PriorityMap::new(), jobs: HashMap::new() }),
            size_info: SizeInfo::new(),
            tracker,
            schedules,
            queue_listeners: RwLock::new(Vec::new()),
            cleanup_tx,
            closed: AtomicBool::new(false),
        });
        let weak = Arc::downgrade(&queue);
        tokio::spawn(async move {
            while let Some(uuid) = cleanup_rx.recv().await {
                let Some(queue) = weak.upgrade() else { break };
                queue.remove_job(uuid).await;
            }
            debug!("queue cleanup task stopped");
        });
        queue
    }

    pub fn add_queue_listener(&self, listener: Arc<dyn QueueListener>) {
        self.queue_listeners.write().push(listener);
    }

    pub fn remove_queue_listener(&self, listener: &Arc<dyn QueueListener>) -> bool {
        let mut listeners = self.queue_listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Submit a client bundle. Creates a new job, or merges the bundle's
    /// tasks into the live job already queued under the same uuid. Merging
    /// into an ended job is an error; the tasks cannot run.
    pub async fn add_bundle(&self, bundle: ClientBundle) -> Result<Arc<ServerJob>, QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        let mut core = self.core.lock().await;
        // Re-checked under the lock: a close that raced the early check has
        // already drained the maps, and nothing may be inserted after it.
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        let existing = core.jobs.get(&bundle.job_uuid).cloned();
        match existing {
            Some(job) if job.is_done() => Err(QueueError::JobEnded { uuid: bundle.job_uuid }),
            Some(job) => {
                let old_size = job.task_count();
                job.merge_bundle(&bundle);
                if old_size > 0 {
                    self.size_info.decrement(old_size);
                }
                if job.task_count() > 0 {
                    self.size_info.increment(job.task_count());
                }
                // The grown job repositions at the back of its bucket; a
                // fully extracted one re-enters the priority order.
                core.priority_map.remove(job.priority(), &job);
                core.priority_map.put(job.priority(), Arc::clone(&job));
                debug!(job = %job.uuid(), added = bundle.task_count, "merged bundle into queued job");
                self.fire_bundle_added(&job, false);
                self.tracker.job_updated(&job).await;
                metrics::record_queue_depth(core.priority_map.size());
                Ok(job)
            }
            None => {
                let job = Arc::new(ServerJob::new(&bundle));
                job.merge_bundle(&bundle);
                job.mark_queued();
                let uuid = job.uuid();
                let cleanup = self.cleanup_tx.clone();
                job.add_on_done(move || {
                    let _ = cleanup.send(uuid);
                });
                core.jobs.insert(uuid, Arc::clone(&job));
                core.priority_map.put(job.priority(), Arc::clone(&job));
                if job.task_count() > 0 {
                    self.size_info.increment(job.task_count());
                }
                info!(
                    job = %uuid,
                    name = %job.name(),
                    priority = ?job.priority(),
                    tasks = job.task_count(),
                    "job queued"
                );
                self.fire_bundle_added(&job, false);
                self.tracker.job_queued(&job).await;
                // Timers arm only after the tracker knows the job, so a
                // zero-delay start cannot announce an unknown job.
                self.schedules.handle_start_schedule(&job);
                self.schedules.handle_expiration_schedule(&job);
                metrics::record_queue_depth(core.priority_map.size());
                Ok(job)
            }
        }
    }

    /// Extract up to `max_tasks` tasks of a job as a node dispatch. A full
    /// extraction takes the job out of the priority order; a partial one
    /// moves it behind its same-priority peers.
    pub async fn next_bundle(&self, uuid: Uuid, max_tasks: usize) -> Option<NodeBundle> {
        if max_tasks == 0 {
            return None;
        }
        let mut core = self.core.lock().await;
        let job = core.jobs.get(&uuid).cloned()?;
        if job.is_done() || job.is_pending() {
            return None;
        }
        let available = job.task_count();
        if available == 0 {
            return None;
        }
        let bundle = job.create_node_dispatch(max_tasks.min(available));
        self.size_info.decrement(available);
        let remaining = job.task_count();
        if remaining > 0 {
            self.size_info.increment(remaining);
            core.priority_map.move_to_end(job.priority(), &job);
        } else {
            core.priority_map.remove(job.priority(), &job);
        }
        debug!(
            job = %uuid,
            tasks = bundle.task_count,
            remaining,
            "extracted node dispatch"
        );
        metrics::record_queue_depth(core.priority_map.size());
        Some(bundle)
    }

    /// Highest-priority job that accepts a dispatch to `channel`, honoring
    /// FIFO order within a priority.
    pub async fn select_job(&self, channel: &ChannelDescriptor) -> Option<Arc<ServerJob>> {
        let core = self.core.lock().await;
        let selected = core
            .priority_map
            .iter()
            .find(|job| job.task_count() > 0 && accepts_channel(job, channel))
            .cloned();
        selected
    }

    /// Put tasks from a failed dispatch back into the queue. The job re-enters
    /// the priority order and listeners see a requeue, not a fresh submission.
    pub async fn requeue(&self, uuid: Uuid, task_count: usize) {
        let mut core = self.core.lock().await;
        if self.closed.load(Ordering::Acquire) {
            debug!(job = %uuid, "requeue after close; dropping");
            return;
        }
        let Some(job) = core.jobs.get(&uuid).cloned() else {
            warn!(job = %uuid, "requeue for unknown job; dropping");
            return;
        };
        if job.is_done() {
            warn!(job = %uuid, "requeue for ended job; dropping");
            return;
        }
        let old_size = job.task_count();
        job.return_tasks(task_count);
        if old_size > 0 {
            self.size_info.decrement(old_size);
        }
        self.size_info.increment(job.task_count());
        if !core.priority_map.contains(job.priority(), &job) {
            core.priority_map.put(job.priority(), Arc::clone(&job));
        }
        debug!(job = %uuid, tasks = task_count, "requeued tasks");
        self.fire_bundle_added(&job, true);
        metrics::record_queue_depth(core.priority_map.size());
    }

    /// Cancel a job. Returns false when the job is unknown or already past
    /// cancellation. Removal from the queue follows through the cleanup task.
    pub async fn cancel_job(&self, uuid: Uuid) -> bool {
        let job = self.core.lock().await.jobs.get(&uuid).cloned();
        match job {
            Some(job) => {
                info!(job = %uuid, "cancelling job");
                job.cancel(true)
            }
            None => {
                debug!(job = %uuid, "cancel for unknown job");
                false
            }
        }
    }

    /// Change a job's priority in place. The job moves to the back of its
    /// new priority bucket.
    pub async fn update_priority(&self, uuid: Uuid, priority: Option<i32>) {
        let mut core = self.core.lock().await;
        let Some(job) = core.jobs.get(&uuid).cloned() else {
            warn!(job = %uuid, "priority update for unknown job; dropping");
            return;
        };
        let old = job.priority();
        if old == priority {
            return;
        }
        let was_queued = core.priority_map.remove(old, &job);
        job.set_priority(priority);
        if was_queued {
            core.priority_map.put(priority, Arc::clone(&job));
        }
        debug!(job = %uuid, ?old, new = ?priority, "job priority updated");
        self.tracker.job_updated(&job).await;
    }

    /// Remove a job from the queue entirely, marking it done if it was not
    /// already terminal. Idempotent; removing an absent job returns `None`.
    pub async fn remove_job(&self, uuid: Uuid) -> Option<Arc<ServerJob>> {
        let mut core = self.core.lock().await;
        let job = core.jobs.remove(&uuid)?;
        core.priority_map.remove(job.priority(), &job);
        let remaining = job.task_count();
        if remaining > 0 {
            self.size_info.decrement(remaining);
        }
        if !job.is_done() {
            let state = job.state();
            if !state.update_status(JobStatus::New, JobStatus::Done) {
                state.update_status(JobStatus::Executing, JobStatus::Done);
            }
        }
        self.schedules.clear_schedules(uuid);
        info!(job = %uuid, status = %job.status(), "job removed from queue");
        self.fire_bundle_removed(&job);
        self.tracker.job_ended(&job).await;
        metrics::record_queue_depth(core.priority_map.size());
        Some(job)
    }

    pub async fn get_job(&self, uuid: Uuid) -> Option<Arc<ServerJob>> {
        self.core.lock().await.jobs.get(&uuid).cloned()
    }

    /// All queued jobs, highest priority first.
    pub async fn all_jobs(&self) -> Vec<Arc<ServerJob>> {
        self.core.lock().await.priority_map.iter().cloned().collect()
    }

    /// Run a closure over the priority-ordered jobs while holding the queue
    /// lock. The closure must not call back into the queue.
    pub async fn with_jobs<R>(
        &self,
        f: impl FnOnce(&mut dyn Iterator<Item = &Arc<ServerJob>>) -> R,
    ) -> R {
        let core = self.core.lock().await;
        let mut iter = core.priority_map.iter();
        f(&mut iter)
    }

    pub async fn all_job_uuids(&self) -> Vec<Uuid> {
        self.core.lock().await.jobs.keys().copied().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.core.lock().await.priority_map.is_empty()
    }

    /// Number of jobs in the priority order. Walks the buckets.
    pub async fn queue_size(&self) -> usize {
        self.core.lock().await.priority_map.size()
    }

    /// Largest queued task count. O(1), does not take the queue lock.
    pub fn max_bundle_size(&self) -> usize {
        self.size_info.max()
    }

    /// Stop accepting submissions and drop every queued job, announcing each
    /// end. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let jobs: Vec<Arc<ServerJob>> = {
            let mut core = self.core.lock().await;
            core.priority_map = PriorityMap::new();
            core.jobs.drain().map(|(_, job)| job).collect()
        };
        info!(jobs = jobs.len(), "closing queue");
        for job in jobs {
            self.schedules.clear_schedules(job.uuid());
            job.cancel(true);
            self.fire_bundle_removed(&job);
            self.tracker.job_ended(&job).await;
        }
        self.queue_listeners.write().clear();
    }

    fn fire_bundle_added(&self, job: &ServerJob, requeued: bool) {
        let event = QueueEvent::new(job, requeued);
        for listener in self.queue_listeners.read().iter() {
            listener.bundle_added(&event);
        }
    }

    fn fire_bundle_removed(&self, job: &ServerJob) {
        let event = QueueEvent::new(job, false);
        for listener in self.queue_listeners.read().iter() {
            listener.bundle_removed(&event);
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
