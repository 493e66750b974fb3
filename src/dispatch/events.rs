//! Job life-cycle events and the listener traits that observe them.
//!
//! Events carry immutable snapshots, never live job handles. A listener can
//! stash an event or read it from another thread without observing later
//! mutations of the job it describes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::channel::ChannelId;
use crate::job::{JobStatus, ServerJob};

/// What happened to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    /// The job entered the queue.
    JobQueued,
    /// The job left the system (completed, cancelled or removed).
    JobEnded,
    /// SLA, priority or schedule state changed.
    JobUpdated,
    /// A bundle of the job's tasks was sent to a worker channel.
    JobDispatched,
    /// A dispatched bundle came back from a worker channel.
    JobReturned,
}

/// Point-in-time copy of a job's observable state.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub uuid: Uuid,
    pub name: String,
    pub status: JobStatus,
    pub priority: Option<i32>,
    pub task_count: usize,
    pub initial_task_count: usize,
    pub completed_task_count: usize,
    pub channel_count: usize,
    pub pending: bool,
    pub expired: bool,
    pub received_time: DateTime<Utc>,
    pub queue_entry_time: Option<DateTime<Utc>>,
}

impl From<&ServerJob> for JobSnapshot {
    fn from(job: &ServerJob) -> Self {
        Self {
            uuid: job.uuid(),
            name: job.name(),
            status: job.status(),
            priority: job.priority(),
            task_count: job.task_count(),
            initial_task_count: job.initial_task_count(),
            completed_task_count: job.completed_task_count(),
            channel_count: job.channel_count(),
            pending: job.is_pending(),
            expired: job.is_expired(),
            received_time: job.received_time(),
            queue_entry_time: job.queue_entry_time(),
        }
    }
}

/// One delivered job event.
#[derive(Debug, Clone, Serialize)]
pub struct JobNotification {
    pub kind: JobEventKind,
    pub job: JobSnapshot,
    /// The worker channel involved, for dispatch/return events.
    pub channel: Option<ChannelId>,
    pub timestamp: DateTime<Utc>,
}

impl JobNotification {
    pub(crate) fn new(kind: JobEventKind, job: &ServerJob, channel: Option<ChannelId>) -> Self {
        Self { kind, job: JobSnapshot::from(job), channel, timestamp: Utc::now() }
    }
}

/// Observer of job life-cycle events. All methods default to no-ops so
/// implementors override only what they care about.
///
/// Listeners run on the event delivery task: they must not block, and a
/// panicking listener is isolated and logged without affecting the others.
pub trait JobListener: Send + Sync {
    fn job_queued(&self, _notification: &JobNotification) {}
    fn job_ended(&self, _notification: &JobNotification) {}
    fn job_updated(&self, _notification: &JobNotification) {}
    fn job_dispatched(&self, _notification: &JobNotification) {}
    fn job_returned(&self, _notification: &JobNotification) {}
}

/// Route a notification to the listener method matching its kind.
pub(crate) fn deliver(listener: &dyn JobListener, notification: &JobNotification) {
    match notification.kind {
        JobEventKind::JobQueued => listener.job_queued(notification),
        JobEventKind::JobEnded => listener.job_ended(notification),
        JobEventKind::JobUpdated => listener.job_updated(notification),
        JobEventKind::JobDispatched => listener.job_dispatched(notification),
        JobEventKind::JobReturned => listener.job_returned(notification),
    }
}

/// A queue-level event: a job entered or left the queue structure itself.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEvent {
    pub job: JobSnapshot,
    /// True when the addition is a requeue of returned tasks rather than a
    /// fresh submission.
    pub requeued: bool,
    pub timestamp: DateTime<Utc>,
}

impl QueueEvent {
    pub(crate) fn new(job: &ServerJob, requeued: bool) -> Self {
        Self { job: JobSnapshot::from(job), requeued, timestamp: Utc::now() }
    }
}

/// Observer of queue membership changes. Called synchronously from inside the
/// queue's critical section; implementations must be fast and non-blocking.
pub trait QueueListener: Send + Sync {
    fn bundle_added(&self, _event: &QueueEvent) {}
    fn bundle_removed(&self, _event: &QueueEvent) {}
}
