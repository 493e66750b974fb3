//! Tracks which worker channels hold dispatches for which jobs, and fires
//! job life-cycle events.
//!
//! Every mutation fires its event from inside the tracker's critical
//! section. Combined with the single-consumer delivery pipeline this gives
//! listeners an exact per-job ordering guarantee: events arrive in the order
//! the corresponding mutations took effect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channel::ChannelId;
use crate::job::{Bundle, BundleId, NodeBundle, ServerJob};
use crate::telemetry::metrics;

use super::delivery::EventDelivery;
use super::events::{JobEventKind, JobListener, JobNotification};

/// One outstanding dispatch: a bundle sitting on a worker channel.
#[derive(Debug, Clone)]
struct DispatchEntry {
    channel: ChannelId,
    bundle: NodeBundle,
}

#[derive(Default)]
struct TrackerCore {
    /// Per-job list of outstanding dispatches, in dispatch order.
    dispatches: HashMap<Uuid, Vec<DispatchEntry>>,
    /// Reverse index from bundle identity to owning job.
    bundle_owners: HashMap<BundleId, Uuid>,
}

/// Dispatch bookkeeping and event source for all jobs known to the driver.
pub struct DispatchTracker {
    core: Mutex<TrackerCore>,
    delivery: Arc<EventDelivery>,
    closed: AtomicBool,
}

impl DispatchTracker {
    pub fn new(delivery: Arc<EventDelivery>) -> Self {
        Self {
            core: Mutex::new(TrackerCore::default()),
            delivery,
            closed: AtomicBool::new(false),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn JobListener>) {
        self.delivery.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn JobListener>) -> bool {
        self.delivery.remove_listener(listener)
    }

    /// Register a job that just entered the queue and announce it.
    pub async fn job_queued(&self, job: &Arc<ServerJob>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut core = self.core.lock().await;
        core.dispatches.entry(job.uuid()).or_default();
        self.delivery
            .publish(JobNotification::new(JobEventKind::JobQueued, job, None))
            .await;
        metrics::record_job_queued();
    }

    /// Announce an SLA, priority or schedule-state change.
    pub async fn job_updated(&self, job: &Arc<ServerJob>) {
        let core = self.core.lock().await;
        if !core.dispatches.contains_key(&job.uuid()) {
            warn!(job = %job.uuid(), "update for unknown job; dropping");
            return;
        }
        self.delivery
            .publish(JobNotification::new(JobEventKind::JobUpdated, job, None))
            .await;
    }

    /// Record a bundle sent to a worker channel. Only node-dispatch bundles
    /// occupy a channel; other shapes are rejected here.
    pub async fn job_dispatched(&self, job: &Arc<ServerJob>, channel: ChannelId, bundle: Bundle) {
        let bundle = match bundle {
            Bundle::Node(bundle) => bundle,
            Bundle::Job { uuid, .. } => {
                warn!(job = %uuid, "whole-job bundle is not dispatchable; ignoring");
                return;
            }
            Bundle::Client(b) => {
                warn!(job = %b.job_uuid, "client bundle is not dispatchable; ignoring");
                return;
            }
        };
        let mut core = self.core.lock().await;
        let Some(entries) = core.dispatches.get_mut(&job.uuid()) else {
            warn!(job = %job.uuid(), %channel, "dispatch for unknown job; dropping");
            return;
        };
        entries.push(DispatchEntry { channel, bundle: bundle.clone() });
        core.bundle_owners.insert(bundle.id, job.uuid());
        job.add_channel();
        self.delivery
            .publish(JobNotification::new(JobEventKind::JobDispatched, job, Some(channel)))
            .await;
        metrics::record_dispatch(bundle.task_count);
    }

    /// Record a bundle coming back from a worker channel. The (channel,
    /// bundle) pair must match an outstanding dispatch; an unmatched return
    /// is logged and dropped.
    pub async fn job_returned(&self, job: &Arc<ServerJob>, channel: ChannelId, bundle_id: BundleId) {
        let mut core = self.core.lock().await;
        let Some(entries) = core.dispatches.get_mut(&job.uuid()) else {
            warn!(job = %job.uuid(), %channel, "return for unknown job; dropping");
            return;
        };
        let position = entries
            .iter()
            .position(|e| e.channel == channel && e.bundle.id == bundle_id);
        let Some(position) = position else {
            warn!(job = %job.uuid(), %channel, %bundle_id, "return without matching dispatch; dropping");
            return;
        };
        let entry = entries.remove(position);
        core.bundle_owners.remove(&bundle_id);
        job.remove_channel();
        self.delivery
            .publish(JobNotification::new(JobEventKind::JobReturned, job, Some(channel)))
            .await;
        metrics::record_return(entry.bundle.task_count);
    }

    /// Drop all bookkeeping for a job and announce its end.
    pub async fn job_ended(&self, job: &Arc<ServerJob>) {
        let mut core = self.core.lock().await;
        let Some(entries) = core.dispatches.remove(&job.uuid()) else {
            debug!(job = %job.uuid(), "end for unknown job; dropping");
            return;
        };
        for entry in &entries {
            core.bundle_owners.remove(&entry.bundle.id);
        }
        self.delivery
            .publish(JobNotification::new(JobEventKind::JobEnded, job, None))
            .await;
        metrics::record_job_ended();
    }

    /// Channels currently holding dispatches for a job, as an owned snapshot.
    pub async fn nodes_for_job(&self, uuid: Uuid) -> Vec<ChannelId> {
        let core = self.core.lock().await;
        core.dispatches
            .get(&uuid)
            .map(|entries| entries.iter().map(|e| e.channel).collect())
            .unwrap_or_default()
    }

    /// Number of outstanding dispatches for a job.
    pub async fn dispatch_count(&self, uuid: Uuid) -> usize {
        let core = self.core.lock().await;
        core.dispatches.get(&uuid).map(Vec::len).unwrap_or(0)
    }

    /// The job owning a dispatched bundle, if it is still outstanding.
    pub async fn owner_of(&self, bundle_id: BundleId) -> Option<Uuid> {
        self.core.lock().await.bundle_owners.get(&bundle_id).copied()
    }

    /// All jobs with tracker state, in no particular order.
    pub async fn all_job_uuids(&self) -> Vec<Uuid> {
        self.core.lock().await.dispatches.keys().copied().collect()
    }

    /// Stop accepting new jobs and drop all bookkeeping. Used at shutdown
    /// after the queue is closed.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut core = self.core.lock().await;
        core.dispatches.clear();
        core.bundle_owners.clear();
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
