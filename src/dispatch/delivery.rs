//! Asynchronous, ordered delivery of job events to registered listeners.
//!
//! Events are pushed onto a bounded channel by the tracker (inside its
//! critical section, so per-job order matches mutation order) and consumed by
//! a single task. One consumer means listeners observe events for a given job
//! in exactly the order they were fired.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::telemetry::metrics;

use super::events::{deliver, JobListener, JobNotification};

/// What to do when the event channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Apply backpressure: the firing operation waits for space.
    Block,
    /// Drop the incoming event and log it. Firing never waits.
    DropNewest,
}

/// Sizing and overflow behavior of the event delivery channel.
#[derive(Debug, Clone, Copy)]
pub struct EventQueueConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for EventQueueConfig {
    fn default() -> Self {
        Self { capacity: 1024, overflow: OverflowPolicy::Block }
    }
}

/// Fan-out point for job notifications: a bounded channel feeding a single
/// consumer task that invokes every registered [`JobListener`].
pub struct EventDelivery {
    tx: mpsc::Sender<JobNotification>,
    overflow: OverflowPolicy,
    listeners: Arc<RwLock<Vec<Arc<dyn JobListener>>>>,
    cancel: CancellationToken,
    consumer: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl EventDelivery {
    /// Create the delivery pipeline and spawn its consumer task on the
    /// current runtime.
    pub fn new(config: EventQueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let listeners: Arc<RwLock<Vec<Arc<dyn JobListener>>>> = Arc::new(RwLock::new(Vec::new()));
        let cancel = CancellationToken::new();
        let consumer = tokio::spawn(consume(rx, Arc::clone(&listeners), cancel.clone()));
        Self {
            tx,
            overflow: config.overflow,
            listeners,
            cancel,
            consumer: parking_lot::Mutex::new(Some(consumer)),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn JobListener>) {
        self.listeners.write().push(listener);
    }

    /// Remove a listener registered earlier. Identity is by allocation, so
    /// pass a clone of the same `Arc` that was added.
    pub fn remove_listener(&self, listener: &Arc<dyn JobListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Enqueue a notification for delivery. Under `Block` this waits for
    /// channel space; under `DropNewest` a full channel loses the event.
    pub async fn publish(&self, notification: JobNotification) {
        match self.overflow {
            OverflowPolicy::Block => {
                if self.tx.send(notification).await.is_err() {
                    debug!("event channel closed; notification dropped");
                }
            }
            OverflowPolicy::DropNewest => match self.tx.try_send(notification) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(n)) => {
                    metrics::record_event_dropped();
                    warn!(kind = ?n.kind, job = %n.job.uuid, "event channel full; dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("event channel closed; notification dropped");
                }
            },
        }
    }

    /// Stop the consumer after draining everything already enqueued.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self.consumer.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "event consumer task failed");
            }
        }
    }
}

async fn consume(
    mut rx: mpsc::Receiver<JobNotification>,
    listeners: Arc<RwLock<Vec<Arc<dyn JobListener>>>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Drain what was enqueued before the shutdown signal.
                rx.close();
                while let Ok(notification) = rx.try_recv() {
                    fan_out(&listeners, &notification);
                }
                break;
            }
            notification = rx.recv() => {
                match notification {
                    Some(notification) => fan_out(&listeners, &notification),
                    None => break,
                }
            }
        }
    }
    debug!("event consumer stopped");
}

/// Invoke every listener for one notification. A panicking listener is
/// contained and logged; the remaining listeners still run.
fn fan_out(listeners: &RwLock<Vec<Arc<dyn JobListener>>>, notification: &JobNotification) {
    let snapshot: Vec<Arc<dyn JobListener>> = listeners.read().clone();
    for listener in snapshot {
        let result = catch_unwind(AssertUnwindSafe(|| deliver(listener.as_ref(), notification)));
        if result.is_err() {
            error!(
                kind = ?notification.kind,
                job = %notification.job.uuid,
                "job listener panicked; continuing with remaining listeners"
            );
        }
    }
    metrics::record_event_delivered();
}
