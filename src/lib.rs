//! Driver-side core of a distributed grid computing platform: a priority
//! job queue, dispatch tracking across worker channels, and an ordered job
//! event pipeline.
//!
//! The [`Driver`] wires the pieces together: jobs are submitted as
//! [`job::ClientBundle`]s, sliced into node dispatches by the
//! [`queue::JobQueue`], and tracked per worker channel by the
//! [`dispatch::DispatchTracker`], which feeds registered
//! [`dispatch::JobListener`]s through a single ordered delivery task.
//!
//! ```no_run
//! use grid_core::job::ClientBundle;
//! use grid_core::Driver;
//!
//! #[tokio::main]
//! async fn main() {
//!     let driver = Driver::from_env();
//!     let job = driver
//!         .queue()
//!         .add_bundle(ClientBundle::new("example", 8))
//!         .await
//!         .unwrap();
//!     let dispatch = driver.queue().next_bundle(job.uuid(), 4).await;
//!     assert!(dispatch.is_some());
//!     driver.shutdown().await;
//! }
//! ```

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod job;
pub mod queue;
pub mod schedule;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::DriverConfig;
use crate::dispatch::{DispatchTracker, EventDelivery, JobListener};
use crate::queue::JobQueue;
use crate::schedule::ScheduleManager;

/// The assembled driver core. Construction spawns the event delivery and
/// queue cleanup tasks, so a tokio runtime must be running.
pub struct Driver {
    queue: Arc<JobQueue>,
    tracker: Arc<DispatchTracker>,
    delivery: Arc<EventDelivery>,
    schedules: Arc<ScheduleManager>,
    shutdown_timeout: Duration,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        let delivery = Arc::new(EventDelivery::new(config.event_queue));
        let tracker = Arc::new(DispatchTracker::new(Arc::clone(&delivery)));
        let schedules = Arc::new(ScheduleManager::new(Arc::clone(&tracker)));
        let queue = JobQueue::new(Arc::clone(&tracker), Arc::clone(&schedules));
        info!(
            event_capacity = config.event_queue.capacity,
            overflow = ?config.event_queue.overflow,
            "grid driver core started"
        );
        Self { queue, tracker, delivery, schedules, shutdown_timeout: config.shutdown_timeout }
    }

    /// Build from `GRID_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(config::load())
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn tracker(&self) -> &Arc<DispatchTracker> {
        &self.tracker
    }

    pub fn add_job_listener(&self, listener: Arc<dyn JobListener>) {
        self.tracker.add_listener(listener);
    }

    pub fn remove_job_listener(&self, listener: &Arc<dyn JobListener>) -> bool {
        self.tracker.remove_listener(listener)
    }

    /// Orderly shutdown: stop accepting jobs, end everything queued, disarm
    /// timers, drain and stop event delivery. The delivery drain is bounded
    /// by the configured shutdown timeout; a consumer stuck in a slow
    /// listener is abandoned with a warning rather than wedging shutdown.
    pub async fn shutdown(&self) {
        info!("grid driver core shutting down");
        self.queue.close().await;
        self.schedules.close();
        if tokio::time::timeout(self.shutdown_timeout, self.delivery.close()).await.is_err() {
            warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "event delivery did not drain within the shutdown timeout"
            );
        }
        self.tracker.close().await;
    }
}
