//! Service-level agreements governing job scheduling and admission.

use std::sync::Arc;
use std::time::Duration;

use crate::channel::SystemInformation;

/// Predicate over a channel's capability snapshot, used to admit or reject a
/// dispatch. The core treats it as an opaque callable.
pub trait ExecutionPolicy: Send + Sync {
    fn evaluate(&self, info: &SystemInformation) -> bool;
}

impl<F> ExecutionPolicy for F
where
    F: Fn(&SystemInformation) -> bool + Send + Sync,
{
    fn evaluate(&self, info: &SystemInformation) -> bool {
        self(info)
    }
}

/// A relative schedule attached to a job: either a start delay (the job stays
/// pending until it elapses) or an expiration deadline (the job is cancelled
/// once it passes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSchedule {
    pub delay: Duration,
}

impl JobSchedule {
    pub fn after(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Driver-side service-level agreement for a job.
#[derive(Clone, Default)]
pub struct JobSla {
    /// Queue priority. `None` sorts below every explicit priority.
    pub priority: Option<i32>,
    /// Maximum number of nodes the job may run on. 0 means no limit.
    pub max_nodes: usize,
    /// Optional delayed start: the job stays pending until this elapses.
    pub start_schedule: Option<JobSchedule>,
    /// Optional expiration: the job is force-cancelled once this elapses.
    pub expiration_schedule: Option<JobSchedule>,
    /// Optional admission predicate over worker capabilities.
    pub execution_policy: Option<Arc<dyn ExecutionPolicy>>,
}

impl std::fmt::Debug for JobSla {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSla")
            .field("priority", &self.priority)
            .field("max_nodes", &self.max_nodes)
            .field("start_schedule", &self.start_schedule)
            .field("expiration_schedule", &self.expiration_schedule)
            .field("execution_policy", &self.execution_policy.as_ref().map(|_| "<policy>"))
            .finish()
    }
}

impl JobSla {
    pub fn with_priority(priority: i32) -> Self {
        Self { priority: Some(priority), ..Self::default() }
    }
}

/// Client-side service-level agreement: limits that apply per submitting
/// client rather than across the whole grid.
#[derive(Clone)]
pub struct ClientSla {
    /// Maximum number of channels the job may be dispatched to concurrently.
    pub max_channels: usize,
    /// Optional admission predicate restricted to capability matching.
    pub execution_policy: Option<Arc<dyn ExecutionPolicy>>,
}

impl std::fmt::Debug for ClientSla {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSla")
            .field("max_channels", &self.max_channels)
            .field("execution_policy", &self.execution_policy.as_ref().map(|_| "<policy>"))
            .finish()
    }
}

impl Default for ClientSla {
    fn default() -> Self {
        Self { max_channels: usize::MAX, execution_policy: None }
    }
}

impl ClientSla {
    pub fn with_max_channels(max_channels: usize) -> Self {
        Self { max_channels, execution_policy: None }
    }
}
