//! Bundles: slices of a job's tasks as they move through the system.
//!
//! Three shapes exist and are kept distinct in the type system rather than
//! discriminated by downcasting: the slice a client submits, the slice
//! dispatched to one worker channel, and the whole job as held in the queue.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::metadata::JobMetadata;
use super::sla::{ClientSla, JobSla};

static BUNDLE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity of a dispatched bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(u64);

impl BundleId {
    /// Allocate the next bundle id.
    pub(crate) fn next() -> Self {
        Self(BUNDLE_SEQUENCE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BundleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bundle-{}", self.0)
    }
}

/// A slice of tasks submitted by a client. Bundles sharing a job uuid merge
/// into the same server-side job when queued.
#[derive(Debug, Clone)]
pub struct ClientBundle {
    pub job_uuid: Uuid,
    pub name: String,
    pub sla: JobSla,
    pub client_sla: ClientSla,
    pub metadata: JobMetadata,
    pub task_count: usize,
}

impl ClientBundle {
    pub fn new(name: impl Into<String>, task_count: usize) -> Self {
        Self {
            job_uuid: Uuid::new_v4(),
            name: name.into(),
            sla: JobSla::default(),
            client_sla: ClientSla::default(),
            metadata: JobMetadata::new(),
            task_count,
        }
    }

    pub fn with_sla(mut self, sla: JobSla) -> Self {
        self.sla = sla;
        self
    }

    pub fn with_client_sla(mut self, client_sla: ClientSla) -> Self {
        self.client_sla = client_sla;
        self
    }

    pub fn with_metadata(mut self, metadata: JobMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A slice of tasks dispatched to one worker channel.
///
/// The priority is copied from the owning job's SLA at creation time and is
/// immutable for the bundle's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBundle {
    pub id: BundleId,
    pub job_uuid: Uuid,
    pub task_count: usize,
    pub priority: Option<i32>,
}

/// The three shapes a bundle can take. Matching is exhaustive by
/// construction; there is no "unknown bundle type" path.
#[derive(Debug, Clone)]
pub enum Bundle {
    /// The whole job as held in the driver queue.
    Job { uuid: Uuid, task_count: usize },
    /// A slice dispatched to a worker channel.
    Node(NodeBundle),
    /// A slice as submitted by a client.
    Client(ClientBundle),
}

impl Bundle {
    pub fn job_uuid(&self) -> Uuid {
        match self {
            Bundle::Job { uuid, .. } => *uuid,
            Bundle::Node(b) => b.job_uuid,
            Bundle::Client(b) => b.job_uuid,
        }
    }

    pub fn task_count(&self) -> usize {
        match self {
            Bundle::Job { task_count, .. } => *task_count,
            Bundle::Node(b) => b.task_count,
            Bundle::Client(b) => b.task_count,
        }
    }
}
