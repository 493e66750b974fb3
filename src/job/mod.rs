//! Jobs, their SLAs, and their life-cycle state.

mod acceptance;
mod bundle;
mod metadata;
mod server_job;
mod sla;
mod state;

pub use acceptance::accepts_channel;
pub use bundle::{Bundle, BundleId, ClientBundle, NodeBundle};
pub use metadata::JobMetadata;
pub use server_job::ServerJob;
pub use sla::{ClientSla, ExecutionPolicy, JobSchedule, JobSla};
pub use state::{CallbackId, JobState, JobStatus};

/// Errors raised by job-level operations.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The job has started executing and `key` is not an existing metadata
    /// key; the key set is frozen at that point.
    #[error("metadata key set is frozen; cannot insert new key {key:?}")]
    MetadataFrozen { key: String },
}
