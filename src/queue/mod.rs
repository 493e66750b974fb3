//! Priority job queue and its supporting structures.

mod priority_map;
#[allow(clippy::module_inception)]
mod queue;
mod size_info;

pub use queue::{JobQueue, QueueError};
