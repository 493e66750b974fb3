//! Dispatch tracking and job event delivery.

mod delivery;
mod events;
mod tracker;

pub use delivery::{EventDelivery, EventQueueConfig, OverflowPolicy};
pub use events::{JobEventKind, JobListener, JobNotification, JobSnapshot, QueueEvent, QueueListener};
pub use tracker::DispatchTracker;
