//! Priority-ordered job storage: descending priority across buckets, FIFO
//! within a bucket.
//!
//! Keys are `Option<i32>` and rely on `Option`'s ordering: `None` sorts below
//! every explicit priority, so jobs without one always come last.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::job::ServerJob;

/// Jobs bucketed by priority. Not thread-safe on its own; the owning queue
/// serializes access.
#[derive(Default)]
pub(crate) struct PriorityMap {
    buckets: BTreeMap<Option<i32>, VecDeque<Arc<ServerJob>>>,
}

impl PriorityMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a job to the back of its priority bucket.
    pub(crate) fn put(&mut self, priority: Option<i32>, job: Arc<ServerJob>) {
        self.buckets.entry(priority).or_default().push_back(job);
    }

    /// Remove a job from its bucket. Identity is by allocation, not value.
    /// Returns false when the job is not present under that priority.
    pub(crate) fn remove(&mut self, priority: Option<i32>, job: &Arc<ServerJob>) -> bool {
        let Some(bucket) = self.buckets.get_mut(&priority) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|j| !Arc::ptr_eq(j, job));
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            self.buckets.remove(&priority);
        }
        removed
    }

    /// Move a job to the back of its bucket, demoting it behind its peers
    /// after a partial extraction. No-op if the job is not present.
    pub(crate) fn move_to_end(&mut self, priority: Option<i32>, job: &Arc<ServerJob>) {
        let Some(bucket) = self.buckets.get_mut(&priority) else {
            return;
        };
        if let Some(position) = bucket.iter().position(|j| Arc::ptr_eq(j, job)) {
            if let Some(job) = bucket.remove(position) {
                bucket.push_back(job);
            }
        }
    }

    /// Whether a job is present under the given priority.
    pub(crate) fn contains(&self, priority: Option<i32>, job: &Arc<ServerJob>) -> bool {
        self.buckets
            .get(&priority)
            .is_some_and(|bucket| bucket.iter().any(|j| Arc::ptr_eq(j, job)))
    }

    /// Iterate all jobs, highest priority first, FIFO within a priority.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<ServerJob>> {
        self.buckets.values().rev().flatten()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of queued jobs. Walks the buckets.
    pub(crate) fn size(&self) -> usize {
        self.buckets.values().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
#[path = "priority_map_tests.rs"]
mod tests;
