//! Histogram of queued job sizes with an O(1) maximum.
//!
//! The queue updates the histogram as jobs enter, shrink and leave; pollers
//! read the cached maximum without touching the queue lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::warn;

/// Counts of queued jobs by task count, plus a cached maximum.
#[derive(Default)]
pub(crate) struct SizeInfo {
    counts: Mutex<BTreeMap<usize, usize>>,
    max: AtomicUsize,
}

impl SizeInfo {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record one more job of the given size.
    pub(crate) fn increment(&self, size: usize) {
        let mut counts = self.counts.lock();
        *counts.entry(size).or_insert(0) += 1;
        self.max.fetch_max(size, Ordering::AcqRel);
    }

    /// Record one fewer job of the given size. A missing entry indicates the
    /// caller's bookkeeping drifted; logged, not fatal.
    pub(crate) fn decrement(&self, size: usize) {
        let mut counts = self.counts.lock();
        match counts.get_mut(&size) {
            Some(count) if *count > 1 => {
                *count -= 1;
            }
            Some(_) => {
                counts.remove(&size);
                // Recompute the maximum if its last occupant just left.
                if size == self.max.load(Ordering::Acquire) {
                    let new_max = counts.last_key_value().map(|(s, _)| *s).unwrap_or(0);
                    self.max.store(new_max, Ordering::Release);
                }
            }
            None => {
                warn!(size, "size histogram decrement for absent size");
            }
        }
    }

    /// Largest task count currently queued. O(1); reads the cached value.
    pub(crate) fn max(&self) -> usize {
        self.max.load(Ordering::Acquire)
    }
}
