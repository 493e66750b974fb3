//! Opaque per-job metadata with a key set that freezes once the job starts
//! executing.
//!
//! Reads hand out a cheap `Arc` snapshot; writes build a new map
//! (copy-on-write) so concurrent readers never observe a partial update.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::JobError;

/// Immutable key/value bag attached to a job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobMetadata {
    entries: HashMap<String, serde_json::Value>,
}

impl JobMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Copy-on-write holder for a job's metadata.
#[derive(Debug)]
pub(crate) struct MetadataCell {
    current: Mutex<Arc<JobMetadata>>,
}

impl MetadataCell {
    pub(crate) fn new(metadata: JobMetadata) -> Self {
        Self { current: Mutex::new(Arc::new(metadata)) }
    }

    /// Snapshot of the current metadata. Cheap; never blocks writers for long.
    pub(crate) fn snapshot(&self) -> Arc<JobMetadata> {
        Arc::clone(&self.current.lock())
    }

    /// Replace the value under `key`. When `frozen` is true (job is executing
    /// or finished), only existing keys may be written; inserting a new key
    /// fails with [`JobError::MetadataFrozen`].
    pub(crate) fn set(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
        frozen: bool,
    ) -> Result<(), JobError> {
        let key = key.into();
        let mut guard = self.current.lock();
        if frozen && !guard.contains_key(&key) {
            return Err(JobError::MetadataFrozen { key });
        }
        let mut next = (**guard).clone();
        next.entries.insert(key, value);
        *guard = Arc::new(next);
        Ok(())
    }
}
