//! Worker channel identity and capability descriptors.
//!
//! A channel is the driver-side abstraction of one live connection to a
//! worker process. The transport itself lives outside this crate; the queue
//! and dispatch tracker only need a stable identity and the capability
//! snapshot that execution policies evaluate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a worker channel, usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Capability snapshot of a worker process, as reported at handshake time.
///
/// Execution policies are opaque predicates over these properties; the core
/// never interprets individual keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemInformation {
    properties: HashMap<String, serde_json::Value>,
}

impl SystemInformation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a capability property, returning self for chained construction.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    /// Convenience accessor for string-valued properties.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    /// Convenience accessor for integer-valued properties.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.properties.get(key).and_then(|v| v.as_i64())
    }
}

/// Descriptor of one worker channel: identity plus capability snapshot.
#[derive(Debug, Clone)]
pub struct ChannelDescriptor {
    pub id: ChannelId,
    pub system_information: SystemInformation,
}

impl ChannelDescriptor {
    pub fn new(system_information: SystemInformation) -> Self {
        Self { id: ChannelId::new(), system_information }
    }
}
