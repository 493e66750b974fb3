//! Driver configuration loading from environment variables.
//!
//! All values come from `GRID_*` environment variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `GRID_EVENT_QUEUE_CAPACITY` | 1024 | Buffered job notifications |
//! | `GRID_EVENT_OVERFLOW` | block | Overflow policy: `block` or `drop` |
//! | `GRID_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |

use std::time::Duration;

use crate::dispatch::{EventQueueConfig, OverflowPolicy};

/// All driver configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub event_queue: EventQueueConfig,
    pub shutdown_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { event_queue: EventQueueConfig::default(), shutdown_timeout: Duration::from_secs(30) }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Load event queue configuration from environment.
fn load_event_queue_config() -> EventQueueConfig {
    let defaults = EventQueueConfig::default();
    let capacity = parse_usize("GRID_EVENT_QUEUE_CAPACITY", defaults.capacity).max(1);
    let overflow = match std::env::var("GRID_EVENT_OVERFLOW").as_deref() {
        Ok("drop") => OverflowPolicy::DropNewest,
        Ok("block") => OverflowPolicy::Block,
        _ => defaults.overflow,
    };
    EventQueueConfig { capacity, overflow }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> DriverConfig {
    let shutdown_secs = parse_u64("GRID_SHUTDOWN_TIMEOUT", 30).max(1);
    DriverConfig {
        event_queue: load_event_queue_config(),
        shutdown_timeout: Duration::from_secs(shutdown_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] =
        &["GRID_EVENT_QUEUE_CAPACITY", "GRID_EVENT_OVERFLOW", "GRID_SHUTDOWN_TIMEOUT"];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.event_queue.capacity, 1024);
        assert_eq!(cfg.event_queue.overflow, OverflowPolicy::Block);
        assert_eq!(cfg.shutdown_timeout.as_secs(), 30);
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("GRID_EVENT_QUEUE_CAPACITY", "64");
        std::env::set_var("GRID_EVENT_OVERFLOW", "drop");
        std::env::set_var("GRID_SHUTDOWN_TIMEOUT", "5");
        let cfg = load();
        assert_eq!(cfg.event_queue.capacity, 64);
        assert_eq!(cfg.event_queue.overflow, OverflowPolicy::DropNewest);
        assert_eq!(cfg.shutdown_timeout.as_secs(), 5);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("GRID_EVENT_QUEUE_CAPACITY", "not_a_number");
        std::env::set_var("GRID_EVENT_OVERFLOW", "explode");
        let cfg = load();
        assert_eq!(cfg.event_queue.capacity, 1024);
        assert_eq!(cfg.event_queue.overflow, OverflowPolicy::Block);
        clear_env_vars();
    }

    #[test]
    fn test_capacity_floor() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("GRID_EVENT_QUEUE_CAPACITY", "0");
        let cfg = load();
        assert!(cfg.event_queue.capacity >= 1, "capacity must have a floor");
        clear_env_vars();
    }
}
