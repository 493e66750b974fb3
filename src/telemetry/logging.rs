//! Logging configuration and initialization.
//!
//! JSON output for production, pretty printing for development, with an
//! optional file target. The filter string follows `tracing_subscriber`'s
//! `EnvFilter` syntax.

use std::path::PathBuf;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging (default for production).
    #[default]
    Json,
    /// Human-readable pretty printing (for development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive, e.g. "info" or "grid_core=debug".
    pub level: String,
    /// Log file target. Logs go to stderr when unset.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { format: LogFormat::Json, level: "info".to_string(), output_path: None }
    }
}

impl LogConfig {
    /// Build from `GRID_LOG_LEVEL`, `GRID_LOG_FORMAT` ("json" or "pretty")
    /// and `GRID_LOG_FILE`. Unset or unrecognized values fall back to the
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let format = match std::env::var("GRID_LOG_FORMAT").as_deref() {
            Ok("pretty") => LogFormat::Pretty,
            Ok("json") => LogFormat::Json,
            _ => defaults.format,
        };
        Self {
            format,
            level: std::env::var("GRID_LOG_LEVEL").unwrap_or(defaults.level),
            output_path: std::env::var("GRID_LOG_FILE").ok().map(PathBuf::from),
        }
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Initialize the global tracing subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter =
        EnvFilter::try_new(&config.level).map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let registry = tracing_subscriber::registry().with(filter);

    let writer: Option<std::sync::Mutex<std::fs::File>> = match &config.output_path {
        Some(path) => {
            let file =
                std::fs::File::create(path).map_err(|e| LogError::FileOpen(e.to_string()))?;
            Some(std::sync::Mutex::new(file))
        }
        None => None,
    };

    let result = match (config.format, writer) {
        (LogFormat::Json, Some(writer)) => {
            registry.with(fmt::layer().json().with_writer(writer)).try_init()
        }
        (LogFormat::Json, None) => registry.with(fmt::layer().json()).try_init(),
        (LogFormat::Pretty, Some(writer)) => {
            registry.with(fmt::layer().pretty().with_writer(writer)).try_init()
        }
        (LogFormat::Pretty, None) => registry.with(fmt::layer().pretty()).try_init(),
    };
    result.map_err(|_| LogError::AlreadyInitialized)
}
