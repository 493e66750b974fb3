//! Structured logging and metrics for the grid driver core.
//!
//! Logging goes through `tracing`; metrics through the `metrics` facade so
//! the embedding application chooses the recorder.

mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::init_metrics;
