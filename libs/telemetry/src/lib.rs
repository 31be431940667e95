//! Logging and metric helpers shared by the dispatch crates.
//!
//! Binaries call [`install`] once at start-up; libraries only emit `tracing` events and go
//! through [`record_dispatch`] / [`record_retry`] for counters so label names stay consistent.

use anyhow::Result;

mod config;
mod context;
mod metrics;
mod tracing_init;

pub use config::TelemetryConfig;
pub use context::{Channel, DispatchLabels, DispatchOutcome};
pub use metrics::{
    DISPATCH_ATTEMPTS, DISPATCH_TOTAL, RETRY_BACKOFF_TOTAL, record_counter, record_dispatch,
    record_histogram, record_retry,
};
pub use tracing_init::{init_telemetry, telemetry_initialized};

/// Installs the process-wide subscriber configured from `LOG_FORMAT` and `RUST_LOG`.
pub fn install(service_name: &str) -> Result<()> {
    init_telemetry(TelemetryConfig::from_env(service_name))
}
