use std::sync::OnceLock;

use anyhow::Result;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::TelemetryConfig;

static INIT: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber. Later calls are no-ops, as is losing the race against
/// a subscriber installed elsewhere (for example by a test harness).
pub fn init_telemetry(cfg: TelemetryConfig) -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let fmt_layer = if cfg.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();

    INIT.set(()).ok();
    tracing::debug!(
        service = %cfg.service_name,
        environment = %cfg.environment,
        json = cfg.json_logs,
        "telemetry initialised"
    );
    Ok(())
}

pub fn telemetry_initialized() -> bool {
    INIT.get().is_some()
}
