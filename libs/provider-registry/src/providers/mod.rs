//! Bundled HTTP backends.
//!
//! Every backend reads its own section from [`DispatchConfig::providers`] and uses the shared
//! `http_timeout`. A `base_url` starting with `mock://<scenario>` short-circuits the network:
//! `success` answers with a canned response, `throttle` fails with 429, `server_error` with
//! 503 and `rejected` with 400.

use std::sync::Arc;

use anyhow::Context;
use sms_core::DispatchConfig;
use tracing::warn;

use crate::registry::ProviderRegistry;
use crate::traits::Provider;

#[cfg(any(feature = "twilio", feature = "esms", feature = "speedsms"))]
pub(crate) mod http;

#[cfg(feature = "esms")]
pub mod esms;

#[cfg(feature = "speedsms")]
pub mod speedsms;

#[cfg(feature = "twilio")]
pub mod twilio;

/// Backend names this build can construct.
pub fn supported() -> Vec<&'static str> {
    let mut names = Vec::new();
    #[cfg(feature = "esms")]
    names.push(esms::PROVIDER_NAME);
    #[cfg(feature = "speedsms")]
    names.push(speedsms::PROVIDER_NAME);
    #[cfg(feature = "twilio")]
    names.push(twilio::PROVIDER_NAME);
    names
}

/// Constructs the backend called `name` from its configuration section, or `None` when
/// this build has no backend by that name.
pub fn build(name: &str, config: &DispatchConfig) -> anyhow::Result<Option<Arc<dyn Provider>>> {
    let provider: Arc<dyn Provider> = match name {
        #[cfg(feature = "twilio")]
        twilio::PROVIDER_NAME => Arc::new(
            twilio::TwilioProvider::from_config(config)
                .context("failed to build twilio provider")?,
        ),
        #[cfg(feature = "esms")]
        esms::PROVIDER_NAME => Arc::new(
            esms::EsmsProvider::from_config(config).context("failed to build esms provider")?,
        ),
        #[cfg(feature = "speedsms")]
        speedsms::PROVIDER_NAME => Arc::new(
            speedsms::SpeedSmsProvider::from_config(config)
                .context("failed to build speedsms provider")?,
        ),
        _ => return Ok(None),
    };
    Ok(Some(provider))
}

/// Builds and registers every configured backend this build supports.
///
/// Sections naming unknown backends are skipped with a warning. Returns the names that
/// were registered, in configuration order.
pub fn register_configured(
    registry: &ProviderRegistry,
    config: &DispatchConfig,
) -> anyhow::Result<Vec<String>> {
    let mut registered = Vec::new();
    for name in config.providers.keys() {
        let Some(provider) = build(name, config)? else {
            warn!(provider = %name, "no backend available for configured provider; skipping");
            continue;
        };
        registry
            .register(provider)
            .with_context(|| format!("failed to register provider {name}"))?;
        registered.push(name.clone());
    }
    Ok(registered)
}
