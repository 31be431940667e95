use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub environment: String,
    pub json_logs: bool,
    /// Directive used when `RUST_LOG` is unset or unparsable.
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str) -> Self {
        Self::from_lookup(default_service_name, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(default_service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_name = lookup("SERVICE_NAME")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_service_name.to_string());
        let environment = lookup("DEPLOYMENT_ENV").unwrap_or_else(|| "dev".into());
        let json_logs = lookup("LOG_FORMAT")
            .map(|v| !matches!(v.to_lowercase().as_str(), "text" | "pretty" | "plain"))
            .unwrap_or(true);

        Self {
            service_name,
            environment,
            json_logs,
            default_filter: "info".into(),
        }
    }

    #[must_use]
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}
