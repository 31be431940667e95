use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_SMS_TEMPLATE: &str = "Your message is {message}";
pub const DEFAULT_VOICE_TEMPLATE: &str = "Your message is {message}";

pub const ENV_DEFAULT_PROVIDER: &str = "SMS_DEFAULT_PROVIDER";
pub const ENV_RETRY_ATTEMPTS: &str = "SMS_RETRY_ATTEMPTS";
pub const ENV_RETRY_DELAY: &str = "SMS_RETRY_DELAY";
pub const ENV_HTTP_TIMEOUT: &str = "SMS_HTTP_TIMEOUT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml_bw::Error,
    },
    #[error("failed to parse JSON config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("default provider is required")]
    MissingDefaultProvider,
    #[error("at least one provider must be configured")]
    NoProvidersConfigured,
    #[error("default provider '{0}' not found in configured providers")]
    UnknownDefaultProvider(String),
    #[error("HTTP timeout must be greater than 0")]
    InvalidHttpTimeout,
    #[error("retry attempts must be at least 1")]
    InvalidRetryAttempts,
    #[error("retry delay must be greater than 0")]
    InvalidRetryDelay,
    #[error("SMS template is required")]
    MissingSmsTemplate,
    #[error("voice template is required")]
    MissingVoiceTemplate,
    #[error("provider {0} not found in configuration")]
    ProviderNotConfigured(String),
    #[error("invalid configuration for provider {provider}: {message}")]
    InvalidProviderSection { provider: String, message: String },
}

/// Settings shared by the dispatch registry and the bundled backends.
///
/// Duration fields are written the way Go spells them (`10s`, `500ms`, `1m30s`).
/// Backend sections under `providers` stay untyped until a backend asks for its
/// own view through [`DispatchConfig::provider_section`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub default_provider: String,
    #[serde(
        default = "default_http_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub http_timeout: Duration,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(
        default = "default_retry_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub retry_delay: Duration,
    #[serde(default = "default_sms_template")]
    pub sms_template: String,
    #[serde(default = "default_voice_template")]
    pub voice_template: String,
    #[serde(default)]
    pub providers: BTreeMap<String, Value>,
}

fn default_http_timeout() -> Duration {
    DEFAULT_HTTP_TIMEOUT
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

fn default_sms_template() -> String {
    DEFAULT_SMS_TEMPLATE.to_string()
}

fn default_voice_template() -> String {
    DEFAULT_VOICE_TEMPLATE.to_string()
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_provider: String::new(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            sms_template: default_sms_template(),
            voice_template: default_voice_template(),
            providers: BTreeMap::new(),
        }
    }
}

impl DispatchConfig {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            default_provider: default_provider.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_provider(mut self, name: impl Into<String>, section: Value) -> Self {
        self.providers.insert(name.into(), section);
        self
    }

    /// Reads, overrides from the environment and validates a config file.
    ///
    /// Files ending in `.json` are parsed as JSON, anything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let mut config = if is_json {
            Self::from_json_str(&raw).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Self::from_yaml_str(&raw).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        };
        config.apply_env_overrides()?;
        config.validate()?;
        debug!(
            path = %path.display(),
            default_provider = %config.default_provider,
            providers = config.providers.len(),
            "dispatch config loaded"
        );
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml_bw::Error> {
        serde_yaml_bw::from_str(raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_with(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup; blank values are ignored.
    pub fn apply_overrides_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(provider) = get(ENV_DEFAULT_PROVIDER) {
            self.default_provider = provider.trim().to_string();
        }
        if let Some(raw) = get(ENV_RETRY_ATTEMPTS) {
            self.retry_attempts = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: ENV_RETRY_ATTEMPTS,
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = get(ENV_RETRY_DELAY) {
            self.retry_delay = parse_duration(raw.trim()).ok_or(ConfigError::InvalidEnv {
                key: ENV_RETRY_DELAY,
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = get(ENV_HTTP_TIMEOUT) {
            self.http_timeout = parse_duration(raw.trim()).ok_or(ConfigError::InvalidEnv {
                key: ENV_HTTP_TIMEOUT,
                value: raw.clone(),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_provider.is_empty() {
            return Err(ConfigError::MissingDefaultProvider);
        }
        if self.providers.is_empty() {
            return Err(ConfigError::NoProvidersConfigured);
        }
        if !self.providers.contains_key(&self.default_provider) {
            return Err(ConfigError::UnknownDefaultProvider(
                self.default_provider.clone(),
            ));
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::InvalidHttpTimeout);
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts);
        }
        if self.retry_delay.is_zero() {
            return Err(ConfigError::InvalidRetryDelay);
        }
        if self.sms_template.is_empty() {
            return Err(ConfigError::MissingSmsTemplate);
        }
        if self.voice_template.is_empty() {
            return Err(ConfigError::MissingVoiceTemplate);
        }
        Ok(())
    }

    /// Raw section configured for backend `name`.
    pub fn provider_value(&self, name: &str) -> Result<&Value, ConfigError> {
        self.providers
            .get(name)
            .ok_or_else(|| ConfigError::ProviderNotConfigured(name.to_string()))
    }

    /// Deserializes the section configured for backend `name` into `T`.
    pub fn provider_section<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigError> {
        let value = self.provider_value(name)?;
        if !value.is_object() {
            return Err(ConfigError::InvalidProviderSection {
                provider: name.to_string(),
                message: "expected a mapping".into(),
            });
        }
        T::deserialize(value).map_err(|err| ConfigError::InvalidProviderSection {
            provider: name.to_string(),
            message: err.to_string(),
        })
    }
}

/// Checks that every field in `required` is present in `section` and, when it is a string,
/// not empty. The first offending field is reported.
pub fn require_fields(provider: &str, section: &Value, required: &[&str]) -> Result<(), ConfigError> {
    for field in required {
        let message = match section.get(field) {
            None | Some(Value::Null) => format!("missing required field: {field}"),
            Some(Value::String(text)) if text.is_empty() => {
                format!("field {field} cannot be empty")
            }
            Some(_) => continue,
        };
        return Err(ConfigError::InvalidProviderSection {
            provider: provider.to_string(),
            message,
        });
    }
    Ok(())
}

/// Parses a Go-style duration such as `300ms`, `1.5s` or `1h2m3s`.
///
/// Negative values and unitless numbers other than `0` are rejected.
///
/// ```
/// use std::time::Duration;
/// use sms_core::parse_duration;
///
/// assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
/// assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
/// assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
/// assert_eq!(parse_duration("10"), None);
/// ```
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let mut rest = raw.trim();
    if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }
    if rest == "0" {
        return Some(Duration::ZERO);
    }
    if rest.is_empty() || rest.starts_with('-') {
        return None;
    }

    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return None,
        };
        total_nanos = total_nanos.checked_add(scaled_nanos(number, scale)?)?;
        rest = tail;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000).ok()?;
    let nanos = u32::try_from(total_nanos % 1_000_000_000).ok()?;
    Some(Duration::new(secs, nanos))
}

fn scaled_nanos(number: &str, scale: u128) -> Option<u128> {
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;
    let mut divisor: u128 = 1;
    for digit in fraction.chars() {
        let digit = u128::from(digit.to_digit(10)?);
        divisor = divisor.checked_mul(10)?;
        if divisor > 1_000_000_000_000_000_000 {
            break;
        }
        nanos = nanos.checked_add(digit * scale / divisor)?;
    }
    Some(nanos)
}

/// Renders a duration the way [`parse_duration`] reads it back.
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }
    let millis = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
        return format!("{}ns", duration.as_nanos());
    }
    if millis % 1_000 != 0 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3_600, (secs % 3_600) / 60, secs % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }
    out
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a duration string such as \"10s\" or \"500ms\"")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            parse_duration(value)
                .ok_or_else(|| E::custom(format!("invalid duration {value:?}")))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
            if value == 0 {
                Ok(Duration::ZERO)
            } else {
                Err(E::custom(format!(
                    "duration {value} is missing a unit (ns, us, ms, s, m, h)"
                )))
            }
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
            if value == 0 {
                Ok(Duration::ZERO)
            } else {
                Err(E::custom(format!(
                    "duration {value} is missing a unit (ns, us, ms, s, m, h)"
                )))
            }
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}
