use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sms_core::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_SMS_TEMPLATE, DEFAULT_VOICE_TEMPLATE,
    DispatchConfig, SendSmsRequest, SendSmsResponse, SendVoiceRequest, SendVoiceResponse,
    ValidationError,
};
use sms_retry::{
    CancelReason, Cancellation, DEFAULT_MAX_DELAY, DEFAULT_MULTIPLIER, RetryError, RetryOutcome,
    RetryPolicy, execute,
};
use sms_telemetry::{Channel, DispatchOutcome, record_dispatch, record_retry};
use thiserror::Error;
use tracing::{Span, debug, info, instrument};

use crate::errors::ProviderError;
use crate::traits::Provider;

/// Dispatch operation named in errors, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SendSms,
    SendVoiceCall,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SendSms => "send_sms",
            Operation::SendVoiceCall => "send_voice_call",
        }
    }

    fn channel(&self) -> Channel {
        match self {
            Operation::SendSms => Channel::Sms,
            Operation::SendVoiceCall => Channel::Voice,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("provider `{0}` already registered")]
    AlreadyRegistered(String),
    #[error("provider `{0}` not found")]
    NotFound(String),
    #[error("no active provider configured")]
    NoActiveProvider,
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
    #[error("{operation} failed after {attempts} attempts: maximum retry attempts reached: {source}")]
    AttemptsExhausted {
        operation: Operation,
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Delivery {
        operation: Operation,
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    #[error("{operation} {reason} after {attempts} attempt(s)")]
    Cancelled {
        operation: Operation,
        attempts: u32,
        reason: CancelReason,
    },
}

impl DispatchError {
    /// Backend attempts made before the call failed, for failures that reached a backend.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            DispatchError::AttemptsExhausted { attempts, .. }
            | DispatchError::Delivery { attempts, .. }
            | DispatchError::Cancelled { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            DispatchError::AttemptsExhausted { source, .. }
            | DispatchError::Delivery { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Session-wide dispatch behaviour derived from [`DispatchConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySettings {
    /// Backend that becomes active as soon as it is registered.
    pub default_provider: Option<String>,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub sms_template: String,
    pub voice_template: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_provider: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            sms_template: DEFAULT_SMS_TEMPLATE.to_string(),
            voice_template: DEFAULT_VOICE_TEMPLATE.to_string(),
        }
    }
}

impl RegistrySettings {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            default_provider: Some(config.default_provider.clone())
                .filter(|name| !name.is_empty()),
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay,
            sms_template: config.sms_template.clone(),
            voice_template: config.voice_template.clone(),
            ..Self::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy<ProviderError> {
        RetryPolicy::new(self.retry_attempts, self.retry_delay)
            .max_delay(self.max_delay)
            .multiplier(self.multiplier)
    }
}

#[derive(Default)]
struct RegistryState {
    providers: HashMap<String, Arc<dyn Provider>>,
    active: Option<String>,
}

/// Named backends plus the active selection, shared through `Arc`.
///
/// The internal lock is only held while the map or the active name is read or written,
/// never while a backend call is in flight.
#[derive(Default)]
pub struct ProviderRegistry {
    settings: RegistrySettings,
    state: Mutex<RegistryState>,
}

impl ProviderRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            settings,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(RegistrySettings::from_config(config))
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a backend under its own name.
    ///
    /// The first backend registered becomes active, and so does a later one whose name
    /// matches the configured default.
    pub fn register(&self, provider: Arc<dyn Provider>) -> Result<(), DispatchError> {
        let name = provider.name().to_string();
        let mut state = self.state();
        if state.providers.contains_key(&name) {
            return Err(DispatchError::AlreadyRegistered(name));
        }
        state.providers.insert(name.clone(), provider);

        let is_default = self.settings.default_provider.as_deref() == Some(name.as_str());
        if state.active.is_none() || is_default {
            debug!(provider = %name, is_default, "provider registered and activated");
            state.active = Some(name);
        } else {
            debug!(provider = %name, "provider registered");
        }
        Ok(())
    }

    pub fn switch_provider(&self, name: &str) -> Result<(), DispatchError> {
        let mut state = self.state();
        if !state.providers.contains_key(name) {
            return Err(DispatchError::NotFound(name.to_string()));
        }
        let previous = state.active.replace(name.to_string());
        info!(provider = name, previous = ?previous, "active provider switched");
        Ok(())
    }

    pub fn provider(&self, name: &str) -> Result<Arc<dyn Provider>, DispatchError> {
        self.state()
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| DispatchError::NotFound(name.to_string()))
    }

    pub fn active_provider(&self) -> Result<Arc<dyn Provider>, DispatchError> {
        let state = self.state();
        state
            .active
            .as_ref()
            .and_then(|name| state.providers.get(name))
            .cloned()
            .ok_or(DispatchError::NoActiveProvider)
    }

    pub fn active_name(&self) -> Option<String> {
        self.state().active.clone()
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sends a text message through the active backend, retrying transient failures.
    #[instrument(
        name = "sms.send_sms",
        skip_all,
        fields(provider = tracing::field::Empty, to = %request.message.to(), attempts = tracing::field::Empty)
    )]
    pub async fn send_sms(
        &self,
        cancellation: &Cancellation,
        request: &SendSmsRequest,
    ) -> Result<SendSmsResponse, DispatchError> {
        let operation = Operation::SendSms;
        let provider = self.prepare(operation, || request.validate())?;

        let request = match request.template {
            Some(_) => Cow::Borrowed(request),
            None => Cow::Owned(
                request
                    .clone()
                    .with_template(self.settings.sms_template.clone()),
            ),
        };
        let request = request.as_ref();
        let backend = provider.as_ref();
        let outcome = execute(cancellation, &self.settings.retry_policy(), |attempt| async move {
            debug!(attempt, "sms attempt");
            backend.send_sms(cancellation, request).await
        })
        .await;

        let mut response = self.finish(operation, provider.name(), outcome)?;
        if response.provider.is_empty() {
            response.provider = provider.name().to_string();
        }
        Ok(response)
    }

    /// Starts a voice call through the active backend, retrying transient failures.
    #[instrument(
        name = "sms.send_voice_call",
        skip_all,
        fields(provider = tracing::field::Empty, to = %request.message.to(), attempts = tracing::field::Empty)
    )]
    pub async fn send_voice_call(
        &self,
        cancellation: &Cancellation,
        request: &SendVoiceRequest,
    ) -> Result<SendVoiceResponse, DispatchError> {
        let operation = Operation::SendVoiceCall;
        let provider = self.prepare(operation, || request.validate())?;

        let request = match request.template {
            Some(_) => Cow::Borrowed(request),
            None => Cow::Owned(
                request
                    .clone()
                    .with_template(self.settings.voice_template.clone()),
            ),
        };
        let request = request.as_ref();
        let backend = provider.as_ref();
        let outcome = execute(cancellation, &self.settings.retry_policy(), |attempt| async move {
            debug!(attempt, "voice attempt");
            backend.send_voice_call(cancellation, request).await
        })
        .await;

        let mut response = self.finish(operation, provider.name(), outcome)?;
        if response.provider.is_empty() {
            response.provider = provider.name().to_string();
        }
        Ok(response)
    }

    /// Snapshots the active backend and validates the request before any backend call.
    fn prepare<V>(&self, operation: Operation, validate: V) -> Result<Arc<dyn Provider>, DispatchError>
    where
        V: FnOnce() -> Result<(), ValidationError>,
    {
        let provider = self.active_provider()?;
        Span::current().record("provider", provider.name());
        if let Err(err) = validate() {
            debug!(field = err.field, "request rejected by validation");
            record_dispatch(
                provider.name(),
                operation.channel(),
                DispatchOutcome::Invalid,
                0,
            );
            return Err(err.into());
        }
        Ok(provider)
    }

    fn finish<T>(
        &self,
        operation: Operation,
        provider: &str,
        outcome: RetryOutcome<T, ProviderError>,
    ) -> Result<T, DispatchError> {
        let attempts = outcome.attempts;
        let channel = operation.channel();
        Span::current().record("attempts", attempts);
        record_retry(provider, channel, &outcome.delays);

        let (result, dispatch_outcome) = match outcome.result {
            Ok(value) => (Ok(value), DispatchOutcome::Delivered),
            Err(RetryError::Exhausted(source)) => (
                Err(DispatchError::AttemptsExhausted {
                    operation,
                    attempts,
                    source,
                }),
                DispatchOutcome::Exhausted,
            ),
            Err(RetryError::Permanent(source)) => (
                Err(DispatchError::Delivery {
                    operation,
                    attempts,
                    source,
                }),
                DispatchOutcome::Rejected,
            ),
            Err(RetryError::Cancelled(reason)) => (
                Err(DispatchError::Cancelled {
                    operation,
                    attempts,
                    reason,
                }),
                DispatchOutcome::Cancelled,
            ),
            Err(RetryError::InvalidPolicy(reason)) => (
                Err(DispatchError::InvalidPolicy(reason)),
                DispatchOutcome::Invalid,
            ),
        };

        record_dispatch(provider, channel, dispatch_outcome, attempts);
        match &result {
            Ok(_) => info!(%operation, provider, attempts, "dispatch succeeded"),
            Err(err) => info!(%operation, provider, attempts, error = %err, "dispatch failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sms_core::{CallStatus, Message, MessageStatus};

    struct Named(&'static str);

    #[async_trait]
    impl Provider for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn send_sms(
            &self,
            _cancellation: &Cancellation,
            request: &SendSmsRequest,
        ) -> Result<SendSmsResponse, ProviderError> {
            Ok(SendSmsResponse::new(request.render(""), MessageStatus::Sent))
        }

        async fn send_voice_call(
            &self,
            _cancellation: &Cancellation,
            _request: &SendVoiceRequest,
        ) -> Result<SendVoiceResponse, ProviderError> {
            Ok(SendVoiceResponse::new("call", CallStatus::Queued))
        }
    }

    #[test]
    fn settings_follow_config() {
        let mut config = DispatchConfig::new("esms");
        config.retry_attempts = 5;
        config.retry_delay = Duration::from_millis(50);
        config.sms_template = "SMS {message}".into();
        let settings = RegistrySettings::from_config(&config);
        assert_eq!(settings.default_provider.as_deref(), Some("esms"));
        assert_eq!(settings.retry_attempts, 5);
        assert_eq!(settings.max_delay, Duration::from_secs(30));
        assert_eq!(settings.multiplier, 2.0);
        assert_eq!(settings.sms_template, "SMS {message}");

        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(50));
    }

    #[test]
    fn default_provider_takes_over_on_registration() {
        let registry = ProviderRegistry::new(RegistrySettings {
            default_provider: Some("b".into()),
            ..RegistrySettings::default()
        });
        registry.register(Arc::new(Named("a"))).unwrap();
        assert_eq!(registry.active_name().as_deref(), Some("a"));
        registry.register(Arc::new(Named("b"))).unwrap();
        assert_eq!(registry.active_name().as_deref(), Some("b"));
        registry.register(Arc::new(Named("c"))).unwrap();
        assert_eq!(registry.active_name().as_deref(), Some("b"));
        assert_eq!(registry.names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn default_template_applies_only_when_missing() {
        let registry = ProviderRegistry::new(RegistrySettings {
            sms_template: "default {message}".into(),
            ..RegistrySettings::default()
        });
        registry.register(Arc::new(Named("echo"))).unwrap();
        let message = Message::new("ACME", "+15551234567", "tests");

        let request = SendSmsRequest::new(message.clone()).with_data("message", "hi");
        let response = registry
            .send_sms(&Cancellation::never(), &request)
            .await
            .unwrap();
        assert_eq!(response.message_id, "default hi");
        assert_eq!(response.provider, "echo");

        let request = request.with_template("own {message}");
        let response = registry
            .send_sms(&Cancellation::never(), &request)
            .await
            .unwrap();
        assert_eq!(response.message_id, "own hi");
    }

    #[test]
    fn error_accessors() {
        let err = DispatchError::Delivery {
            operation: Operation::SendSms,
            attempts: 1,
            source: ProviderError::rejected("x", "no"),
        };
        assert_eq!(err.attempts(), Some(1));
        assert_eq!(err.provider_error().map(ProviderError::code), Some("x"));
        assert_eq!(err.to_string(), "send_sms failed after 1 attempt(s): x: no");
        assert_eq!(DispatchError::NoActiveProvider.attempts(), None);
    }
}
