use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sms_core::{
    ConfigError, DispatchConfig, MessageStatus, SendSmsRequest, SendSmsResponse, SendVoiceRequest,
    SendVoiceResponse, require_fields,
};
use sms_retry::Cancellation;
use time::OffsetDateTime;
use tracing::debug;

use super::http;
use crate::errors::ProviderError;
use crate::traits::Provider;

pub const PROVIDER_NAME: &str = "speedsms";
const PREFIX: &str = "speedsms";
const FALLBACK_TEMPLATE: &str = "{message}";
const MIN_TOKEN_LEN: usize = 20;

const SEND_SMS_ENDPOINT: &str = "/sms/send";
const BALANCE_ENDPOINT: &str = "/user/balance";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpeedSmsConfig {
    pub token: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default = "default_sms_type")]
    pub sms_type: u8,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_sms_type() -> u8 {
    2
}

fn default_base_url() -> String {
    "https://api.speedsms.vn/index.php".into()
}

impl SpeedSmsConfig {
    pub fn from_dispatch_config(config: &DispatchConfig) -> Result<Self, ConfigError> {
        let section = config.provider_value(PROVIDER_NAME)?;
        require_fields(PROVIDER_NAME, section, &["token"])?;
        let parsed: Self = config.provider_section(PROVIDER_NAME)?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidProviderSection {
            provider: PROVIDER_NAME.into(),
            message: message.into(),
        };
        if self.token.is_empty() {
            return Err(invalid("speedsms token is required"));
        }
        if self.token.len() < MIN_TOKEN_LEN {
            return Err(invalid("speedsms token appears to be invalid (too short)"));
        }
        if !matches!(self.sms_type, 2 | 4 | 8) {
            return Err(invalid("invalid sms_type value, must be 2, 4, or 8"));
        }
        if !(self.base_url.starts_with("http") || self.base_url.starts_with("mock://")) {
            return Err(invalid("base_url must start with http:// or https://"));
        }
        Ok(())
    }
}

pub struct SpeedSmsProvider {
    client: Client,
    config: SpeedSmsConfig,
}

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    to: [&'a str; 1],
    content: &'a str,
    sms_type: i64,
    #[serde(skip_serializing_if = "is_blank")]
    sender: &'a str,
}

fn is_blank(value: &&str) -> bool {
    value.is_empty()
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct SpeedSmsReply {
    #[serde(default)]
    status: String,
    #[serde(default)]
    code: Value,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceReply {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: f64,
}

impl SpeedSmsProvider {
    pub fn new(config: SpeedSmsConfig, http_timeout: Duration) -> Result<Self, ProviderError> {
        let client = http::build_client(PREFIX, http_timeout)?;
        Ok(Self { client, config })
    }

    pub fn from_config(config: &DispatchConfig) -> Result<Self, ProviderError> {
        let speedsms = SpeedSmsConfig::from_dispatch_config(config).map_err(|err| {
            ProviderError::rejected("speedsms_config", err.to_string()).with_source(err)
        })?;
        Self::new(speedsms, config.http_timeout)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.config.base_url.trim_end_matches('/'))
    }

    /// Remaining account credit.
    pub async fn balance(&self, cancellation: &Cancellation) -> Result<f64, ProviderError> {
        if let Some(scenario) = http::mock_scenario(&self.config.base_url) {
            return match http::mock_failure(PREFIX, scenario) {
                Some(err) => Err(err),
                None => Ok(0.0),
            };
        }
        let request = self
            .client
            .get(self.url(BALANCE_ENDPOINT))
            .basic_auth(&self.config.token, Some("x"));
        let reply = http::send(cancellation, request, PREFIX).await?;
        let (balance, _raw): (BalanceReply, Value) = reply.json(PREFIX)?;
        if balance.status != "success" {
            return Err(ProviderError::rejected(
                "speedsms_balance",
                format!("error getting balance: {}", balance.message),
            ));
        }
        Ok(balance.data)
    }
}

/// `sms_<ids>_<unix>` when the API returned transaction ids, else `sms_<unix nanos>`.
fn message_id(data: &[String], now: OffsetDateTime) -> String {
    if data.is_empty() {
        format!("sms_{}", now.unix_timestamp_nanos())
    } else {
        format!("sms_{}_{}", data.join("_"), now.unix_timestamp())
    }
}

#[async_trait]
impl Provider for SpeedSmsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn send_sms(
        &self,
        cancellation: &Cancellation,
        request: &SendSmsRequest,
    ) -> Result<SendSmsResponse, ProviderError> {
        let content = request.render(FALLBACK_TEMPLATE);
        if content.is_empty() {
            return Err(ProviderError::rejected(
                "speedsms_empty_body",
                "empty message body after rendering template",
            ));
        }
        let sender = match request.message.from() {
            "" => self.config.sender.as_str(),
            from => from,
        };
        let body = SendBody {
            to: [request.message.to()],
            content: &content,
            sms_type: request
                .option_i64("sms_type")
                .unwrap_or_else(|| i64::from(self.config.sms_type)),
            sender,
        };

        let reply = match http::mock_scenario(&self.config.base_url) {
            Some(scenario) => {
                if let Some(err) = http::mock_failure(PREFIX, scenario) {
                    return Err(err);
                }
                debug!(body = ?body, "speedsms mock send");
                SpeedSmsReply {
                    status: "success".into(),
                    code: json!("00"),
                    message: String::new(),
                    data: vec![http::mock_id("tx")],
                }
            }
            None => {
                let url = self.url(SEND_SMS_ENDPOINT);
                debug!(%url, "posting to speedsms");
                let request = self
                    .client
                    .post(url)
                    .basic_auth(&self.config.token, Some("x"))
                    .json(&body);
                let reply = http::send(cancellation, request, PREFIX).await?;
                reply.json::<SpeedSmsReply>(PREFIX)?.0
            }
        };

        if reply.status != "success" {
            return Err(ProviderError::rejected(
                "speedsms_api_error",
                format!("speedsms error: {} - {}", reply.code, reply.message),
            ));
        }

        let now = OffsetDateTime::now_utc();
        let raw = serde_json::to_value(&reply).unwrap_or(Value::Null);
        Ok(
            SendSmsResponse::new(message_id(&reply.data, now), MessageStatus::Sent)
                .with_provider(PROVIDER_NAME)
                .with_sent_at(now)
                .with_raw(raw),
        )
    }

    async fn send_voice_call(
        &self,
        _cancellation: &Cancellation,
        _request: &SendVoiceRequest,
    ) -> Result<SendVoiceResponse, ProviderError> {
        Err(ProviderError::unsupported(
            "speedsms_voice_unsupported",
            "voice calls are not supported by the speedsms provider",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sms_core::Message;
    use time::macros::datetime;

    const TOKEN: &str = "test_token_with_at_least_20_characters";

    fn config(section: Value) -> DispatchConfig {
        DispatchConfig::new(PROVIDER_NAME).with_provider(PROVIDER_NAME, section)
    }

    fn valid() -> SpeedSmsConfig {
        SpeedSmsConfig {
            token: TOKEN.into(),
            sender: "TestBrand".into(),
            sms_type: 2,
            base_url: default_base_url(),
        }
    }

    #[test]
    fn config_loads_with_defaults() {
        let cfg = config(json!({"token": TOKEN}));
        let speed = SpeedSmsConfig::from_dispatch_config(&cfg).unwrap();
        assert_eq!(speed.sms_type, 2);
        assert_eq!(speed.base_url, "https://api.speedsms.vn/index.php");
        assert_eq!(speed.sender, "");
    }

    #[test]
    fn config_validation() {
        assert!(valid().validate().is_ok());
        assert!(
            SpeedSmsConfig {
                sms_type: 9,
                ..valid()
            }
            .validate()
            .is_err()
        );
        let err = SpeedSmsConfig {
            token: "short_token".into(),
            ..valid()
        }
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("too short"));
        assert!(
            SpeedSmsConfig {
                base_url: "invalid-url".into(),
                ..valid()
            }
            .validate()
            .is_err()
        );
        assert!(
            SpeedSmsConfig {
                base_url: "mock://success".into(),
                ..valid()
            }
            .validate()
            .is_ok()
        );

        let err = SpeedSmsConfig::from_dispatch_config(&config(json!({"token": ""}))).unwrap_err();
        assert!(err.to_string().contains("field token cannot be empty"));
    }

    #[test]
    fn message_ids() {
        let now = datetime!(2024-05-01 10:00 UTC);
        assert_eq!(
            message_id(&["a".into(), "b".into()], now),
            format!("sms_a_b_{}", now.unix_timestamp())
        );
        assert_eq!(
            message_id(&[], now),
            format!("sms_{}", now.unix_timestamp_nanos())
        );
    }

    #[test]
    fn request_body_shape() {
        let body = SendBody {
            to: ["+84901234567"],
            content: "hi",
            sms_type: 2,
            sender: "",
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"to": ["+84901234567"], "content": "hi", "sms_type": 2})
        );
    }

    #[tokio::test]
    async fn mock_send_and_voice_unsupported() {
        let cfg = config(json!({"token": TOKEN, "base_url": "mock://success"}));
        let provider = SpeedSmsProvider::from_config(&cfg).unwrap();
        let message = Message::new("", "+84901234567", "tests");

        let response = provider
            .send_sms(
                &Cancellation::never(),
                &SendSmsRequest::new(message.clone()).with_data("message", "hi"),
            )
            .await
            .unwrap();
        assert!(response.message_id.starts_with("sms_tx-"));
        assert_eq!(response.status, MessageStatus::Sent);

        let err = provider
            .send_voice_call(&Cancellation::never(), &SendVoiceRequest::new(message))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "speedsms_voice_unsupported");
        assert!(!err.is_retryable());

        assert_eq!(provider.balance(&Cancellation::never()).await.unwrap(), 0.0);
    }
}
