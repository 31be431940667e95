use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use sms_core::{
    CallStatus, ConfigError, DispatchConfig, MessageStatus, SendSmsRequest, SendSmsResponse,
    SendVoiceRequest, SendVoiceResponse, require_fields,
};
use sms_retry::Cancellation;
use time::OffsetDateTime;
use tracing::debug;

use super::http::{self, HttpReply};
use crate::errors::ProviderError;
use crate::traits::Provider;

pub const PROVIDER_NAME: &str = "twilio";
const PREFIX: &str = "twilio";
const FALLBACK_TEMPLATE: &str = "{message}";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// E.164 number used when the request carries no sender.
    pub from_number: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Overrides the account URL derived from region, version and SID.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_region() -> String {
    "us1".into()
}

fn default_api_version() -> String {
    "2010-04-01".into()
}

impl TwilioConfig {
    pub fn from_dispatch_config(config: &DispatchConfig) -> Result<Self, ConfigError> {
        let section = config.provider_value(PROVIDER_NAME)?;
        require_fields(
            PROVIDER_NAME,
            section,
            &["account_sid", "auth_token", "from_number"],
        )?;
        let parsed: Self = config.provider_section(PROVIDER_NAME)?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidProviderSection {
            provider: PROVIDER_NAME.into(),
            message: message.into(),
        };
        if self.account_sid.is_empty() {
            return Err(invalid("twilio account_sid is required"));
        }
        if self.auth_token.is_empty() {
            return Err(invalid("twilio auth_token is required"));
        }
        if self.from_number.is_empty() {
            return Err(invalid("twilio from_number is required"));
        }
        if !self.account_sid.starts_with("AC") {
            return Err(invalid(
                "invalid twilio account_sid format (should start with 'AC')",
            ));
        }
        if !self.from_number.starts_with('+') {
            return Err(invalid(
                "from_number must be in E.164 format (e.g., +1234567890)",
            ));
        }
        Ok(())
    }

    pub fn account_url(&self) -> String {
        match &self.base_url {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!(
                "https://api.{}.twilio.com/{}/Accounts/{}",
                self.region, self.api_version, self.account_sid
            ),
        }
    }
}

pub struct TwilioProvider {
    client: Client,
    config: TwilioConfig,
    base_url: String,
}

impl TwilioProvider {
    pub fn new(config: TwilioConfig, http_timeout: Duration) -> Result<Self, ProviderError> {
        let client = http::build_client(PREFIX, http_timeout)?;
        let base_url = config.account_url();
        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    pub fn from_config(config: &DispatchConfig) -> Result<Self, ProviderError> {
        let twilio = TwilioConfig::from_dispatch_config(config).map_err(|err| {
            ProviderError::rejected("twilio_config", err.to_string()).with_source(err)
        })?;
        Self::new(twilio, config.http_timeout)
    }

    fn sender<'a>(&'a self, from: &'a str) -> &'a str {
        if from.is_empty() {
            &self.config.from_number
        } else {
            from
        }
    }

    async fn post_form(
        &self,
        cancellation: &Cancellation,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<HttpReply, ProviderError> {
        let url = format!("{}{endpoint}", self.base_url);
        debug!(%url, "posting to twilio");
        let request = self
            .client
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form);
        http::send(cancellation, request, PREFIX).await
    }
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    #[serde(default)]
    sid: String,
    #[serde(default)]
    status: String,
    date_created: Option<String>,
    date_sent: Option<String>,
    direction: Option<String>,
    price: Option<String>,
    price_unit: Option<String>,
    error_code: Option<Value>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioCall {
    #[serde(default)]
    sid: String,
    #[serde(default)]
    status: String,
    date_created: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    duration: Option<String>,
    price: Option<String>,
    price_unit: Option<String>,
    error_code: Option<Value>,
    error_message: Option<String>,
}

fn api_error(code: Option<&Value>, message: Option<&str>) -> Option<ProviderError> {
    let code = match code? {
        Value::Null => return None,
        Value::String(text) if text.is_empty() => return None,
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    Some(ProviderError::rejected(
        "twilio_api_error",
        format!("twilio error: {code} - {}", message.unwrap_or_default()),
    ))
}

fn parse_price(price: Option<&str>) -> Option<f64> {
    price.and_then(|raw| raw.trim().parse::<f64>().ok())
}

pub fn map_sms_status(status: &str) -> MessageStatus {
    match status.to_lowercase().as_str() {
        "accepted" | "scheduled" | "queued" | "sending" => MessageStatus::Pending,
        "sent" => MessageStatus::Sent,
        "delivered" | "read" => MessageStatus::Delivered,
        "undelivered" | "failed" | "canceled" => MessageStatus::Failed,
        _ => MessageStatus::Unknown,
    }
}

pub fn map_call_status(status: &str) -> CallStatus {
    match status.to_lowercase().as_str() {
        "queued" => CallStatus::Queued,
        "initiated" => CallStatus::Initiated,
        "ringing" => CallStatus::Ringing,
        "in-progress" => CallStatus::InProgress,
        "completed" => CallStatus::Completed,
        "busy" => CallStatus::Busy,
        "no-answer" => CallStatus::NoAnswer,
        "canceled" => CallStatus::Canceled,
        _ => CallStatus::Failed,
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// TwiML that reads `text` aloud, with optional `voice` / `language` attributes.
pub fn say_twiml(text: &str, voice: Option<&str>, language: Option<&str>) -> String {
    let mut attrs = String::new();
    if let Some(voice) = voice {
        attrs.push_str(&format!(" voice=\"{}\"", xml_escape(voice)));
    }
    if let Some(language) = language {
        attrs.push_str(&format!(" language=\"{}\"", xml_escape(language)));
    }
    format!("<Response><Say{attrs}>{}</Say></Response>", xml_escape(text))
}

#[async_trait]
impl Provider for TwilioProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn send_sms(
        &self,
        cancellation: &Cancellation,
        request: &SendSmsRequest,
    ) -> Result<SendSmsResponse, ProviderError> {
        let body = request.render(FALLBACK_TEMPLATE);
        if body.is_empty() {
            return Err(ProviderError::rejected(
                "twilio_empty_body",
                "empty message body after rendering template",
            ));
        }

        let mut form = vec![
            ("To", request.message.to().to_string()),
            ("From", self.sender(request.message.from()).to_string()),
            ("Body", body),
        ];
        if let Some(callback) = request.option_str("status_callback") {
            form.push(("StatusCallback", callback.to_string()));
        }

        if let Some(scenario) = http::mock_scenario(&self.base_url) {
            if let Some(err) = http::mock_failure(PREFIX, scenario) {
                return Err(err);
            }
            let raw: serde_json::Map<String, Value> = form
                .iter()
                .map(|(key, value)| ((*key).to_string(), Value::String(value.clone())))
                .collect();
            return Ok(SendSmsResponse::new(http::mock_id("SM"), MessageStatus::Sent)
                .with_provider(PROVIDER_NAME)
                .with_raw(json!({ "mock": true, "request": raw })));
        }

        let reply = self.post_form(cancellation, "/Messages.json", &form).await?;
        let (message, _raw): (TwilioMessage, Value) = reply.json(PREFIX)?;
        if let Some(err) = api_error(message.error_code.as_ref(), message.error_message.as_deref())
        {
            return Err(err);
        }

        let mut response = SendSmsResponse::new(message.sid.clone(), map_sms_status(&message.status))
            .with_provider(PROVIDER_NAME)
            .with_sent_at(
                http::parse_timestamp(message.date_sent.as_deref())
                    .unwrap_or_else(OffsetDateTime::now_utc),
            )
            .with_raw(json!({
                "sid": message.sid,
                "status": message.status,
                "date_created": message.date_created,
                "date_sent": message.date_sent,
                "direction": message.direction,
            }));
        if let Some(cost) = parse_price(message.price.as_deref()) {
            response = response.with_cost(cost, message.price_unit);
        }
        Ok(response)
    }

    async fn send_voice_call(
        &self,
        cancellation: &Cancellation,
        request: &SendVoiceRequest,
    ) -> Result<SendVoiceResponse, ProviderError> {
        let text = request.render(FALLBACK_TEMPLATE);
        if text.is_empty() {
            return Err(ProviderError::rejected(
                "twilio_empty_body",
                "empty message text after rendering template",
            ));
        }

        let twiml = say_twiml(
            &text,
            request.option_str("voice"),
            request.option_str("language"),
        );
        let mut form = vec![
            ("To", request.message.to().to_string()),
            ("From", self.sender(request.message.from()).to_string()),
            ("Twiml", twiml),
        ];
        if let Some(callback) = request.option_str("status_callback") {
            form.push(("StatusCallback", callback.to_string()));
        }

        if let Some(scenario) = http::mock_scenario(&self.base_url) {
            if let Some(err) = http::mock_failure(PREFIX, scenario) {
                return Err(err);
            }
            return Ok(SendVoiceResponse::new(http::mock_id("CA"), CallStatus::Queued)
                .with_provider(PROVIDER_NAME)
                .with_raw(json!({ "mock": true, "twiml": form[2].1 })));
        }

        let reply = self.post_form(cancellation, "/Calls.json", &form).await?;
        let (call, _raw): (TwilioCall, Value) = reply.json(PREFIX)?;
        if let Some(err) = api_error(call.error_code.as_ref(), call.error_message.as_deref()) {
            return Err(err);
        }

        let started_at = http::parse_timestamp(call.start_time.as_deref())
            .unwrap_or_else(OffsetDateTime::now_utc);
        let ended_at = http::parse_timestamp(call.end_time.as_deref());
        let duration = call
            .duration
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(0);

        let mut response = SendVoiceResponse::new(call.sid.clone(), map_call_status(&call.status))
            .with_provider(PROVIDER_NAME)
            .with_timing(started_at, ended_at, duration)
            .with_raw(json!({
                "sid": call.sid,
                "status": call.status,
                "date_created": call.date_created,
                "start_time": call.start_time,
                "end_time": call.end_time,
            }));
        if let Some(cost) = parse_price(call.price.as_deref()) {
            response = response.with_cost(cost, call.price_unit);
        }
        Ok(response)
    }
}
