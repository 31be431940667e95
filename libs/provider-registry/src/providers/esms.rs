use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
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

pub const PROVIDER_NAME: &str = "esms";
const PREFIX: &str = "esms";
const FALLBACK_TEMPLATE: &str = "{message}";
const SUCCESS_CODE: &str = "100";
const BRANDNAME_SMS_TYPE: u8 = 2;

const SEND_SMS_ENDPOINT: &str = "/sms/send";
const VOICE_OTP_ENDPOINT: &str = "/voice/otp";

static OTP_SIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{6}").expect("valid OTP regex"));
static OTP_ANY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4,8}").expect("valid OTP regex"));

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EsmsConfig {
    pub api_key: String,
    pub secret: String,
    #[serde(default)]
    pub brandname: String,
    /// 2 = brandname, 4 = OTP, 8 = fixed-number route.
    #[serde(default = "default_sms_type")]
    pub sms_type: u8,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_sms_type() -> u8 {
    BRANDNAME_SMS_TYPE
}

fn default_base_url() -> String {
    "http://rest.esms.vn/api".into()
}

impl EsmsConfig {
    pub fn from_dispatch_config(config: &DispatchConfig) -> Result<Self, ConfigError> {
        let section = config.provider_value(PROVIDER_NAME)?;
        require_fields(PROVIDER_NAME, section, &["api_key", "secret"])?;
        let parsed: Self = config.provider_section(PROVIDER_NAME)?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidProviderSection {
            provider: PROVIDER_NAME.into(),
            message: message.into(),
        };
        if self.api_key.is_empty() {
            return Err(invalid("esms api_key is required"));
        }
        if self.secret.is_empty() {
            return Err(invalid("esms secret is required"));
        }
        if !matches!(self.sms_type, 2 | 4 | 8) {
            return Err(invalid("invalid sms_type value, must be 2, 4, or 8"));
        }
        if self.sms_type == BRANDNAME_SMS_TYPE && self.brandname.is_empty() {
            return Err(invalid(
                "brandname is required for SMS type 2 (branded messages)",
            ));
        }
        Ok(())
    }
}

pub struct EsmsProvider {
    client: Client,
    config: EsmsConfig,
}

impl EsmsProvider {
    pub fn new(config: EsmsConfig, http_timeout: Duration) -> Result<Self, ProviderError> {
        let client = http::build_client(PREFIX, http_timeout)?;
        Ok(Self { client, config })
    }

    pub fn from_config(config: &DispatchConfig) -> Result<Self, ProviderError> {
        let esms = EsmsConfig::from_dispatch_config(config).map_err(|err| {
            ProviderError::rejected("esms_config", err.to_string()).with_source(err)
        })?;
        Self::new(esms, config.http_timeout)
    }

    /// Request sender, else the configured brandname. Non-brandname routes only accept
    /// phone numbers; anything else is dropped so the account's default number is used.
    fn sender(&self, from: &str) -> Option<String> {
        let sender = if from.is_empty() {
            self.config.brandname.as_str()
        } else {
            from
        };
        if self.config.sms_type != BRANDNAME_SMS_TYPE && !sender.starts_with('+') {
            return None;
        }
        (!sender.is_empty()).then(|| sender.to_string())
    }

    fn credentials(&self, phone: &str) -> Vec<(&'static str, String)> {
        vec![
            ("ApiKey", self.config.api_key.clone()),
            ("SecretKey", self.config.secret.clone()),
            ("Phone", phone.to_string()),
        ]
    }

    async fn post_form(
        &self,
        cancellation: &Cancellation,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<HttpReply, ProviderError> {
        let url = format!("{}{endpoint}", self.config.base_url.trim_end_matches('/'));
        debug!(%url, "posting to esms");
        let request = self.client.post(url).form(form);
        http::send(cancellation, request, PREFIX).await
    }
}

#[derive(Debug, Deserialize)]
struct EsmsSmsReply {
    #[serde(rename = "CodeResult", default)]
    code_result: String,
    #[serde(rename = "CountRegenerate", default)]
    count_regenerate: i64,
    #[serde(rename = "ErrorMessage", default)]
    error_message: String,
    #[serde(rename = "SMSID", default)]
    sms_id: String,
}

#[derive(Debug, Deserialize)]
struct EsmsVoiceReply {
    #[serde(rename = "CodeResult", default)]
    code_result: String,
    #[serde(rename = "ErrorMessage", default)]
    error_message: String,
    #[serde(rename = "CallId", default)]
    call_id: String,
}

fn check_code(code: &str, message: &str) -> Result<(), ProviderError> {
    if code == SUCCESS_CODE {
        return Ok(());
    }
    Err(ProviderError::rejected(
        "esms_api_error",
        format!("esms error: {code} - {message}"),
    ))
}

/// Status for an eSMS `CodeResult`.
pub fn map_code_result(code: &str) -> MessageStatus {
    match code {
        "100" => MessageStatus::Sent,
        "99" | "101" | "102" | "103" | "104" | "105" => MessageStatus::Failed,
        "106" | "107" | "108" | "109" | "110" | "111" | "112" | "113" | "114" => {
            MessageStatus::Failed
        }
        "118" | "119" | "120" | "121" | "122" => MessageStatus::Failed,
        _ => MessageStatus::Unknown,
    }
}

/// Pulls a one-time code out of `text`: the first six-digit run, else the first run of
/// four to eight digits, else the whole text.
pub fn extract_otp(text: &str) -> &str {
    OTP_SIX
        .find(text)
        .or_else(|| OTP_ANY.find(text))
        .map_or(text, |found| found.as_str())
}

#[async_trait]
impl Provider for EsmsProvider {
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
                "esms_empty_body",
                "empty message body after rendering template",
            ));
        }

        let mut form = self.credentials(request.message.to());
        form.push(("Content", body));
        form.push(("SmsType", self.config.sms_type.to_string()));
        if let Some(sender) = self.sender(request.message.from()) {
            form.push(("Brandname", sender));
        }
        if let Some(schedule) = request.option_str("schedule_time") {
            form.push(("TimeSend", schedule.to_string()));
        }
        if let Some(unicode) = request.option_i64("is_unicode") {
            form.push(("IsUnicode", unicode.to_string()));
        }

        let reply = match http::mock_scenario(&self.config.base_url) {
            Some(scenario) => {
                if let Some(err) = http::mock_failure(PREFIX, scenario) {
                    return Err(err);
                }
                EsmsSmsReply {
                    code_result: SUCCESS_CODE.into(),
                    count_regenerate: 0,
                    error_message: String::new(),
                    sms_id: http::mock_id("esms"),
                }
            }
            None => {
                let reply = self
                    .post_form(cancellation, SEND_SMS_ENDPOINT, &form)
                    .await?;
                reply.json::<EsmsSmsReply>(PREFIX)?.0
            }
        };
        check_code(&reply.code_result, &reply.error_message)?;

        Ok(
            SendSmsResponse::new(reply.sms_id.clone(), map_code_result(&reply.code_result))
                .with_provider(PROVIDER_NAME)
                .with_raw(json!({
                    "code_result": reply.code_result,
                    "sms_id": reply.sms_id,
                    "regenerate_count": reply.count_regenerate,
                })),
        )
    }

    async fn send_voice_call(
        &self,
        cancellation: &Cancellation,
        request: &SendVoiceRequest,
    ) -> Result<SendVoiceResponse, ProviderError> {
        let text = request.render(FALLBACK_TEMPLATE);
        if text.is_empty() {
            return Err(ProviderError::rejected(
                "esms_empty_body",
                "empty message text after rendering template",
            ));
        }

        let code = request
            .option_str("otp")
            .unwrap_or_else(|| extract_otp(&text))
            .to_string();
        let mut form = self.credentials(request.message.to());
        form.push(("Code", code));
        if let Some(speed) = request.option_f64("speed") {
            form.push(("Speed", format!("{speed:.1}")));
        }
        if let Some(repeat) = request.option_i64("retry_times") {
            form.push(("Repeat", repeat.to_string()));
        }

        let reply = match http::mock_scenario(&self.config.base_url) {
            Some(scenario) => {
                if let Some(err) = http::mock_failure(PREFIX, scenario) {
                    return Err(err);
                }
                EsmsVoiceReply {
                    code_result: SUCCESS_CODE.into(),
                    error_message: String::new(),
                    call_id: http::mock_id("esms-call"),
                }
            }
            None => {
                let reply = self
                    .post_form(cancellation, VOICE_OTP_ENDPOINT, &form)
                    .await?;
                reply.json::<EsmsVoiceReply>(PREFIX)?.0
            }
        };
        check_code(&reply.code_result, &reply.error_message)?;

        let sent: serde_json::Map<String, Value> = form
            .iter()
            .filter(|(key, _)| !matches!(*key, "ApiKey" | "SecretKey"))
            .map(|(key, value)| ((*key).to_string(), Value::String(value.clone())))
            .collect();
        Ok(
            SendVoiceResponse::new(reply.call_id.clone(), CallStatus::Initiated)
                .with_provider(PROVIDER_NAME)
                .with_timing(OffsetDateTime::now_utc(), None, 0)
                .with_raw(json!({
                    "code_result": reply.code_result,
                    "call_id": reply.call_id,
                    "request": sent,
                })),
        )
    }
}
