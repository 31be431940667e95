use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Delivery status of a text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Unknown,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
            MessageStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a voice call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Queued => "queued",
            CallStatus::Initiated => "initiated",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in-progress",
            CallStatus::Completed => "completed",
            CallStatus::Busy => "busy",
            CallStatus::NoAnswer => "no-answer",
            CallStatus::Failed => "failed",
            CallStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a text message hand-off to a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendSmsResponse {
    pub message_id: String,
    pub status: MessageStatus,
    /// Name of the backend that produced this response.
    #[serde(default)]
    pub provider: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<Value>,
}

impl SendSmsResponse {
    pub fn new(message_id: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            message_id: message_id.into(),
            status,
            provider: String::new(),
            sent_at: OffsetDateTime::now_utc(),
            cost: None,
            currency: None,
            provider_response: None,
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    #[must_use]
    pub fn with_sent_at(mut self, sent_at: OffsetDateTime) -> Self {
        self.sent_at = sent_at;
        self
    }

    #[must_use]
    pub fn with_cost(mut self, cost: f64, currency: Option<String>) -> Self {
        self.cost = Some(cost);
        self.currency = currency;
        self
    }

    #[must_use]
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.provider_response = Some(raw);
        self
    }
}

impl fmt::Display for SendSmsResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SMS [{}] via {}: {}",
            self.message_id, self.provider, self.status
        )
    }
}

/// Result of a voice call hand-off to a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendVoiceResponse {
    pub call_id: String,
    pub status: CallStatus,
    #[serde(default)]
    pub provider: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ended_at: Option<OffsetDateTime>,
    /// Call length in seconds; zero until the call completes.
    #[serde(default, rename = "duration")]
    pub duration_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<Value>,
}

impl SendVoiceResponse {
    pub fn new(call_id: impl Into<String>, status: CallStatus) -> Self {
        Self {
            call_id: call_id.into(),
            status,
            provider: String::new(),
            started_at: OffsetDateTime::now_utc(),
            ended_at: None,
            duration_secs: 0,
            cost: None,
            currency: None,
            provider_response: None,
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    #[must_use]
    pub fn with_timing(
        mut self,
        started_at: OffsetDateTime,
        ended_at: Option<OffsetDateTime>,
        duration_secs: u64,
    ) -> Self {
        self.started_at = started_at;
        self.ended_at = ended_at;
        self.duration_secs = duration_secs;
        self
    }

    #[must_use]
    pub fn with_cost(mut self, cost: f64, currency: Option<String>) -> Self {
        self.cost = Some(cost);
        self.currency = currency;
        self
    }

    #[must_use]
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.provider_response = Some(raw);
        self
    }
}

impl fmt::Display for SendVoiceResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Voice Call [{}] via {}: {} (Duration: {}s)",
            self.call_id, self.provider, self.status, self.duration_secs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn statuses_use_wire_spelling() {
        assert_eq!(
            serde_json::to_value(CallStatus::InProgress).unwrap(),
            json!("in-progress")
        );
        assert_eq!(
            serde_json::to_value(CallStatus::NoAnswer).unwrap(),
            json!("no-answer")
        );
        assert_eq!(
            serde_json::to_value(MessageStatus::Delivered).unwrap(),
            json!("delivered")
        );
        let parsed: CallStatus = serde_json::from_value(json!("canceled")).unwrap();
        assert_eq!(parsed, CallStatus::Canceled);
        assert_eq!(CallStatus::InProgress.to_string(), "in-progress");
    }

    #[test]
    fn display_formats() {
        let sms = SendSmsResponse::new("SM1", MessageStatus::Sent).with_provider("twilio");
        assert_eq!(sms.to_string(), "SMS [SM1] via twilio: sent");

        let call = SendVoiceResponse::new("CA1", CallStatus::Completed)
            .with_provider("twilio")
            .with_timing(datetime!(2024-05-01 10:00 UTC), None, 42);
        assert_eq!(
            call.to_string(),
            "Voice Call [CA1] via twilio: completed (Duration: 42s)"
        );
    }

    #[test]
    fn sms_response_serializes_optional_fields_only_when_set() {
        let sms = SendSmsResponse::new("id-1", MessageStatus::Pending)
            .with_provider("esms")
            .with_sent_at(datetime!(2024-05-01 10:00 UTC));
        let value = serde_json::to_value(&sms).unwrap();
        assert_eq!(
            value,
            json!({
                "message_id": "id-1",
                "status": "pending",
                "provider": "esms",
                "sent_at": "2024-05-01T10:00:00Z"
            })
        );

        let priced = sms.with_cost(0.0075, Some("USD".into()));
        let value = serde_json::to_value(&priced).unwrap();
        assert_eq!(value["cost"], json!(0.0075));
        assert_eq!(value["currency"], json!("USD"));
    }

    #[test]
    fn voice_response_round_trips_end_time() {
        let call = SendVoiceResponse::new("CA9", CallStatus::Completed).with_timing(
            datetime!(2024-05-01 10:00 UTC),
            Some(datetime!(2024-05-01 10:01 UTC)),
            60,
        );
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["duration"], json!(60));
        assert_eq!(value["ended_at"], json!("2024-05-01T10:01:00Z"));
        let back: SendVoiceResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back.ended_at, call.ended_at);
    }
}
