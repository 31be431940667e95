use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DataBag;
use crate::message::Message;
use crate::validate::{ValidationError, validate_message};

/// Request to deliver a text message.
///
/// ```
/// use sms_core::{Message, SendSmsRequest};
///
/// let req = SendSmsRequest::new(Message::new("ACME", "+15551234567", "auth"))
///     .with_template("Code: {code}")
///     .with_data("code", "4711");
/// assert_eq!(req.render("unused default"), "Code: 4711");
/// assert!(req.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendSmsRequest {
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "DataBag::is_empty")]
    pub data: DataBag,
    #[serde(default, skip_serializing_if = "DataBag::is_empty")]
    pub options: DataBag,
}

/// Request to initiate a voice call that reads out the rendered template.
///
/// Common options understood by the bundled backends: `voice`, `language`, `speed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendVoiceRequest {
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "DataBag::is_empty")]
    pub data: DataBag,
    #[serde(default, skip_serializing_if = "DataBag::is_empty")]
    pub options: DataBag,
}

macro_rules! request_common {
    ($ty:ty) => {
        impl $ty {
            pub fn new(message: Message) -> Self {
                Self {
                    message,
                    template: None,
                    data: DataBag::new(),
                    options: DataBag::new(),
                }
            }

            #[must_use]
            pub fn with_template(mut self, template: impl Into<String>) -> Self {
                self.template = Some(template.into());
                self
            }

            #[must_use]
            pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
                self.data.insert(key.into(), value.into());
                self
            }

            #[must_use]
            pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
                self.options.insert(key.into(), value.into());
                self
            }

            /// Recipient must look like a phone number and the sender must be present.
            pub fn validate(&self) -> Result<(), ValidationError> {
                validate_message(&self.message)
            }

            /// The request's own template, or `fallback` when none was supplied.
            pub fn template_or<'a>(&'a self, fallback: &'a str) -> &'a str {
                self.template.as_deref().unwrap_or(fallback)
            }

            /// Renders the effective template against the data bag and message identity.
            pub fn render(&self, fallback_template: &str) -> String {
                self.message
                    .render(self.template_or(fallback_template), &self.data)
            }

            pub fn option_str(&self, key: &str) -> Option<&str> {
                self.options.get(key).and_then(Value::as_str)
            }

            pub fn option_i64(&self, key: &str) -> Option<i64> {
                self.options.get(key).and_then(Value::as_i64)
            }

            pub fn option_f64(&self, key: &str) -> Option<f64> {
                self.options.get(key).and_then(Value::as_f64)
            }
        }
    };
}

request_common!(SendSmsRequest);
request_common!(SendVoiceRequest);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg() -> Message {
        Message::new("ACME", "+15551234567", "tests")
    }

    #[test]
    fn fallback_template_used_when_absent() {
        let req = SendVoiceRequest::new(msg()).with_data("message", "hello");
        assert_eq!(req.template_or("Say {message}"), "Say {message}");
        assert_eq!(req.render("Say {message}"), "Say hello");
    }

    #[test]
    fn explicit_empty_template_renders_empty() {
        let req = SendSmsRequest::new(msg()).with_template("");
        assert_eq!(req.render("Your message is {message}"), "");
    }

    #[test]
    fn option_accessors_are_typed() {
        let req = SendSmsRequest::new(msg())
            .with_option("status_callback", "https://example.com/cb")
            .with_option("is_unicode", 1)
            .with_option("speed", 1.5);
        assert_eq!(req.option_str("status_callback"), Some("https://example.com/cb"));
        assert_eq!(req.option_i64("is_unicode"), Some(1));
        assert_eq!(req.option_f64("speed"), Some(1.5));
        assert_eq!(req.option_str("is_unicode"), None);
    }

    #[test]
    fn deserializes_without_optional_bags() {
        let req: SendSmsRequest = serde_json::from_value(json!({
            "message": {"from": "ACME", "to": "+15551234567", "by": "x"}
        }))
        .unwrap();
        assert!(req.template.is_none());
        assert!(req.data.is_empty());
        assert!(req.options.is_empty());
    }

    #[test]
    fn validation_reports_field() {
        let req = SendSmsRequest::new(Message::new("ACME", "12", ""));
        assert_eq!(req.validate().unwrap_err().field, "to");
    }
}
