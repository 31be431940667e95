use serde::{Deserialize, Serialize};

use crate::DataBag;
use crate::template::render_template;

/// Identity of a single outbound message: who sends it, who receives it and which
/// application asked for it.
///
/// The three fields are always available to templates as `{from}`, `{to}` and `{by}`.
///
/// ```
/// use sms_core::Message;
///
/// let msg = Message::new("ACME", "+15551234567", "billing");
/// assert_eq!(msg.to(), "+15551234567");
/// assert_eq!(msg.render("Hi from {from}", &Default::default()), "Hi from ACME");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    from: String,
    to: String,
    #[serde(default)]
    by: String,
}

impl Message {
    pub fn new(from: impl Into<String>, to: impl Into<String>, by: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            by: by.into(),
        }
    }

    /// Sender identifier (phone number, brand name, ...).
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Recipient phone number.
    pub fn to(&self) -> &str {
        &self.to
    }

    /// Application or service tag that initiated the message.
    pub fn by(&self) -> &str {
        &self.by
    }

    /// Renders `template` against `data`, with this identity's reserved keys taking precedence.
    pub fn render(&self, template: &str, data: &DataBag) -> String {
        render_template(template, data, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serde_uses_plain_field_names() {
        let msg = Message::new("ACME", "+84901234567", "otp-service");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"from": "ACME", "to": "+84901234567", "by": "otp-service"})
        );
    }

    #[test]
    fn missing_tag_defaults_to_empty() {
        let msg: Message = serde_json::from_value(json!({"from": "a", "to": "b"})).unwrap();
        assert_eq!(msg.by(), "");
    }
}
