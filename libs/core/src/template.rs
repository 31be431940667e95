use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::DataBag;
use crate::message::Message;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"));

/// Template variables that always resolve to the message identity.
pub const RESERVED_KEYS: [&str; 3] = ["from", "to", "by"];

/// Substitutes `{name}` placeholders in `template`.
///
/// Lookups consult the message identity first (`from`, `to`, `by`) and the data bag second,
/// so the identity can never be overridden by caller data. Unknown placeholders are kept
/// verbatim and an empty template renders to an empty string.
///
/// ```
/// use sms_core::{render_template, DataBag, Message};
/// use serde_json::json;
///
/// let mut data = DataBag::new();
/// data.insert("name".into(), json!("John"));
/// data.insert("code".into(), json!("123456"));
/// let msg = Message::new("ACME", "+15551234567", "auth");
///
/// assert_eq!(
///     render_template("Hello {name}! Your verification code is {code}.", &data, &msg),
///     "Hello John! Your verification code is 123456."
/// );
/// assert_eq!(render_template("{missing} stays", &data, &msg), "{missing} stays");
/// ```
pub fn render_template(template: &str, data: &DataBag, identity: &Message) -> String {
    if template.is_empty() {
        return String::new();
    }

    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let key = &caps[1];
            match lookup(key, data, identity) {
                Some(value) => value.into_owned(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn lookup<'a>(key: &str, data: &'a DataBag, identity: &'a Message) -> Option<Cow<'a, str>> {
    match key {
        "from" => Some(Cow::Borrowed(identity.from())),
        "to" => Some(Cow::Borrowed(identity.to())),
        "by" => Some(Cow::Borrowed(identity.by())),
        _ => data.get(key).map(value_to_text),
    }
}

/// Natural textual form of a data bag value as used during substitution.
///
/// Strings are inserted without quotes, numbers and booleans use their usual spelling,
/// arrays and objects become compact JSON and `null` becomes the empty string.
pub fn value_to_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(text) => Cow::Borrowed(text.as_str()),
        Value::Null => Cow::Borrowed(""),
        Value::Bool(flag) => Cow::Owned(flag.to_string()),
        Value::Number(number) => Cow::Owned(number.to_string()),
        other => Cow::Owned(other.to_string()),
    }
}
