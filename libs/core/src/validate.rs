use thiserror::Error;

use crate::message::Message;

/// Minimum number of digits a recipient number must carry.
pub const MIN_PHONE_DIGITS: usize = 8;

/// A request failed validation; `field` names the offending input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation error: {field} - {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Loose plausibility check for a phone number.
///
/// Spaces, dashes and parentheses are ignored; what remains must be an optional leading `+`
/// followed by at least [`MIN_PHONE_DIGITS`] ASCII digits.
///
/// ```
/// use sms_core::is_plausible_phone_number;
///
/// assert!(is_plausible_phone_number("+1 (555) 123-4567"));
/// assert!(is_plausible_phone_number("0901234567"));
/// assert!(!is_plausible_phone_number("+123"));
/// assert!(!is_plausible_phone_number("call-me-maybe"));
/// ```
pub fn is_plausible_phone_number(raw: &str) -> bool {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    digits.len() >= MIN_PHONE_DIGITS && digits.chars().all(|c| c.is_ascii_digit())
}

/// Checks the identity fields every outbound request must satisfy.
pub fn validate_message(message: &Message) -> Result<(), ValidationError> {
    if !is_plausible_phone_number(message.to()) {
        return Err(ValidationError::new("to", "invalid recipient phone number"));
    }
    if message.from().is_empty() {
        return Err(ValidationError::new(
            "from",
            "sender identifier cannot be empty",
        ));
    }
    Ok(())
}
