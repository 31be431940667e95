use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Sms,
    Voice,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Voice => "voice",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a dispatch call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    Delivered,
    /// Transient failures used up every attempt.
    Exhausted,
    /// The backend refused in a way retrying cannot fix.
    Rejected,
    Cancelled,
    /// Stopped before any backend call (validation, missing backend, bad policy).
    Invalid,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::Exhausted => "exhausted",
            DispatchOutcome::Rejected => "rejected",
            DispatchOutcome::Cancelled => "cancelled",
            DispatchOutcome::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchLabels {
    pub provider: String,
    pub channel: Channel,
    pub outcome: Option<DispatchOutcome>,
    pub extra: Vec<(String, String)>,
}

impl DispatchLabels {
    pub fn new(provider: impl Into<String>, channel: Channel) -> Self {
        Self {
            provider: provider.into(),
            channel,
            outcome: None,
            extra: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: DispatchOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        let mut tags = Vec::with_capacity(3 + self.extra.len());
        tags.push(("provider".into(), self.provider.clone()));
        tags.push(("channel".into(), self.channel.as_str().into()));
        if let Some(outcome) = self.outcome {
            tags.push(("outcome".into(), outcome.as_str().into()));
        }
        for (key, value) in &self.extra {
            tags.push((key.clone(), value.clone()));
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_in_stable_order() {
        let labels = DispatchLabels::new("twilio", Channel::Voice)
            .with_outcome(DispatchOutcome::Exhausted)
            .with_extra("region", "us1");
        assert_eq!(
            labels.tags(),
            vec![
                ("provider".to_string(), "twilio".to_string()),
                ("channel".to_string(), "voice".to_string()),
                ("outcome".to_string(), "exhausted".to_string()),
                ("region".to_string(), "us1".to_string()),
            ]
        );
    }

    #[test]
    fn outcome_is_optional() {
        let tags = DispatchLabels::new("esms", Channel::Sms).tags();
        assert_eq!(tags.len(), 2);
    }
}
