use std::time::Duration;

use metrics::Label;

use crate::context::{Channel, DispatchLabels, DispatchOutcome};

pub const DISPATCH_TOTAL: &str = "sms_dispatch_total";
pub const DISPATCH_ATTEMPTS: &str = "sms_dispatch_attempts";
pub const RETRY_BACKOFF_TOTAL: &str = "sms_retry_backoff_total";

fn labels(labels: &DispatchLabels) -> Vec<Label> {
    labels
        .tags()
        .into_iter()
        .map(|(key, value)| Label::new(key, value))
        .collect()
}

pub fn record_counter(name: &'static str, value: u64, dispatch: &DispatchLabels) {
    metrics::counter!(name, labels(dispatch)).increment(value);
}

pub fn record_histogram(name: &'static str, value: f64, dispatch: &DispatchLabels) {
    metrics::histogram!(name, labels(dispatch)).record(value);
}

/// One finished dispatch call and how many backend attempts it took.
pub fn record_dispatch(
    provider: &str,
    channel: Channel,
    outcome: DispatchOutcome,
    attempts: u32,
) {
    let dispatch = DispatchLabels::new(provider, channel).with_outcome(outcome);
    record_counter(DISPATCH_TOTAL, 1, &dispatch);
    record_histogram(DISPATCH_ATTEMPTS, f64::from(attempts), &dispatch);
}

/// Backoff sleeps taken by one dispatch call.
pub fn record_retry(provider: &str, channel: Channel, delays: &[Duration]) {
    if delays.is_empty() {
        return;
    }
    let dispatch = DispatchLabels::new(provider, channel);
    record_counter(RETRY_BACKOFF_TOTAL, delays.len() as u64, &dispatch);
}
