use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sms_retry::{Cancellation, is_retriable_status};
use time::OffsetDateTime;
use time::format_description::well_known::{Rfc2822, Rfc3339};

use crate::errors::ProviderError;

const USER_AGENT: &str = concat!("sms-dispatch/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(prefix: &str, timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|err| {
            ProviderError::other(format!("{prefix}_client"), "failed to create HTTP client")
                .with_source(err)
        })
}

/// Successful HTTP exchange: status below 400 and the full body.
#[derive(Debug)]
pub(crate) struct HttpReply {
    pub body: String,
}

impl HttpReply {
    /// Decodes the body as `T`, also returning it as untyped JSON for `provider_response`.
    pub fn json<T: DeserializeOwned>(&self, prefix: &str) -> Result<(T, Value), ProviderError> {
        let raw: Value = serde_json::from_str(&self.body).map_err(|err| {
            ProviderError::other(format!("{prefix}_response"), "response body is not JSON")
                .with_source(err)
        })?;
        let typed = T::deserialize(&raw).map_err(|err| {
            ProviderError::other(format!("{prefix}_response"), "unexpected response shape")
                .with_source(err)
        })?;
        Ok((typed, raw))
    }
}

/// Sends `request`, racing it against `cancellation`, and maps failures onto
/// [`ProviderError`] kinds.
pub(crate) async fn send(
    cancellation: &Cancellation,
    request: RequestBuilder,
    prefix: &str,
) -> Result<HttpReply, ProviderError> {
    let call = async {
        let response = request
            .send()
            .await
            .map_err(|err| transport_error(prefix, err))?;
        let status = response.status().as_u16();
        let retry_after = retry_after_ms(response.headers());
        let body = response
            .text()
            .await
            .map_err(|err| transport_error(prefix, err))?;
        check_status(prefix, status, &body, retry_after)?;
        Ok(HttpReply { body })
    };

    tokio::select! {
        biased;
        reason = cancellation.cancelled() => {
            Err(ProviderError::cancelled(format!("{prefix}_cancelled"), reason))
        }
        result = call => result,
    }
}

pub(crate) fn check_status(
    prefix: &str,
    status: u16,
    body: &str,
    retry_after: Option<u64>,
) -> Result<(), ProviderError> {
    if status < 400 {
        return Ok(());
    }
    let message = format!("status={status} body={body}");
    if is_retriable_status(status) {
        let hint = if status == 429 {
            retry_after
        } else {
            retry_after.or(Some(1_000))
        };
        return Err(
            ProviderError::http(status, format!("{prefix}_retryable"), message)
                .with_retry_after(hint),
        );
    }
    Err(ProviderError::http(
        status,
        format!("{prefix}_send_failed"),
        message,
    ))
}

fn transport_error(prefix: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(format!("{prefix}_timeout"), "request timed out").with_source(err)
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ProviderError::network(format!("{prefix}_http"), "failed to reach provider API")
            .with_source(err)
    } else {
        ProviderError::other(format!("{prefix}_http"), err.to_string()).with_source(err)
    }
}

fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|seconds| seconds.saturating_mul(1_000))
}

/// Scenario name when `base_url` points at the built-in mock.
pub(crate) fn mock_scenario(base_url: &str) -> Option<&str> {
    base_url
        .strip_prefix("mock://")
        .map(|rest| rest.split('/').next().unwrap_or(rest))
}

/// Failure injected by a mock scenario; `None` means the scenario succeeds.
pub(crate) fn mock_failure(prefix: &str, scenario: &str) -> Option<ProviderError> {
    match scenario {
        "success" => None,
        "throttle" => check_status(prefix, 429, "mock throttled", Some(1_000)).err(),
        "server_error" => check_status(prefix, 503, "mock server error", None).err(),
        "rejected" => check_status(prefix, 400, "mock rejected", None).err(),
        other => Some(ProviderError::other(
            format!("{prefix}_mock"),
            format!("unknown mock scenario `{other}`"),
        )),
    }
}

pub(crate) fn mock_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Parses the timestamp formats the bundled backends emit (RFC 3339 or RFC 2822).
pub(crate) fn parse_timestamp(raw: Option<&str>) -> Option<OffsetDateTime> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    OffsetDateTime::parse(raw, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc2822))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderErrorKind;
    use time::macros::datetime;

    #[test]
    fn status_classification() {
        assert!(check_status("x", 201, "", None).is_ok());

        let err = check_status("x", 503, "down", None).unwrap_err();
        assert_eq!(err.code(), "x_retryable");
        assert_eq!(err.retry_after_ms(), Some(1_000));
        assert!(err.is_retryable());

        let err = check_status("x", 429, "slow down", Some(3_000)).unwrap_err();
        assert_eq!(err.retry_after_ms(), Some(3_000));
        assert!(err.is_retryable());

        let err = check_status("x", 404, "nope", None).unwrap_err();
        assert_eq!(err.code(), "x_send_failed");
        assert_eq!(err.kind(), ProviderErrorKind::Http(404));
        assert_eq!(err.message(), "status=404 body=nope");
        assert!(!err.is_retryable());
    }

    #[test]
    fn mock_scenarios() {
        assert_eq!(mock_scenario("mock://throttle"), Some("throttle"));
        assert_eq!(mock_scenario("mock://success/extra"), Some("success"));
        assert_eq!(mock_scenario("https://api.example.com"), None);

        assert!(mock_failure("x", "success").is_none());
        assert!(mock_failure("x", "throttle").unwrap().is_retryable());
        assert!(mock_failure("x", "server_error").unwrap().is_retryable());
        assert!(!mock_failure("x", "rejected").unwrap().is_retryable());
        assert_eq!(mock_failure("x", "nonsense").unwrap().code(), "x_mock");
    }

    #[test]
    fn timestamps_accept_both_formats() {
        assert_eq!(
            parse_timestamp(Some("2024-05-01T10:00:00Z")),
            Some(datetime!(2024-05-01 10:00 UTC))
        );
        assert_eq!(
            parse_timestamp(Some("Wed, 01 May 2024 10:00:00 +0000")),
            Some(datetime!(2024-05-01 10:00 UTC))
        );
        assert_eq!(parse_timestamp(Some("")), None);
        assert_eq!(parse_timestamp(Some("yesterday")), None);
        assert_eq!(parse_timestamp(None), None);
    }

    #[test]
    fn reply_decodes_typed_and_raw() {
        #[derive(Debug, serde::Deserialize)]
        struct Body {
            sid: String,
        }
        let reply = HttpReply {
            body: r#"{"sid":"SM1","extra":true}"#.into(),
        };
        let (typed, raw): (Body, Value) = reply.json("x").unwrap();
        assert_eq!(typed.sid, "SM1");
        assert_eq!(raw["extra"], Value::Bool(true));

        let bad = HttpReply { body: "<html>".into() };
        assert_eq!(bad.json::<Body>("x").unwrap_err().code(), "x_response");
    }
}
