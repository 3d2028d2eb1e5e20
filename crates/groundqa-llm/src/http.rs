//! Shared blocking HTTP plumbing and error classification for the clients.

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::time::Duration;

use crate::error::LlmError;

/// Timeout for availability probes and model listing.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn build_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Config(format!("http client: {e}")))
}

/// Map a transport failure onto a failure class. `what` names the service.
pub(crate) fn classify(what: &str, e: &reqwest::Error) -> LlmError {
    let text = describe(e);
    if e.is_timeout() {
        LlmError::Timeout(format!("{what}: {text}"))
    } else if e.is_connect() {
        LlmError::Unreachable(format!("{what}: {text}"))
    } else {
        LlmError::Request(format!("{what}: {text}"))
    }
}

/// Map a non-success status onto a failure class. Client errors other than
/// 408 and 429 will not succeed on a retry. The cloud API reports a bad key as
/// 400 with an `API_KEY_INVALID` reason.
pub(crate) fn status_error(what: &str, status: StatusCode, body: &str) -> LlmError {
    let invalid_key = body.contains("API_KEY_INVALID");
    let body: String = body.chars().take(200).collect();
    let msg = format!("{what} returned {status}: {body}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth(msg),
        StatusCode::BAD_REQUEST if invalid_key => LlmError::Auth(msg),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => LlmError::Request(msg),
        s if s.is_client_error() => LlmError::Config(msg),
        _ => LlmError::Request(msg),
    }
}

/// Non-success statuses become errors; otherwise the body text is returned.
pub(crate) fn read_body(what: &str, resp: Response) -> Result<String, LlmError> {
    let status = resp.status();
    let body = resp.text().map_err(|e| classify(what, &e))?;
    if status.is_success() { Ok(body) } else { Err(status_error(what, status, &body)) }
}

/// Error text with any request URL query redacted; the cloud client passes its
/// key as a query parameter.
pub(crate) fn describe(e: &reqwest::Error) -> String {
    match e.url() {
        Some(url) => e.to_string().replace(url.as_str(), &redact(url.as_str())),
        None => e.to_string(),
    }
}

/// Drop the query string, which may carry an API key.
pub(crate) fn redact(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?<redacted>"),
        None => url.to_string(),
    }
}
