use crate::config::HttpTimeouts;
use reqwest::Client;
use std::time::Duration;

/// Shared reqwest client for every outbound call. The request timeout is the
/// upper bound for a single extraction, storage, download or send call.
pub fn build_client(timeouts: &HttpTimeouts) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeouts.request_secs))
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Timeouts and connection failures are worth another attempt; so are
/// throttling and server-side errors.
pub fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.status().is_some_and(is_transient_status)
}

pub fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}
