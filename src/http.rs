use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response};

use crate::error::SearchError;

pub fn user_agent() -> String {
    format!("gns/{}", env!("CARGO_PKG_VERSION"))
}

/// Shared client setup: user agent header plus the optional request timeout.
pub fn build_client(timeout: Option<Duration>) -> Result<Client, SearchError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&user_agent())
            .map_err(|err| SearchError::ClientBuild(err.to_string()))?,
    );
    let mut builder = Client::builder().default_headers(headers);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|err| SearchError::ClientBuild(err.to_string()))
}

/// Passes successful responses through; otherwise reads the body and hands
/// status and message to `to_error`.
pub async fn check_status<F>(
    response: Response,
    fallback: &str,
    to_error: F,
) -> Result<Response, SearchError>
where
    F: FnOnce(u16, String) -> SearchError,
{
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .ok()
        .filter(|body| !body.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string());
    Err(to_error(status, message))
}
