use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use super::ProviderError;

pub(crate) fn build_http_client(
    provider: &'static str,
    timeout: Duration,
) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder().timeout(timeout).build().map_err(|error| ProviderError::Transport {
        provider,
        message: format!("could not build http client: {error}"),
    })
}

/// POSTs `body` as JSON with bearer auth and returns the response body.
///
/// Non-2xx answers become [`ProviderError::Status`] with the body kept verbatim.
pub(crate) async fn post_json<T>(
    http: &reqwest::Client,
    provider: &'static str,
    url: &str,
    api_key: &SecretString,
    timeout: Duration,
    body: &T,
) -> Result<String, ProviderError>
where
    T: Serialize + ?Sized,
{
    let response = http
        .post(url)
        .bearer_auth(api_key.expose_secret())
        .json(body)
        .send()
        .await
        .map_err(|error| request_error(provider, timeout, error))?;

    let status = response.status();
    let raw = response.text().await.map_err(|error| request_error(provider, timeout, error))?;
    debug!(provider, status = status.as_u16(), body_bytes = raw.len(), "provider responded");

    if !status.is_success() {
        return Err(ProviderError::Status { provider, status: status.as_u16(), raw });
    }
    Ok(raw)
}

fn request_error(
    provider: &'static str,
    timeout: Duration,
    error: reqwest::Error,
) -> ProviderError {
    if error.is_timeout() {
        return ProviderError::Timeout { provider, seconds: timeout.as_secs() };
    }
    ProviderError::Transport { provider, message: error.without_url().to_string() }
}
