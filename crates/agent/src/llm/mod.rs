//! Provider clients for text generation.
//!
//! Every vendor sits behind [`ProviderClient`]. A client owns its wire format and how tolerant it
//! is of response shapes; callers only ever see a normalized [`Generation`]. Clients are built by a
//! [`ProviderFactory`], which captures the LLM configuration once.

use std::time::Duration;

use async_trait::async_trait;
use buycar_core::config::ProviderSettings;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;

pub mod factory;
pub mod openai;
pub mod tongyi;
mod transport;

pub use factory::{ConfigProviderFactory, ProviderFactory, ProviderKind};
pub use openai::OpenAiCompatClient;
pub use tongyi::TongyiClient;

pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 20;

/// Normalized result of a generation call.
///
/// `content` is empty when the vendor answered successfully but no text could be extracted; `raw`
/// always holds the response body as received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generation {
    pub content: String,
    pub raw: String,
    pub model: String,
}

impl Generation {
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("llm generation is disabled (set llm.enabled = true)")]
    Disabled,
    #[error("unknown llm provider `{0}`")]
    UnknownProvider(String),
    #[error("invalid provider credentials: {0}")]
    InvalidCredentials(String),
    #[error("{provider} request failed: {message}")]
    Transport { provider: &'static str, message: String },
    #[error("{provider} returned HTTP {status}")]
    Status { provider: &'static str, status: u16, raw: String },
    #[error("{provider} did not respond within {seconds}s")]
    Timeout { provider: &'static str, seconds: u64 },
}

impl ProviderError {
    /// Vendor response body, when the vendor answered at all.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::Status { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> &'static str;

    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<Generation, ProviderError>;
}

/// Unset or zero timeouts fall back to [`DEFAULT_PROVIDER_TIMEOUT_SECS`].
pub fn resolve_timeout(timeout_secs: Option<u64>) -> Duration {
    match timeout_secs {
        Some(secs) if secs > 0 => Duration::from_secs(secs),
        _ => Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
    }
}

/// The configured key, or `InvalidCredentials` naming `llm.<provider>.api_key` when it is blank.
pub(crate) fn require_api_key(
    provider: &'static str,
    settings: &ProviderSettings,
) -> Result<SecretString, ProviderError> {
    settings.api_key.clone().filter(|key| !key.expose_secret().trim().is_empty()).ok_or_else(|| {
        ProviderError::InvalidCredentials(format!("llm.{provider}.api_key must not be empty"))
    })
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub(crate) fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).filter(|text| !text.is_empty()).map(ToString::to_string)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::Value;

    #[derive(Clone, Debug)]
    pub struct CapturedRequest {
        pub authorization: Option<String>,
        pub body: Value,
    }

    #[derive(Clone)]
    struct StubState {
        status: StatusCode,
        body: &'static str,
        delay: Duration,
        captured: Arc<Mutex<Vec<CapturedRequest>>>,
    }

    /// Loopback vendor endpoint answering every POST with a canned status and body.
    pub struct StubVendor {
        pub base_url: String,
        captured: Arc<Mutex<Vec<CapturedRequest>>>,
    }

    impl StubVendor {
        pub async fn start(status: StatusCode, body: &'static str) -> Self {
            Self::start_with_delay(status, body, Duration::ZERO).await
        }

        pub async fn start_with_delay(
            status: StatusCode,
            body: &'static str,
            delay: Duration,
        ) -> Self {
            let captured = Arc::new(Mutex::new(Vec::new()));
            let state = StubState { status, body, delay, captured: captured.clone() };
            let router = Router::new()
                .route("/generate", post(respond))
                .route("/v1/chat/completions", post(respond))
                .with_state(state);

            let listener =
                tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub vendor");
            let address = listener.local_addr().expect("stub vendor address");
            tokio::spawn(async move {
                let _ = axum::serve(listener, router).await;
            });

            Self { base_url: format!("http://{address}"), captured }
        }

        pub fn requests(&self) -> Vec<CapturedRequest> {
            self.captured.lock().expect("captured lock").clone()
        }
    }

    async fn respond(
        State(state): State<StubState>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, String) {
        let authorization = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        state.captured.lock().expect("captured lock").push(CapturedRequest { authorization, body });

        if !state.delay.is_zero() {
            tokio::time::sleep(state.delay).await;
        }
        (state.status, state.body.to_string())
    }
}
