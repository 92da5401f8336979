//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use buycar_core::config::ProviderSettings;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;

use super::transport::{build_http_client, post_json};
use super::{
    non_blank, non_empty_str, require_api_key, resolve_timeout, Generation, ProviderClient,
    ProviderError,
};

pub const PROVIDER: &str = "openai";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const SYSTEM_PROMPT: &str =
    "You are a senior automotive consultant who gives concise, accurate vehicle recommendations.";

#[derive(Debug)]
pub struct OpenAiCompatClient {
    api_key: SecretString,
    model: String,
    url: String,
    timeout: Duration,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl OpenAiCompatClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = require_api_key(PROVIDER, settings)?;
        let timeout = resolve_timeout(settings.timeout_secs);
        let model = non_blank(settings.model.as_deref()).unwrap_or(DEFAULT_MODEL);
        let base = non_blank(settings.endpoint.as_deref()).unwrap_or(DEFAULT_ENDPOINT);

        Ok(Self {
            api_key,
            model: model.to_string(),
            url: chat_completions_url(base),
            timeout,
            http: build_http_client(PROVIDER, timeout)?,
        })
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
        };
        let raw = post_json(&self.http, PROVIDER, &self.url, &self.api_key, self.timeout, &request)
            .await?;

        let content = extract_text(&raw).unwrap_or_default();
        let model = reported_model(&raw).unwrap_or_else(|| self.model.clone());
        Ok(Generation { content, raw, model })
    }
}

/// Accepts either a base URL (`https://host/v1`) or the full completions URL.
fn chat_completions_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

/// Tried in order: `choices[0].message.content` as a string, its first text part, then a
/// top-level `output_text`. Empty candidates fall through to the next shape.
pub fn extract_text(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;

    non_empty_str(value.pointer("/choices/0/message/content"))
        .or_else(|| non_empty_str(value.pointer("/choices/0/message/content/0/text")))
        .or_else(|| non_empty_str(value.get("output_text")))
}

// Gateways often route to a different concrete model than the one requested.
fn reported_model(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    non_empty_str(value.get("model"))
}
