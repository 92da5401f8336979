//! DashScope (Tongyi Qianwen) text-generation client.

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

pub const PROVIDER: &str = "tongyi";
pub const DEFAULT_MODEL: &str = "qwen-plus";
pub const DEFAULT_ENDPOINT: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation";

#[derive(Debug)]
pub struct TongyiClient {
    api_key: SecretString,
    model: String,
    endpoint: String,
    timeout: Duration,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct TongyiRequest<'a> {
    model: &'a str,
    input: &'a str,
    parameters: TongyiParameters,
}

#[derive(Serialize)]
struct TongyiParameters {
    result_format: &'static str,
}

impl TongyiClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = require_api_key(PROVIDER, settings)?;
        let timeout = resolve_timeout(settings.timeout_secs);
        let endpoint = non_blank(settings.endpoint.as_deref()).unwrap_or(DEFAULT_ENDPOINT);

        Ok(Self {
            api_key,
            model: non_blank(settings.model.as_deref()).unwrap_or(DEFAULT_MODEL).to_string(),
            endpoint: endpoint.to_string(),
            timeout,
            http: build_http_client(PROVIDER, timeout)?,
        })
    }
}

#[async_trait]
impl ProviderClient for TongyiClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, ProviderError> {
        let request = TongyiRequest {
            model: &self.model,
            input: prompt,
            parameters: TongyiParameters { result_format: "text" },
        };
        let raw =
            post_json(&self.http, PROVIDER, &self.endpoint, &self.api_key, self.timeout, &request)
                .await?;

        let content = extract_text(&raw).unwrap_or_default();
        Ok(Generation { content, raw, model: self.model.clone() })
    }
}

/// Finds the generated text in a DashScope response.
///
/// Tried in order: `output_text`, `output.text`, `output.choices[0].message.content[0].text`,
/// then `output.choices[0].message.content` as a plain string.
pub fn extract_text(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;

    if let Some(text) = non_empty_str(value.get("output_text")) {
        return Some(text);
    }

    let output = value.get("output")?;
    non_empty_str(output.get("text"))
        .or_else(|| non_empty_str(output.pointer("/choices/0/message/content/0/text")))
        .or_else(|| non_empty_str(output.pointer("/choices/0/message/content")))
}
