// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Anthropic (Claude) chat-completion client.

use async_trait::async_trait;
use finops_core::provider::{CompletionOptions, LlmClient};
use finops_core::{Error, Result};
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// An [`LlmClient`] backed by Anthropic's Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    api_version: String,
    model: String,
}

impl AnthropicClient {
    /// Build a client for the given API key, using the default model and
    /// endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Build a client from `ANTHROPIC_API_KEY`, optionally overridden by
    /// `ANTHROPIC_BASE_URL`, `ANTHROPIC_API_VERSION`, and `ANTHROPIC_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| Error::config("ANTHROPIC_API_KEY environment variable not set"))?;
        let mut client = Self::new(api_key);
        if let Ok(base_url) = std::env::var("ANTHROPIC_BASE_URL") {
            client.base_url = base_url;
        }
        if let Ok(version) = std::env::var("ANTHROPIC_API_VERSION") {
            client.api_version = version;
        }
        if let Ok(model) = std::env::var("ANTHROPIC_MODEL") {
            client.model = model;
        }
        Ok(client)
    }

    /// Override the model used for completions.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut body = json!({
            "model": self.model,
            "max_tokens": options.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(system) = &options.system_prompt {
            body["system"] = json!(system);
        }

        tracing::debug!(provider = "anthropic", %url, "sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::llm_protocol(format!("anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            metrics::counter!("llm_completion_total", "provider" => "anthropic", "outcome" => "http_error").increment(1);
            return Err(Error::llm_protocol(format!("anthropic returned {status}: {text}")));
        }

        let parsed: serde_json::Value = response.json().await.map_err(|e| Error::llm_protocol(format!("anthropic response not valid json: {e}")))?;

        let content = parsed["content"][0]["text"]
            .as_str()
            .ok_or_else(|| Error::llm_protocol("anthropic response missing content[0].text"))?
            .to_string();

        metrics::counter!("llm_completion_total", "provider" => "anthropic", "outcome" => "ok").increment(1);
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_model() {
        let client = AnthropicClient::new("test-key").with_model("claude-3-opus-20240229");
        assert_eq!(client.model, "claude-3-opus-20240229");
        assert_eq!(client.name(), "anthropic");
    }

    #[test]
    fn from_env_requires_api_key() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        assert!(AnthropicClient::from_env().is_err());
    }
}
