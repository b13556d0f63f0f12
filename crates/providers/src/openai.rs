// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! OpenAI chat-completion client.

use async_trait::async_trait;
use finops_core::provider::{CompletionOptions, LlmClient};
use finops_core::{Error, Result};
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// An [`LlmClient`] backed by OpenAI's chat completions API (or any
/// OpenAI-compatible endpoint, via [`OpenAiClient::with_base_url`]).
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    organization_id: Option<String>,
    model: String,
}

impl OpenAiClient {
    /// Build a client for the given API key, using the default model and
    /// endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            organization_id: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Build a client from `OPENAI_API_KEY`, optionally overridden by
    /// `OPENAI_ORGANIZATION`, `OPENAI_BASE_URL`, and `OPENAI_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| Error::config("OPENAI_API_KEY environment variable not set"))?;
        let mut client = Self::new(api_key);
        if let Ok(org_id) = std::env::var("OPENAI_ORGANIZATION") {
            client.organization_id = Some(org_id);
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            client.base_url = base_url;
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            client.model = model;
        }
        Ok(client)
    }

    /// Set the organization id sent with each request.
    pub fn with_organization(mut self, org_id: impl Into<String>) -> Self {
        self.organization_id = Some(org_id.into());
        self
    }

    /// Override the base URL (for Azure OpenAI or an OpenAI-compatible proxy).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Override the model used for completions.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut messages = Vec::new();
        if let Some(system) = &options.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": options.max_tokens,
        });
        if options.expect_json {
            body["response_format"] = json!({ "type": "json_object" });
        }

        tracing::debug!(provider = "openai", %url, "sending completion request");

        let mut request = self.client.post(&url).bearer_auth(&self.api_key).header("content-type", "application/json");
        if let Some(org) = &self.organization_id {
            request = request.header("OpenAI-Organization", org);
        }

        let response = request.json(&body).send().await.map_err(|e| Error::llm_protocol(format!("openai request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            metrics::counter!("llm_completion_total", "provider" => "openai", "outcome" => "http_error").increment(1);
            return Err(Error::llm_protocol(format!("openai returned {status}: {text}")));
        }

        let parsed: serde_json::Value = response.json().await.map_err(|e| Error::llm_protocol(format!("openai response not valid json: {e}")))?;

        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::llm_protocol("openai response missing choices[0].message.content"))?
            .to_string();

        metrics::counter!("llm_completion_total", "provider" => "openai", "outcome" => "ok").increment(1);
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_model_and_base_url() {
        let client = OpenAiClient::new("sk-test").with_model("gpt-4o-mini").with_base_url("https://proxy.internal/v1");
        assert_eq!(client.model, "gpt-4o-mini");
        assert_eq!(client.base_url, "https://proxy.internal/v1");
        assert_eq!(client.name(), "openai");
    }

    #[test]
    fn from_env_requires_api_key() {
        std::env::remove_var("OPENAI_API_KEY");
        assert!(OpenAiClient::from_env().is_err());
    }
}
