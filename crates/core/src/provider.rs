// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! The LLM seam the core consumes from.
//!
//! The core never speaks a provider's wire protocol directly; it only
//! ever calls [`LlmClient::complete`]. Everything about model choice,
//! retries, and transport lives on the other side of this trait.

use crate::Result;
use async_trait::async_trait;

/// Options accompanying a single completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Optional system prompt prepended ahead of the user prompt.
    pub system_prompt: Option<String>,
    /// Upper bound on completion tokens. Callers generating SQL payloads
    /// should set this generously (around 12k) since explanations and
    /// SQL bodies can both be long.
    pub max_tokens: u32,
    /// Hint that the caller expects strict JSON back. Providers that
    /// support a JSON response-format mode should honor it; providers
    /// that don't may ignore the hint since the caller always tolerant-
    /// parses the result regardless.
    pub expect_json: bool,
}

impl CompletionOptions {
    /// Build options for a JSON-expecting call with the given token budget.
    pub fn json(max_tokens: u32) -> Self {
        Self {
            system_prompt: None,
            max_tokens,
            expect_json: true,
        }
    }

    /// Attach a system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// A chat-completion provider. The core is responsible for all prompt
/// construction and all response parsing; the provider only moves bytes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name, for logging and metrics labels.
    fn name(&self) -> &str;

    /// Invoke the model and return its raw text response. Implementations
    /// should not attempt to parse or validate the response; that is the
    /// caller's job.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_options_set_expect_json() {
        let opts = CompletionOptions::json(12_000).with_system_prompt("sys");
        assert!(opts.expect_json);
        assert_eq!(opts.max_tokens, 12_000);
        assert_eq!(opts.system_prompt.as_deref(), Some("sys"));
    }
}
