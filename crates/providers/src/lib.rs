// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! [`finops_core::provider::LlmClient`] implementations for the
//! providers the text-to-SQL pipeline calls (§6 "LLM").
//!
//! Each implementation only moves bytes: prompt construction and response
//! parsing live entirely in `finops-textsql`.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
