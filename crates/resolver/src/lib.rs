// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Free-text AWS service name resolution to canonical CUR product
//! codes.
//!
//! [`ServiceResolver::resolve`] runs a short-circuiting pipeline: a
//! curated synonym dictionary, then fuzzy matching against the
//! distinct product codes actually present in CUR data, then (if
//! wired with an LLM) constrained arbitration among the fuzzy
//! candidates, and finally a fallback that asks the caller to handle
//! the ambiguity itself.

mod resolver;
mod synonyms;

pub use resolver::{normalize, ServiceResolver};
