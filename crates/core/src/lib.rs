// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core types, traits, and utilities for the FinOps query engine.
//!
//! This crate provides the foundational types and traits used across all
//! components of the pipeline: the normalized query representation, the
//! result envelope, the tenant scoping model, the LLM provider seam, and
//! the input validators that every caller-supplied value must pass before
//! it reaches SQL.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod provider;
pub mod types;
pub mod validation;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use types::*;
