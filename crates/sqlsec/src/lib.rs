// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! SQL statement validation and account-scope enforcement.
//!
//! Athena has no end-to-end parameter binding and LLM-generated SQL may
//! carry the influence of a prompt injection, so every generated
//! statement passes through [`SqlValidator::validate`] before it is
//! ever executed, logged in full, or returned to a caller. Tenant
//! isolation is a second, independent concern handled by
//! [`AccountScopeEnforcer`], applied both right after generation and
//! again immediately before submission.

mod scope;
mod validator;

pub use scope::AccountScopeEnforcer;
pub use validator::SqlValidator;
