// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the FinOps query engine.
//!
//! The taxonomy is concept-level, not a class hierarchy: each variant maps
//! to one of the five response statuses the pipeline can surface
//! (`validation_failed`, `llm_error`, `denied`, a data-source failure, or
//! a benign empty result, which is not an error at all).

/// Result type alias using the engine's `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for FinOps query engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller-supplied value failed an input validator (service code,
    /// region, date, resource id, tag value, account id).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The LLM's response could not be parsed into a usable payload after
    /// all tolerant-parsing passes were exhausted.
    #[error("LLM protocol error: {0}")]
    LlmProtocol(String),

    /// Generated or supplied SQL was rejected by the validator, referenced
    /// an off-table, or failed account-scope verification. Always fatal
    /// for the request that produced it.
    #[error("SQL rejected: {0}")]
    SqlRejected(String),

    /// The tenant scope denied access to one or more referenced accounts.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The underlying data source (Athena, Cost Explorer) failed, timed
    /// out, or returned a transport error.
    #[error("data source error: {0}")]
    DataSource(String),

    /// Configuration error (missing environment variable, malformed value).
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error that does not fit another category.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an LLM protocol error.
    pub fn llm_protocol(msg: impl Into<String>) -> Self {
        Self::LlmProtocol(msg.into())
    }

    /// Create a SQL-rejected error.
    pub fn sql_rejected(msg: impl Into<String>) -> Self {
        Self::SqlRejected(msg.into())
    }

    /// Create an access-denied error.
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    /// Create a data-source error.
    pub fn data_source(msg: impl Into<String>) -> Self {
        Self::DataSource(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The response `status` string this error should surface as, per the
    /// error-handling design's concept-level taxonomy.
    pub fn status(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_failed",
            Error::LlmProtocol(_) => "llm_error",
            Error::SqlRejected(_) => "validation_failed",
            Error::AccessDenied(_) => "denied",
            Error::DataSource(_) => "data_source_error",
            Error::Config(_) => "config_error",
            Error::Serialization(_) => "internal_error",
            Error::Internal(_) => "internal_error",
        }
    }
}
