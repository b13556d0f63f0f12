// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Request/response envelopes and shared app state for the `POST /query`
//! route, mirroring the retrieved analytics-api service's
//! `models.rs`/`AppState` shape.

use std::sync::Arc;

use finops_core::{ConversationContext, RequestContext};
use finops_presentation::Entrypoint;
use serde::{Deserialize, Serialize};

/// Shared application state, handed to every handler via axum's `State`
/// extractor.
pub struct AppState {
    /// The fully wired query pipeline.
    pub entrypoint: Entrypoint,
}

/// `POST /query` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    /// The natural-language question.
    pub query: String,
    /// Opaque conversation id, echoed back unchanged; the caller uses it
    /// to correlate turns in its own store.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Flattened `(query, response)` pairs from prior turns, oldest
    /// first; only the last six are used by the generator's prompt.
    #[serde(default)]
    pub chat_history: Vec<(String, String)>,
    /// The previous turn's `context` field, verbatim.
    #[serde(default)]
    pub previous_context: Option<ConversationContext>,
    /// The caller's tenant scope. Omit only for single-tenant/local
    /// deployments; the entrypoint runs unscoped (admin-equivalent) when
    /// absent.
    #[serde(default)]
    pub request_context: Option<RequestContext>,
    /// IANA-less fixed UTC offset, in minutes, used to anchor relative
    /// time expressions. Defaults to UTC.
    #[serde(default)]
    pub tz_offset_minutes: i32,
}

/// `POST /query` response body: the conversation id plus the pipeline's
/// `UnifiedResponse` envelope.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    /// Echoes the request's `conversation_id`, if any.
    pub conversation_id: Option<String>,
    /// The pipeline's response.
    #[serde(flatten)]
    pub response: finops_core::UnifiedResponse,
}

/// `GET /health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"healthy"` once the service can answer requests.
    pub status: String,
    /// RFC 3339 timestamp.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Uniform error envelope for non-2xx responses.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

/// Wrap an [`Entrypoint`] in the `Arc<AppState>` axum handlers expect.
pub fn app_state(entrypoint: Entrypoint) -> Arc<AppState> {
    Arc::new(AppState { entrypoint })
}
