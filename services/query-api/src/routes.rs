// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! The one business route this service exposes, plus the error mapping
//! shared with its axum handlers. Grounded on the retrieved
//! analytics-api service's `ApiError`/`IntoResponse` pattern.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::post;
use tracing::instrument;

use crate::models::{AppState, ErrorResponse, QueryRequest, QueryResponse};

/// Mount `POST /query` under the given state.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/query", post(run_query))
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::BadRequest(message) = self;
        (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: "bad_request".to_string(), message })).into_response()
    }
}

#[instrument(skip(state, body), fields(query = %body.query))]
async fn run_query(State(state): State<Arc<AppState>>, Json(body): Json<QueryRequest>) -> Result<Json<QueryResponse>, ApiError> {
    if body.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let tz = chrono::FixedOffset::east_opt(body.tz_offset_minutes * 60).ok_or_else(|| ApiError::BadRequest("tz_offset_minutes out of range".to_string()))?;

    let response = state
        .entrypoint
        .execute(&body.query, &body.chat_history, body.previous_context.as_ref(), body.request_context.as_ref(), &tz)
        .await;

    Ok(Json(QueryResponse { conversation_id: body.conversation_id, response }))
}
