// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Thin axum surface over the FinOps query pipeline: `GET /health`,
//! `GET /metrics`, `POST /query`. Mirrors the retrieved analytics-api
//! service's router/middleware layering (§10 of SPEC_FULL.md), with the
//! persistence-backed routes replaced by the single pipeline entrypoint.

pub mod models;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use models::{AppState, HealthResponse};

/// Build the full application router: health, metrics, and query routes
/// behind tracing, timeout, and CORS layers.
pub fn build_router(state: Arc<AppState>, prometheus_handle: PrometheusHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(
            std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(move || async move { prometheus_handle.render() }))
        .merge(routes::routes())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO)).on_response(DefaultOnResponse::new().level(tracing::Level::INFO)))
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy".to_string(), timestamp: chrono::Utc::now() })
}

/// Install the Prometheus recorder with the same latency buckets the
/// retrieved service configures, less the database-specific histogram
/// (this service has no database to measure).
pub fn setup_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

    let builder = PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("http_request_duration_seconds".to_string()),
        &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
    )?;

    Ok(builder.install_recorder()?)
}
