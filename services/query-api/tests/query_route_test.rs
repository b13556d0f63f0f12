// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use finops_core::provider::{CompletionOptions, LlmClient};
use finops_core::{CellValue, QuerySpec, QueryResult, Result, ResultMetadata, Row};
use finops_datasource::DataSource;
use finops_presentation::Entrypoint;
use tower::ServiceExt;

struct StubLlm;

#[async_trait]
impl LlmClient for StubLlm {
    fn name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
        Ok(r#"{"sql":"SELECT line_item_product_code AS service, SUM(line_item_unblended_cost) AS cost_usd FROM cur_data GROUP BY 1 ORDER BY 2 DESC","explanation":"Top services by cost.","result_columns":["service","cost_usd"],"query_type":"top_services"}"#.to_string())
    }
}

struct StubSource;

#[async_trait]
impl DataSource for StubSource {
    async fn fetch(&self, spec: &QuerySpec) -> QueryResult {
        let mut row: Row = HashMap::new();
        row.insert("service".to_string(), CellValue::String("AmazonEC2".to_string()));
        row.insert("cost_usd".to_string(), CellValue::Float(42.0));
        QueryResult::new(vec![row], ResultMetadata { data_source: "stub".to_string(), query_id: Some(spec.query_id), ..Default::default() })
    }

    fn name(&self) -> &str {
        "stub"
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn app() -> axum::Router {
    let entrypoint = Entrypoint::new(Arc::new(StubLlm), "cur_data", Arc::new(StubSource), None, None);
    let state = query_api::models::app_state(entrypoint);
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder().expect("install recorder once per test binary");
    query_api::build_router(state, handle)
}

#[tokio::test]
async fn health_reports_healthy() {
    let response = app().oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn query_route_returns_unified_response() {
    let body = serde_json::json!({ "query": "top services by cost", "tz_offset_minutes": 0 });
    let request = Request::builder().method("POST").uri("/query").header("content-type", "application/json").body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(value["results"].as_array().unwrap().len() == 1);
    assert!(value["athena_query"].as_str().unwrap().contains("SELECT"));
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let body = serde_json::json!({ "query": "   " });
    let request = Request::builder().method("POST").uri("/query").header("content-type", "application/json").body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
