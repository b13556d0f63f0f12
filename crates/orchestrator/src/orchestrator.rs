// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! [`QueryOrchestrator`]: the business-logic coordinator between data
//! sources (§4.7). It applies defaults, rescues empty ARN queries by
//! searching for related resources, and falls back to a secondary data
//! source for high-level summaries Athena couldn't answer. It never
//! formats a result; that's the presentation layer's job.

use chrono::{Duration, Utc};
use finops_core::{Dimension, Granularity, Intent, PeriodType, QueryResult, QuerySpec, TimeRange, TimeRangeSource};
use finops_datasource::DataSource;

fn default_time_range() -> TimeRange {
    let end = Utc::now().date_naive();
    let start = end - Duration::days(30);
    TimeRange {
        start,
        end,
        granularity: Granularity::Daily,
        description: "last 30 days".to_string(),
        source: TimeRangeSource::Default,
        period_type: PeriodType::Rolling,
        metadata: Default::default(),
    }
}

/// Classify the implied resource type from an ARN's resource part, for
/// the human explanation attached to an ARN-rescue related-resources
/// query.
fn resource_type_explanation(arn: &str) -> &'static str {
    if arn.contains(":cluster/") {
        "tasks and services"
    } else if arn.contains(":vpc-") || arn.contains(":vpc/") {
        "VPC resources (NAT Gateway, VPN, etc.)"
    } else if arn.contains(":securitygroup") || arn.contains(":sg-") {
        "associated resources"
    } else {
        "resources"
    }
}

/// Coordinates a primary data source (Athena) and an optional fallback
/// (Cost Explorer), applying defaulting and rescue rules around both.
pub struct QueryOrchestrator {
    primary: std::sync::Arc<dyn DataSource>,
    fallback: Option<std::sync::Arc<dyn DataSource>>,
}

impl QueryOrchestrator {
    /// Build an orchestrator with a required primary source and an
    /// optional fallback.
    pub fn new(primary: std::sync::Arc<dyn DataSource>, fallback: Option<std::sync::Arc<dyn DataSource>>) -> Self {
        Self { primary, fallback }
    }

    /// Run the full orchestration flow for `spec`: apply defaults, fetch
    /// from the primary source, rescue an empty ARN query via a
    /// related-resources re-query, and fall back to the secondary source
    /// if the query is eligible and still empty.
    pub async fn execute(&self, spec: QuerySpec) -> QueryResult {
        let spec = Self::apply_defaults(spec);

        tracing::info!(query_id = %spec.query_id, intent = spec.intent.as_str(), arn = ?spec.arn, "orchestrator executing query");

        let mut result = self.primary.fetch(&spec).await;

        if result.is_empty() && spec.arn.is_some() && result.succeeded() {
            tracing::info!(arn = ?spec.arn, query_id = %spec.query_id, "ARN query returned no results, trying related resources");
            let related_spec = Self::create_related_resources_spec(&spec);
            let related_result = self.primary.fetch(&related_spec).await;
            if related_result.has_data() {
                tracing::info!(count = related_result.row_count(), total_cost = related_result.total_cost(), "found related resources");
                let mut related_result = related_result;
                related_result.metadata.arn_fallback = true;
                related_result.metadata.original_arn = spec.arn.clone();
                result = related_result;
            }
        }

        if result.is_empty() {
            if let Some(fallback) = &self.fallback {
                if Self::should_use_fallback(&spec) {
                    tracing::info!(primary = self.primary.name(), fallback = fallback.name(), query_id = %spec.query_id, "primary source returned no data, trying fallback source");
                    let fallback_result = fallback.fetch(&spec).await;
                    if fallback_result.has_data() {
                        tracing::info!(source = fallback.name(), row_count = fallback_result.row_count(), total_cost = fallback_result.total_cost(), "fallback source returned data");
                        result = fallback_result;
                    }
                }
            }
        }

        tracing::info!(
            query_id = %spec.query_id,
            has_data = result.has_data(),
            row_count = result.row_count(),
            data_source = %result.metadata.data_source,
            arn_fallback = result.metadata.arn_fallback,
            cost_explorer_fallback = result.metadata.cost_explorer_fallback,
            "orchestrator execution complete"
        );

        result
    }

    /// `top_n` defaults to 5 for `TOP_N_RANKING`; a missing time range
    /// defaults to the last 30 days, sourced as `Default`.
    fn apply_defaults(mut spec: QuerySpec) -> QuerySpec {
        if spec.intent == Intent::TopNRanking {
            let has_top_n = spec.metadata.get("top_n").and_then(|v| v.as_u64()).filter(|n| *n > 0).is_some();
            if !has_top_n {
                spec.metadata.insert("top_n".to_string(), serde_json::json!(5));
                tracing::info!("applied default top_n=5 for top_n_ranking query");
            }
        }

        if spec.time_range.is_none() {
            let time_range = default_time_range();
            tracing::info!(start_date = %time_range.start, end_date = %time_range.end, "applied default time range");
            spec.time_range = Some(time_range);
        }

        spec
    }

    /// Whether `spec` is within Cost Explorer's eligible surface: no
    /// ARN, `cost_breakdown`/`top_n_ranking` only, no specific service
    /// filter, and no dimension beyond `service`. Deliberately narrower
    /// than [`finops_datasource::CostExplorerDataSource::is_supported`],
    /// which also allows `cost_trend` as its own independent guard.
    fn should_use_fallback(spec: &QuerySpec) -> bool {
        if spec.arn.is_some() {
            return false;
        }
        if !matches!(spec.intent, Intent::CostBreakdown | Intent::TopNRanking) {
            return false;
        }
        if !spec.services.is_empty() {
            return false;
        }
        if !spec.dimensions.is_empty() && spec.dimensions != [Dimension::Service] {
            return false;
        }
        tracing::info!(intent = spec.intent.as_str(), "query eligible for cost explorer fallback");
        true
    }

    /// Build the related-resources re-query for an ARN that produced no
    /// direct cost rows: `cost_breakdown` grouped by `resource_type`,
    /// preserving the ARN and filters, with metadata explaining what
    /// kind of resource the ARN's shape implies.
    fn create_related_resources_spec(spec: &QuerySpec) -> QuerySpec {
        let arn = spec.arn.clone().expect("caller only invokes this for ARN queries");
        let explanation = resource_type_explanation(&arn);

        let mut related = spec.clone();
        related.query_id = uuid::Uuid::new_v4();
        related.intent = Intent::CostBreakdown;
        related.dimensions = vec![Dimension::ResourceType];
        related.metadata.insert("related_resources_query".to_string(), serde_json::json!(true));
        related.metadata.insert("resource_type_explanation".to_string(), serde_json::json!(explanation));
        related.metadata.insert("breakdown_dimension".to_string(), serde_json::json!("resource_type"));
        related.metadata.insert("breakdown_dimension_label".to_string(), serde_json::json!("Resource Type"));

        tracing::info!(original_arn = %arn, resource_type = explanation, "created related resources spec");
        related
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use finops_core::{CellValue, ResultMetadata, Row};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct StubSource {
        name: &'static str,
        responses: Mutex<Vec<QueryResult>>,
        calls: Mutex<Vec<QuerySpec>>,
    }

    impl StubSource {
        fn new(name: &'static str, responses: Vec<QueryResult>) -> Self {
            Self { name, responses: Mutex::new(responses), calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl DataSource for StubSource {
        async fn fetch(&self, spec: &QuerySpec) -> QueryResult {
            self.calls.lock().unwrap().push(spec.clone());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                QueryResult::new(Vec::new(), ResultMetadata { data_source: self.name.to_string(), ..Default::default() })
            } else {
                responses.remove(0)
            }
        }

        fn name(&self) -> &str {
            self.name
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn row(service: &str, cost: f64) -> Row {
        let mut row: Row = HashMap::new();
        row.insert("service".to_string(), CellValue::String(service.to_string()));
        row.insert("cost_usd".to_string(), CellValue::Float(cost));
        row
    }

    #[tokio::test]
    async fn applies_defaults_for_missing_time_range_and_top_n() {
        let primary = Arc::new(StubSource::new("athena", vec![QueryResult::new(vec![row("AmazonEC2", 10.0)], ResultMetadata { data_source: "athena".to_string(), ..Default::default() })]));
        let orchestrator = QueryOrchestrator::new(primary.clone(), None);

        let spec = QuerySpec::new(Intent::TopNRanking);
        orchestrator.execute(spec).await;

        let call = primary.calls.lock().unwrap().remove(0);
        assert!(call.time_range.is_some());
        assert_eq!(call.metadata.get("top_n").and_then(|v| v.as_u64()), Some(5));
    }

    #[tokio::test]
    async fn rescues_empty_arn_query_via_related_resources() {
        let primary = Arc::new(StubSource::new(
            "athena",
            vec![
                QueryResult::new(Vec::new(), ResultMetadata { data_source: "athena".to_string(), ..Default::default() }),
                QueryResult::new(vec![row("AmazonECS", 4.0)], ResultMetadata { data_source: "athena".to_string(), ..Default::default() }),
            ],
        ));
        let orchestrator = QueryOrchestrator::new(primary.clone(), None);

        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.time_range = Some(default_time_range());
        spec.arn = Some("arn:aws:ecs:us-east-1:123456789012:cluster/my-cluster".to_string());

        let result = orchestrator.execute(spec).await;

        assert!(result.has_data());
        assert!(result.metadata.arn_fallback);
        assert_eq!(result.metadata.original_arn.as_deref(), Some("arn:aws:ecs:us-east-1:123456789012:cluster/my-cluster"));

        let calls = primary.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].dimensions, vec![Dimension::ResourceType]);
        assert_eq!(calls[1].metadata.get("resource_type_explanation").and_then(|v| v.as_str()), Some("tasks and services"));
    }

    #[tokio::test]
    async fn does_not_rescue_arn_query_when_primary_failed() {
        let primary = Arc::new(StubSource::new(
            "athena",
            vec![QueryResult::failed("boom", ResultMetadata { data_source: "athena".to_string(), ..Default::default() })],
        ));
        let orchestrator = QueryOrchestrator::new(primary.clone(), None);

        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.time_range = Some(default_time_range());
        spec.arn = Some("arn:aws:ec2:us-east-1:123456789012:instance/i-1".to_string());

        orchestrator.execute(spec).await;
        assert_eq!(primary.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_cost_explorer_for_eligible_empty_query() {
        let primary = Arc::new(StubSource::new("athena", vec![QueryResult::new(Vec::new(), ResultMetadata { data_source: "athena".to_string(), ..Default::default() })]));
        let fallback = Arc::new(StubSource::new("cost_explorer", vec![QueryResult::new(vec![row("AmazonEC2", 8.0)], ResultMetadata { data_source: "cost_explorer".to_string(), cost_explorer_fallback: true, ..Default::default() })]));
        let orchestrator = QueryOrchestrator::new(primary, Some(fallback.clone()));

        let mut spec = QuerySpec::new(Intent::TopNRanking);
        spec.time_range = Some(default_time_range());

        let result = orchestrator.execute(spec).await;
        assert!(result.has_data());
        assert!(result.metadata.cost_explorer_fallback);
        assert_eq!(fallback.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn skips_fallback_for_service_filtered_query() {
        let primary = Arc::new(StubSource::new("athena", vec![QueryResult::new(Vec::new(), ResultMetadata { data_source: "athena".to_string(), ..Default::default() })]));
        let fallback = Arc::new(StubSource::new("cost_explorer", vec![]));
        let orchestrator = QueryOrchestrator::new(primary, Some(fallback.clone()));

        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.time_range = Some(default_time_range());
        spec.services = vec!["AmazonEC2".to_string()];

        orchestrator.execute(spec).await;
        assert!(fallback.calls.lock().unwrap().is_empty());
    }
}
