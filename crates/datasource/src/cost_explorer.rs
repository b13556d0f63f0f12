// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! [`CostExplorerDataSource`]: the cross-source fallback used when
//! Athena is unavailable or returns no data for a high-level summary
//! query (§4.7).

use std::collections::HashMap as StdHashMap;
use std::time::Instant;

use aws_sdk_costexplorer::types::{DateInterval, Dimension as CeDimensionKey, Granularity as CeGranularity, GroupDefinition, GroupDefinitionType};
use aws_sdk_costexplorer::Client;
use finops_core::{CellValue, Intent, QueryResult, QuerySpec, ResultMetadata, Row};

use crate::source::DataSource;

/// Wraps `GetCostAndUsage`, grouped by service, as a same-shaped
/// fallback for the subset of queries Cost Explorer can answer.
pub struct CostExplorerDataSource {
    client: Client,
}

impl CostExplorerDataSource {
    /// Build a fallback source from an existing Cost Explorer client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Whether `spec` is within Cost Explorer's limited surface: no
    /// ARN, no dimension beyond `service`, and one of the three
    /// summary-level intents (§4.7's `_should_use_fallback`/
    /// `_is_supported` union).
    pub fn is_supported(spec: &QuerySpec) -> bool {
        if spec.arn.is_some() {
            return false;
        }
        if !spec.dimensions.is_empty() && spec.dimensions != [finops_core::Dimension::Service] {
            return false;
        }
        matches!(spec.intent, Intent::CostBreakdown | Intent::TopNRanking | Intent::CostTrend)
    }
}

#[async_trait::async_trait]
impl DataSource for CostExplorerDataSource {
    async fn fetch(&self, spec: &QuerySpec) -> QueryResult {
        let start = Instant::now();

        if !Self::is_supported(spec) {
            return QueryResult::failed(
                "Cost Explorer does not support this query type",
                ResultMetadata {
                    data_source: "cost_explorer".to_string(),
                    query_id: Some(spec.query_id),
                    execution_time_ms: start.elapsed().as_millis() as u64,
                    ..Default::default()
                },
            );
        }

        let Some(time_range) = &spec.time_range else {
            return QueryResult::failed(
                "query is missing a resolved time range",
                ResultMetadata {
                    data_source: "cost_explorer".to_string(),
                    query_id: Some(spec.query_id),
                    ..Default::default()
                },
            );
        };

        let interval = DateInterval::builder()
            .start(time_range.start.to_string())
            .end((time_range.end + chrono::Duration::days(1)).to_string())
            .build()
            .expect("start and end are always set");

        let group_by = GroupDefinition::builder().r#type(GroupDefinitionType::Dimension).key(CeDimensionKey::Service.as_str()).build();

        let response = self
            .client
            .get_cost_and_usage()
            .time_period(interval)
            .granularity(CeGranularity::Monthly)
            .metrics("UnblendedCost")
            .group_by(group_by)
            .send()
            .await;

        let execution_time_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(output) => {
                metrics::counter!("cost_explorer_query_total", "outcome" => "success").increment(1);
                let rows = Self::rows_from_response(&output);
                QueryResult::new(
                    rows,
                    ResultMetadata {
                        data_source: "cost_explorer".to_string(),
                        execution_time_ms,
                        query_id: Some(spec.query_id),
                        cost_explorer_fallback: true,
                        extra: [("fallback_reason".to_string(), serde_json::json!("athena_unavailable_or_empty"))].into_iter().collect(),
                        ..Default::default()
                    },
                )
            }
            Err(error) => {
                tracing::error!(error = %error, query_id = %spec.query_id, "Cost Explorer query failed");
                metrics::counter!("cost_explorer_query_total", "outcome" => "error").increment(1);
                QueryResult::failed(
                    error.to_string(),
                    ResultMetadata {
                        data_source: "cost_explorer".to_string(),
                        execution_time_ms,
                        query_id: Some(spec.query_id),
                        ..Default::default()
                    },
                )
            }
        }
    }

    fn name(&self) -> &str {
        "cost_explorer"
    }

    async fn health_check(&self) -> bool {
        self.client
            .get_cost_and_usage()
            .time_period(
                DateInterval::builder()
                    .start(chrono::Utc::now().date_naive().to_string())
                    .end((chrono::Utc::now().date_naive() + chrono::Duration::days(1)).to_string())
                    .build()
                    .expect("start and end are always set"),
            )
            .granularity(CeGranularity::Daily)
            .metrics("UnblendedCost")
            .send()
            .await
            .is_ok()
    }
}

impl CostExplorerDataSource {
    fn rows_from_response(output: &aws_sdk_costexplorer::operation::get_cost_and_usage::GetCostAndUsageOutput) -> Vec<Row> {
        let mut rows = Vec::new();
        for result in output.results_by_time() {
            for group in result.groups() {
                let Some(service) = group.keys().first() else { continue };
                let Some(metric) = group.metrics().and_then(|m| m.get("UnblendedCost")) else { continue };
                let Some(amount) = metric.amount() else { continue };
                let mut row: Row = StdHashMap::new();
                row.insert("service".to_string(), CellValue::String(service.clone()));
                row.insert("cost_usd".to_string(), CellValue::coerce(amount));
                rows.push(row);
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finops_core::Dimension;

    #[test]
    fn is_supported_rejects_arn_queries() {
        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.arn = Some("arn:aws:ec2:us-east-1:123456789012:instance/i-1".to_string());
        assert!(!CostExplorerDataSource::is_supported(&spec));
    }

    #[test]
    fn is_supported_rejects_non_service_dimensions() {
        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.dimensions = vec![Dimension::Region];
        assert!(!CostExplorerDataSource::is_supported(&spec));
    }

    #[test]
    fn is_supported_accepts_plain_top_n_ranking() {
        let spec = QuerySpec::new(Intent::TopNRanking);
        assert!(CostExplorerDataSource::is_supported(&spec));
    }

    #[test]
    fn is_supported_rejects_unrelated_intents() {
        let spec = QuerySpec::new(Intent::Governance);
        assert!(!CostExplorerDataSource::is_supported(&spec));
    }
}
