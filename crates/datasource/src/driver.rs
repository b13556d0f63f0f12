// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! [`AthenaDriver`]: the default `DataSource`, executing either
//! LLM-generated SQL or one of the programmatic templates against
//! Amazon Athena (§4.6).

use std::collections::HashMap as StdHashMap;
use std::time::{Duration, Instant};

use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};
use aws_sdk_athena::Client;
use finops_core::{CellValue, Dimension, Intent, QueryResult, QuerySpec, ResultMetadata, Row};

use crate::source::DataSource;
use crate::templates::CurTemplates;

const META_SERVICES: &[&str] = &["aws cost explorer", "cost explorer", "aws support", "support"];
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLL_ATTEMPTS: u32 = 30;

fn string_vec(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Executes SQL against Amazon Athena, submitting, polling, paginating,
/// and type-coercing results per §4.6.
pub struct AthenaDriver {
    client: Client,
    database: String,
    output_location: String,
    templates: CurTemplates,
}

impl AthenaDriver {
    /// Build a driver against `database.cur_table`, writing query
    /// results under `output_location` (an `s3://` URI). Callers
    /// typically build `client` from `aws_config::load_from_env()`.
    pub fn new(client: Client, database: impl Into<String>, cur_table: impl Into<String>, output_location: impl Into<String>) -> Self {
        let database = database.into();
        let cur_table = cur_table.into();
        Self {
            client,
            templates: CurTemplates::new(database.clone(), cur_table),
            database,
            output_location: output_location.into(),
        }
    }

    /// Compose the SQL to execute for `spec`, per the template-selection
    /// rules in §4.6 step 1: an upstream `generated_sql` entry always
    /// wins, then ARN-related-resources, then direct ARN lookup, then
    /// intent-specific templates, finally a total-cost fallback.
    fn compose_sql(&self, spec: &QuerySpec) -> Option<String> {
        if let Some(sql) = spec.metadata.get("generated_sql").and_then(|v| v.as_str()) {
            return Some(sql.to_string());
        }

        let time_range = spec.time_range.as_ref()?;
        let (start, end) = (time_range.start, time_range.end);

        if let Some(arn) = &spec.arn {
            if spec.dimensions == [Dimension::ResourceType] {
                return Some(self.templates.related_resources_by_arn_pattern(start, end, arn));
            }
            return Some(self.templates.resource_cost_by_arn(start, end, arn));
        }

        match spec.intent {
            Intent::TopNRanking => {
                let top_n = spec.metadata.get("top_n").and_then(|v| v.as_u64()).unwrap_or(5) as u32;
                let include = string_vec(spec.metadata.get("services"));
                let exclude = string_vec(spec.metadata.get("exclude_services"));
                Some(self.templates.top_n_services(start, end, top_n, &include, &exclude))
            }
            Intent::CostBreakdown if spec.services.len() == 1 && spec.dimensions.len() == 1 => {
                Some(self.templates.service_cost_breakdown(start, end, &spec.services[0], spec.dimensions[0].column()))
            }
            Intent::Comparative => {
                let prev_start = spec
                    .metadata
                    .get("previous_start")
                    .and_then(|v| v.as_str())
                    .and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
                let prev_end = spec
                    .metadata
                    .get("previous_end")
                    .and_then(|v| v.as_str())
                    .and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
                let span = end.signed_duration_since(start);
                let (prev_start, prev_end) = match (prev_start, prev_end) {
                    (Some(s), Some(e)) => (s, e),
                    _ => (start - span - chrono::Duration::days(1), start - chrono::Duration::days(1)),
                };
                let top_n = spec.metadata.get("top_n").and_then(|v| v.as_u64()).unwrap_or(5) as u32;
                Some(self.templates.period_over_period_comparison(start, end, prev_start, prev_end, top_n, &spec.services))
            }
            Intent::CostTrend => Some(self.templates.monthly_trend(start, end, spec.services.first().map(String::as_str))),
            Intent::AnomalyAnalysis => Some(self.templates.anomaly_detection(start, end, spec.services.first().map(String::as_str))),
            _ => Some(self.templates.total_cost_summary(start, end)),
        }
    }

    async fn execute_poll_page_coerce(&self, sql: &str) -> Result<Vec<Row>, String> {
        let start_response = self
            .client
            .start_query_execution()
            .query_string(sql)
            .query_execution_context(QueryExecutionContext::builder().database(&self.database).build())
            .result_configuration(ResultConfiguration::builder().output_location(&self.output_location).build())
            .send()
            .await
            .map_err(|e| format!("failed to start query execution: {e}"))?;

        let query_execution_id = start_response
            .query_execution_id()
            .ok_or_else(|| "Athena did not return a query execution id".to_string())?
            .to_string();

        let mut attempt = 0;
        loop {
            if attempt >= MAX_POLL_ATTEMPTS {
                return Err("Query timeout".to_string());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            attempt += 1;

            let status = self
                .client
                .get_query_execution()
                .query_execution_id(&query_execution_id)
                .send()
                .await
                .map_err(|e| format!("failed to poll query execution: {e}"))?;

            let Some(execution) = status.query_execution() else {
                continue;
            };
            let Some(state) = execution.status().and_then(|s| s.state()) else {
                continue;
            };

            match state {
                QueryExecutionState::Succeeded => break,
                QueryExecutionState::Failed | QueryExecutionState::Cancelled => {
                    let reason = execution
                        .status()
                        .and_then(|s| s.state_change_reason())
                        .unwrap_or("unknown reason");
                    return Err(format!("Athena query {state:?}: {reason}"));
                }
                _ => continue,
            }
        }

        let mut rows: Vec<Row> = Vec::new();
        let mut headers: Vec<String> = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self.client.get_query_results().query_execution_id(&query_execution_id);
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }
            let page = request.send().await.map_err(|e| format!("failed to fetch query results: {e}"))?;

            let Some(result_set) = page.result_set() else {
                break;
            };
            let page_rows = result_set.rows();
            let is_first_page = headers.is_empty();
            let data_rows = if is_first_page {
                let Some(header_row) = page_rows.first() else {
                    break;
                };
                headers = header_row.data().iter().map(|d| d.var_char_value().unwrap_or_default().to_string()).collect();
                &page_rows[1..]
            } else {
                &page_rows[..]
            };

            for row in data_rows {
                let mut record: Row = StdHashMap::new();
                for (i, cell) in row.data().iter().enumerate() {
                    let Some(column) = headers.get(i) else { continue };
                    let value = match cell.var_char_value() {
                        Some(raw) => CellValue::coerce(raw),
                        None => CellValue::Null,
                    };
                    record.insert(column.clone(), value);
                }
                rows.push(record);
            }

            next_token = page.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        Ok(rows)
    }

    fn filter_meta_services(rows: Vec<Row>) -> Vec<Row> {
        rows.into_iter()
            .filter(|row| {
                row.get("service")
                    .map(|v| !META_SERVICES.contains(&v.display().to_lowercase().as_str()))
                    .unwrap_or(true)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl DataSource for AthenaDriver {
    async fn fetch(&self, spec: &QuerySpec) -> QueryResult {
        let start = Instant::now();
        let Some(sql) = self.compose_sql(spec) else {
            return QueryResult::failed(
                "query is missing a resolved time range",
                ResultMetadata {
                    data_source: "athena".to_string(),
                    query_id: Some(spec.query_id),
                    ..Default::default()
                },
            );
        };

        let outcome = self.execute_poll_page_coerce(&sql).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(rows) => {
                metrics::counter!("athena_query_total", "outcome" => "success").increment(1);
                let rows = Self::filter_meta_services(rows);
                QueryResult::new(
                    rows,
                    ResultMetadata {
                        data_source: "athena".to_string(),
                        execution_time_ms,
                        query_id: Some(spec.query_id),
                        sql_query: Some(sql),
                        ..Default::default()
                    },
                )
            }
            Err(error) => {
                tracing::error!(error = %error, query_id = %spec.query_id, "Athena query execution failed");
                metrics::counter!("athena_query_total", "outcome" => "error").increment(1);
                QueryResult::failed(
                    error,
                    ResultMetadata {
                        data_source: "athena".to_string(),
                        execution_time_ms,
                        query_id: Some(spec.query_id),
                        sql_query: Some(sql),
                        ..Default::default()
                    },
                )
            }
        }
    }

    fn name(&self) -> &str {
        "athena"
    }

    async fn health_check(&self) -> bool {
        self.client.list_work_groups().max_results(1).send().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finops_core::{Granularity, PeriodType, TimeRange, TimeRangeSource};

    fn sample_time_range() -> TimeRange {
        TimeRange {
            start: chrono::NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
            end: chrono::NaiveDate::from_ymd_opt(2025, 11, 30).unwrap(),
            granularity: Granularity::Daily,
            description: "November 2025".to_string(),
            source: TimeRangeSource::Explicit,
            period_type: PeriodType::CalendarMonthFull,
            metadata: StdHashMap::new(),
        }
    }

    fn driver() -> AthenaDriver {
        use aws_sdk_athena::config::Region;

        let config = aws_sdk_athena::Config::builder()
            .region(Region::new("us-east-1"))
            .behavior_version_latest()
            .build();
        AthenaDriver::new(Client::from_conf(config), "cost_usage_db", "cur_data", "s3://example-bucket/results/")
    }

    #[test]
    fn compose_sql_prefers_generated_sql_override() {
        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.time_range = Some(sample_time_range());
        spec.metadata.insert("generated_sql".to_string(), serde_json::json!("SELECT 1"));
        let sql = driver().compose_sql(&spec).unwrap();
        assert_eq!(sql, "SELECT 1");
    }

    #[test]
    fn compose_sql_uses_related_resources_template_for_resource_type_dimension() {
        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.time_range = Some(sample_time_range());
        spec.arn = Some("arn:aws:ecs:us-east-1:123456789012:cluster/my-cluster".to_string());
        spec.dimensions = vec![Dimension::ResourceType];
        let sql = driver().compose_sql(&spec).unwrap();
        assert!(sql.contains("ECS Task"));
    }

    #[test]
    fn compose_sql_uses_direct_arn_lookup_when_no_resource_type_dimension() {
        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.time_range = Some(sample_time_range());
        spec.arn = Some("arn:aws:ec2:us-east-1:123456789012:instance/i-0123".to_string());
        let sql = driver().compose_sql(&spec).unwrap();
        assert!(sql.contains("line_item_resource_id = 'arn:aws:ec2:us-east-1:123456789012:instance/i-0123'"));
    }

    #[test]
    fn compose_sql_falls_back_to_total_cost_summary_for_unhandled_intents() {
        let mut spec = QuerySpec::new(Intent::Governance);
        spec.time_range = Some(sample_time_range());
        let sql = driver().compose_sql(&spec).unwrap();
        assert!(sql.contains("SELECT ROUND(SUM("));
    }

    #[test]
    fn filter_meta_services_drops_cost_explorer_rows() {
        let mut keep: Row = StdHashMap::new();
        keep.insert("service".to_string(), CellValue::String("AmazonEC2".to_string()));
        let mut drop: Row = StdHashMap::new();
        drop.insert("service".to_string(), CellValue::String("AWS Cost Explorer".to_string()));
        let filtered = AthenaDriver::filter_meta_services(vec![keep, drop]);
        assert_eq!(filtered.len(), 1);
    }
}
