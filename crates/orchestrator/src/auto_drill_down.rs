// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! [`AutoDrillDown`]: when a primary result collapses to exactly one
//! row exposing a service or resource column, automatically issue a
//! follow-up query broken down by usage type (§4.8). This is the single
//! level of automatic drill; the richer, explicitly-invoked dimensional
//! navigator lives in [`crate::drill_down`].

use std::sync::Arc;

use finops_core::validation::{validate_date, validate_resource_id, validate_service_code};
use finops_core::{Intent, QueryResult, QuerySpec};
use finops_datasource::{CurTemplates, DataSource};

const SERVICE_COLUMNS: &[&str] = &["service", "product_code", "line_item_product_code"];
const RESOURCE_COLUMNS: &[&str] = &["resource_id", "line_item_resource_id"];

/// What single-row entity a primary result collapsed to, detected from
/// its one row's column names.
enum Entity {
    Service(String),
    Resource(String),
}

fn detect_entity(result: &QueryResult) -> Option<Entity> {
    if result.data.len() != 1 {
        return None;
    }
    let row = &result.data[0];

    for column in SERVICE_COLUMNS {
        if let Some(value) = row.get(*column) {
            return Some(Entity::Service(value.display()));
        }
    }
    for column in RESOURCE_COLUMNS {
        if let Some(value) = row.get(*column) {
            return Some(Entity::Resource(value.display()));
        }
    }
    None
}

/// Runs the single-level usage-type drill-down over an already-fetched
/// primary result.
pub struct AutoDrillDown {
    source: Arc<dyn DataSource>,
    templates: CurTemplates,
}

impl AutoDrillDown {
    /// Build a drill-down runner against the same data source that
    /// produced the primary result, using `database.cur_table` to
    /// compose the follow-up SQL.
    pub fn new(source: Arc<dyn DataSource>, database: impl Into<String>, cur_table: impl Into<String>) -> Self {
        Self { source, templates: CurTemplates::new(database, cur_table) }
    }

    /// If `spec`'s result collapsed to a single service or resource row,
    /// issue the usage-type breakdown and return the richer result.
    /// Falls through to the original result unchanged if the drill-down
    /// isn't applicable, fails, or doesn't improve on a single row.
    pub async fn maybe_drill_down(&self, spec: &QuerySpec, result: QueryResult) -> QueryResult {
        let Some(time_range) = spec.time_range.as_ref() else { return result };
        let Some(entity) = detect_entity(&result) else { return result };

        let validated_start = validate_date(&time_range.start.to_string());
        let validated_end = validate_date(&time_range.end.to_string());
        let (Ok(start), Ok(end)) = (validated_start, validated_end) else {
            tracing::warn!("drill-down time range failed validation, skipping");
            return result;
        };

        let (service_filter, resource_filter, entity_name) = match &entity {
            Entity::Service(name) => match validate_service_code(name, false) {
                Ok(validated) => (Some(validated), None, name.clone()),
                Err(error) => {
                    tracing::warn!(service = %name, error = %error, "invalid service name in drill-down, skipping");
                    return result;
                }
            },
            Entity::Resource(id) => match validate_resource_id(id) {
                Ok(validated) => (None, Some(validated), id.clone()),
                Err(error) => {
                    tracing::warn!(resource = %id, error = %error, "invalid resource ID in drill-down, skipping");
                    return result;
                }
            },
        };

        let start = chrono::NaiveDate::parse_from_str(&start, "%Y-%m-%d").expect("validated date parses");
        let end = chrono::NaiveDate::parse_from_str(&end, "%Y-%m-%d").expect("validated date parses");
        let sql = self.templates.usage_type_breakdown(start, end, service_filter.as_deref(), resource_filter.as_deref());

        let mut drill_spec = spec.clone();
        drill_spec.query_id = uuid::Uuid::new_v4();
        drill_spec.intent = Intent::CostBreakdown;
        drill_spec.metadata.insert("generated_sql".to_string(), serde_json::json!(sql));

        tracing::info!(entity = %entity_name, "executing drill-down query for usage types");
        let drill_result = self.source.fetch(&drill_spec).await;

        if drill_result.succeeded() && drill_result.row_count() > 1 {
            tracing::info!(usage_types = drill_result.row_count(), "drill-down successful");
            let mut drill_result = drill_result;
            drill_result.metadata.drilled_down = true;
            match &entity {
                Entity::Service(name) => drill_result.metadata.original_service = Some(name.clone()),
                Entity::Resource(id) => drill_result.metadata.original_resource = Some(id.clone()),
            }
            drill_result
        } else {
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use finops_core::{CellValue, Granularity, PeriodType, ResultMetadata, Row, TimeRange, TimeRangeSource};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubSource {
        responses: Mutex<Vec<QueryResult>>,
        last_spec: Mutex<Option<QuerySpec>>,
    }

    #[async_trait]
    impl DataSource for StubSource {
        async fn fetch(&self, spec: &QuerySpec) -> QueryResult {
            *self.last_spec.lock().unwrap() = Some(spec.clone());
            self.responses.lock().unwrap().remove(0)
        }
        fn name(&self) -> &str {
            "athena"
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    fn time_range() -> TimeRange {
        TimeRange {
            start: chrono::NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
            end: chrono::NaiveDate::from_ymd_opt(2025, 11, 30).unwrap(),
            granularity: Granularity::Daily,
            description: "November 2025".to_string(),
            source: TimeRangeSource::Explicit,
            period_type: PeriodType::CalendarMonthFull,
            metadata: HashMap::new(),
        }
    }

    fn single_service_row() -> QueryResult {
        let mut row: Row = HashMap::new();
        row.insert("service".to_string(), CellValue::String("AmazonEC2".to_string()));
        row.insert("cost_usd".to_string(), CellValue::Float(100.0));
        QueryResult::new(vec![row], ResultMetadata { data_source: "athena".to_string(), ..Default::default() })
    }

    fn usage_type_rows(n: usize) -> QueryResult {
        let data = (0..n)
            .map(|i| {
                let mut row: Row = HashMap::new();
                row.insert("usage_type".to_string(), CellValue::String(format!("UsageType{i}")));
                row.insert("cost_usd".to_string(), CellValue::Float(10.0));
                row
            })
            .collect();
        QueryResult::new(data, ResultMetadata { data_source: "athena".to_string(), ..Default::default() })
    }

    #[tokio::test]
    async fn drills_down_single_service_row_into_usage_types() {
        let source = Arc::new(StubSource { responses: Mutex::new(vec![usage_type_rows(3)]), last_spec: Mutex::new(None) });
        let drill = AutoDrillDown::new(source.clone(), "cost_usage_db", "cur_data");

        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.time_range = Some(time_range());

        let result = drill.maybe_drill_down(&spec, single_service_row()).await;

        assert_eq!(result.row_count(), 3);
        assert!(result.metadata.drilled_down);
        assert_eq!(result.metadata.original_service.as_deref(), Some("AmazonEC2"));

        let call = source.last_spec.lock().unwrap().clone().unwrap();
        assert!(call.metadata.get("generated_sql").and_then(|v| v.as_str()).unwrap().contains("AmazonEC2"));
    }

    #[tokio::test]
    async fn leaves_original_result_when_drill_down_still_single_row() {
        let source = Arc::new(StubSource { responses: Mutex::new(vec![usage_type_rows(1)]), last_spec: Mutex::new(None) });
        let drill = AutoDrillDown::new(source, "cost_usage_db", "cur_data");

        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.time_range = Some(time_range());

        let original = single_service_row();
        let result = drill.maybe_drill_down(&spec, original).await;

        assert!(!result.metadata.drilled_down);
        assert_eq!(result.row_count(), 1);
    }

    #[tokio::test]
    async fn does_not_drill_down_when_result_has_multiple_rows() {
        let source = Arc::new(StubSource { responses: Mutex::new(vec![]), last_spec: Mutex::new(None) });
        let drill = AutoDrillDown::new(source, "cost_usage_db", "cur_data");

        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.time_range = Some(time_range());

        let result = drill.maybe_drill_down(&spec, usage_type_rows(2)).await;
        assert_eq!(result.row_count(), 2);
        assert!(!result.metadata.drilled_down);
    }
}
