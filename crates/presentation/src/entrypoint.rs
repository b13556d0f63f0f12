// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! [`Entrypoint::execute`]: the single call that wires time-range
//! resolution, SQL generation, orchestrated execution, auto-drill-down,
//! and response formatting into one `UnifiedResponse` (§4.12).

use std::sync::Arc;

use chrono::FixedOffset;
use finops_charts::{ChartBuilder, ChartRecommender};
use finops_core::provider::LlmClient;
use finops_core::{ConversationContext, Insight, Intent, QuerySpec, RequestContext, UnifiedResponse};
use finops_datasource::DataSource;
use finops_orchestrator::{AutoDrillDown, QueryOrchestrator};
use finops_textsql::TextToSQLGenerator;

use crate::formatter::{FormatterInput, ResponseFormatter};

const GENERIC_SUGGESTIONS: &[&str] = &["Show me my AWS costs for the last 30 days", "What are my top 5 most expensive services?"];

/// Maps the textsql generator's `query_type` string onto an `Intent`,
/// the one translation the pipeline needs between "what shape of SQL
/// did we generate" and "what shape of narrative do we format".
fn intent_from_query_type(query_type: &str) -> Intent {
    match query_type {
        "top_services" => Intent::TopNRanking,
        "breakdown" => Intent::CostBreakdown,
        "time_series" => Intent::CostTrend,
        "regional" => Intent::CostBreakdown,
        "comparison" => Intent::Comparative,
        _ => Intent::Other,
    }
}

/// Wires the full pipeline behind one call. Holds no per-request state;
/// everything mutable (conversation context) is threaded explicitly.
pub struct Entrypoint {
    generator: TextToSQLGenerator,
    orchestrator: QueryOrchestrator,
    drill_down: Option<AutoDrillDown>,
    formatter: ResponseFormatter,
    recommender: ChartRecommender,
    builder: ChartBuilder,
}

impl Entrypoint {
    /// Assemble a pipeline over the given LLM client and data sources.
    /// `drill_down` is the same primary `DataSource` wrapped for the
    /// single-level usage-type auto-expansion (§4.8); pass `None` to
    /// disable auto-drill-down entirely.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        cur_table: impl Into<String>,
        primary: Arc<dyn DataSource>,
        fallback: Option<Arc<dyn DataSource>>,
        drill_down: Option<AutoDrillDown>,
    ) -> Self {
        Self {
            generator: TextToSQLGenerator::new(llm, cur_table),
            orchestrator: QueryOrchestrator::new(primary, fallback),
            drill_down,
            formatter: ResponseFormatter::new(),
            recommender: ChartRecommender::new(),
            builder: ChartBuilder::new(),
        }
    }

    /// Run the full pipeline for one natural-language query.
    ///
    /// Merges `previous_context`'s time range with any explicit
    /// expression in `query`, generates and validates SQL, executes it,
    /// applies auto-drill-down, recommends and renders charts, and
    /// formats the final narrative. `previous_context` is read but not
    /// mutated; the caller persists the returned `context` for the next
    /// turn.
    pub async fn execute(
        &self,
        query: &str,
        chat_history: &[(String, String)],
        previous_context: Option<&ConversationContext>,
        request_context: Option<&RequestContext>,
        tz: &FixedOffset,
    ) -> UnifiedResponse {
        tracing::info!(query = %query, "executing query");

        let today = chrono::Utc::now().with_timezone(tz).date_naive();
        let time_range_result = finops_timerange::merge(previous_context, query, tz);

        let generated = self.generator.generate(query, chat_history, previous_context, request_context, today).await;

        let mut context = previous_context.cloned().unwrap_or_default();
        context.last_query = Some(query.to_string());
        context.time_range = Some(time_range_result.primary.clone());

        if generated.needs_clarification() {
            metrics::counter!("entrypoint_execute_total", "outcome" => "clarification").increment(1);
            let suggestions: Vec<String> = GENERIC_SUGGESTIONS.iter().map(|s| s.to_string()).collect();
            return UnifiedResponse {
                summary: String::new(),
                message: generated.explanation,
                insights: Vec::new(),
                recommendations: Vec::new(),
                results: Vec::new(),
                charts: Vec::new(),
                suggestions,
                athena_query: None,
                metadata: serde_json::json!({ "status": generated.status }),
                context,
            };
        }

        let intent = intent_from_query_type(&generated.query_type);
        let mut spec = QuerySpec::new(intent);
        spec.time_range = Some(time_range_result.primary.clone());
        spec.metadata.insert("generated_sql".to_string(), serde_json::Value::String(generated.sql.clone()));
        for (key, value) in &generated.metadata {
            spec.metadata.insert(key.clone(), value.clone());
        }

        let mut result = self.orchestrator.execute(spec.clone()).await;

        if let Some(drill_down) = &self.drill_down {
            result = drill_down.maybe_drill_down(&spec, result).await;
            context.last_query_type = Some(if result.metadata.drilled_down { "cost_breakdown".to_string() } else { generated.query_type.clone() });
        } else {
            context.last_query_type = Some(generated.query_type.clone());
        }
        context.last_sql = result.metadata.sql_query.clone();

        if !result.succeeded() {
            metrics::counter!("entrypoint_execute_total", "outcome" => "data_source_error").increment(1);
            let error = result.error.clone().unwrap_or_default();
            let suggestions: Vec<String> = self.formatter.clarify_error(&error).into_iter().chain(GENERIC_SUGGESTIONS.iter().map(|s| s.to_string())).collect();
            return UnifiedResponse {
                summary: String::new(),
                message: String::new(),
                insights: Vec::new(),
                recommendations: Vec::new(),
                results: Vec::new(),
                charts: Vec::new(),
                suggestions,
                athena_query: None,
                metadata: serde_json::json!({ "status": "data_source_error", "error": error }),
                context,
            };
        }

        if result.is_empty() {
            metrics::counter!("entrypoint_execute_total", "outcome" => "no_data").increment(1);
            let input = FormatterInput {
                intent,
                period_description: Some(time_range_result.primary.description.as_str()),
                services: &spec.services,
                ..Default::default()
            };
            let message = self.formatter.build_no_data(&input);
            return UnifiedResponse {
                summary: String::new(),
                message,
                insights: Vec::new(),
                recommendations: Vec::new(),
                results: Vec::new(),
                charts: Vec::new(),
                suggestions: vec![
                    "Show me overall AWS costs for last 30 days".to_string(),
                    "What are my top 5 most expensive services?".to_string(),
                ],
                athena_query: Some(generated.sql),
                metadata: serde_json::to_value(&result.metadata).unwrap_or_default(),
                context,
            };
        }

        let chart_specs = self.recommender.recommend(intent, &result.metadata, &result.data, query, None);
        let charts = self.builder.build_all(&chart_specs, &result.data, Some(&mut context));

        let input = FormatterInput {
            intent,
            explanation: &generated.explanation,
            explanation_request: generated.metadata.get("explanation_request").and_then(|v| v.as_bool()).unwrap_or(false),
            charts: &charts,
            period_description: Some(time_range_result.primary.description.as_str()),
            requested_start: Some(time_range_result.primary.start),
            requested_end: Some(time_range_result.primary.end),
            services: &spec.services,
            regions: &spec.regions,
            accounts: &spec.accounts,
            ..Default::default()
        };
        let (message, insights, recommendations, suggestions) = self.formatter.build(&input, &result);
        let summary: String = insights.first().map(|i: &Insight| i.description.clone()).unwrap_or_default();

        metrics::counter!("entrypoint_execute_total", "outcome" => "ok").increment(1);
        UnifiedResponse {
            summary,
            message,
            insights,
            recommendations,
            results: result.data.clone(),
            charts,
            suggestions,
            athena_query: Some(generated.sql),
            metadata: serde_json::to_value(&result.metadata).unwrap_or_default(),
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use finops_core::provider::CompletionOptions;
    use finops_core::{CellValue, QueryResult, Result, ResultMetadata};
    use std::collections::HashMap;

    struct StubLlm {
        response: String,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    struct StubSource {
        rows: Vec<finops_core::Row>,
    }

    #[async_trait]
    impl DataSource for StubSource {
        async fn fetch(&self, spec: &QuerySpec) -> QueryResult {
            QueryResult::new(self.rows.clone(), ResultMetadata { data_source: "stub".to_string(), query_id: Some(spec.query_id), ..Default::default() })
        }
        fn name(&self) -> &str {
            "stub"
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    fn row(service: &str, cost: f64) -> finops_core::Row {
        let mut r: HashMap<String, CellValue> = HashMap::new();
        r.insert("service".to_string(), CellValue::String(service.to_string()));
        r.insert("cost_usd".to_string(), CellValue::Float(cost));
        r
    }

    #[tokio::test]
    async fn clarification_response_has_no_charts_or_results() {
        let llm = Arc::new(StubLlm { response: r#"{"sql":"","explanation":"Which period?","result_columns":[],"query_type":"unknown"}"#.to_string() });
        let source = Arc::new(StubSource { rows: vec![] });
        let entrypoint = Entrypoint::new(llm, "cur_data", source, None, None);
        let tz = FixedOffset::east_opt(0).unwrap();
        let response = entrypoint.execute("what about it", &[], None, None, &tz).await;
        assert!(response.results.is_empty());
        assert!(response.charts.is_empty());
        assert_eq!(response.message, "Which period?");
    }

    #[tokio::test]
    async fn successful_query_produces_narrative_and_charts() {
        let llm = Arc::new(StubLlm {
            response: r#"{"sql":"SELECT line_item_product_code AS service, SUM(line_item_unblended_cost) AS cost_usd FROM cur_data WHERE line_item_usage_start_date >= DATE '2025-11-01' GROUP BY 1 ORDER BY 2 DESC","explanation":"Top services by cost.","result_columns":["service","cost_usd"],"query_type":"top_services"}"#
                .to_string(),
        });
        let source = Arc::new(StubSource { rows: vec![row("EC2", 80.0), row("S3", 20.0)] });
        let entrypoint = Entrypoint::new(llm, "cur_data", source, None, None);
        let tz = FixedOffset::east_opt(0).unwrap();
        let response = entrypoint.execute("top services last 30 days", &[], None, None, &tz).await;
        assert_eq!(response.results.len(), 2);
        assert!(response.athena_query.is_some());
        assert!(response.message.contains("EC2"));
    }
}
