// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! [`TextToSQLGenerator`]: prompt assembly, LLM invocation, tolerant
//! parsing, validation, and scope enforcement wired into one call (§4.5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use finops_core::provider::{CompletionOptions, LlmClient};
use finops_core::{ConversationContext, RequestContext};
use finops_sqlsec::{AccountScopeEnforcer, SqlValidator};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::parse::{parse_llm_response, ParsedResponse};
use crate::prompt::build_prompt;

/// Outcome of [`TextToSQLGenerator::generate`].
#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    /// Generated SQL. Empty on any failure path.
    pub sql: String,
    /// Explanation text, or a clarifying question when `sql` is empty.
    pub explanation: String,
    /// Expected result column names.
    pub result_columns: Vec<String>,
    /// One of `top_services`, `breakdown`, `time_series`, `regional`,
    /// `comparison`, or `unknown`.
    pub query_type: String,
    /// `text_to_sql_llm`, `text_to_sql_llm_partial`, `llm_error`,
    /// `validation_failed`, or `clarification_needed`.
    pub status: String,
    /// Metadata enriched after a successful generation: time period,
    /// scope inference, filter inference, and account-scoping flag.
    pub metadata: HashMap<String, Value>,
}

impl GeneratedQuery {
    fn failed(status: &str, explanation: impl Into<String>) -> Self {
        Self {
            sql: String::new(),
            explanation: explanation.into(),
            result_columns: Vec::new(),
            query_type: "unknown".to_string(),
            status: status.to_string(),
            metadata: HashMap::new(),
        }
    }

    /// Whether the LLM returned an empty `sql` asking for clarification,
    /// or parsing/validation failed outright.
    pub fn needs_clarification(&self) -> bool {
        self.sql.is_empty()
    }
}

static DATE_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"DATE\s+'(\d{4}-\d{2}-\d{2})'").unwrap());
static INTERVAL_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)INTERVAL\s+'(\d+)'\s+(MONTH|DAY|YEAR)").unwrap());
static SINGLE_VALUE_EQ: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(line_item_product_code|product_region_code|line_item_usage_account_id)\s*=\s*'([^']+)'").unwrap()
});

fn infer_time_period(sql: &str) -> Option<Value> {
    let dates: Vec<&str> = DATE_LITERAL.captures_iter(sql).map(|c| c.get(1).unwrap().as_str()).collect();
    if dates.len() >= 2 {
        return Some(serde_json::json!({"start": dates[0], "end": dates[dates.len() - 1]}));
    }
    if let Some(c) = INTERVAL_LITERAL.captures(sql) {
        return Some(serde_json::json!({"interval_amount": &c[1], "interval_unit": c[2].to_lowercase()}));
    }
    None
}

/// Scope inference over the final SQL, matching §4.5's "resource vs
/// service vs region vs account" classification.
fn infer_scope(sql: &str) -> &'static str {
    let upper = sql.to_uppercase();
    if upper.contains("LINE_ITEM_RESOURCE_ID") {
        "resource"
    } else if upper.contains("PRODUCT_REGION_CODE") {
        "region"
    } else if upper.contains("LINE_ITEM_USAGE_ACCOUNT_ID") {
        "account"
    } else if upper.contains("LINE_ITEM_PRODUCT_CODE") {
        "service"
    } else {
        "total"
    }
}

fn infer_filters(sql: &str) -> HashMap<String, String> {
    SINGLE_VALUE_EQ
        .captures_iter(sql)
        .map(|c| (c[1].to_lowercase(), c[2].to_string()))
        .collect()
}

/// Composes a prompt, calls the model, tolerant-parses its response,
/// validates the SQL, and enforces account scoping.
pub struct TextToSQLGenerator {
    llm: Arc<dyn LlmClient>,
    validator: SqlValidator,
}

impl TextToSQLGenerator {
    /// Build a generator against the given LLM and CUR table name.
    pub fn new(llm: Arc<dyn LlmClient>, cur_table: impl Into<String>) -> Self {
        Self {
            llm,
            validator: SqlValidator::new(cur_table),
        }
    }

    /// Generate SQL for `user_query`, given conversation history,
    /// optional previous-turn context, an optional request context for
    /// account scoping, and the caller's notion of "today".
    pub async fn generate(
        &self,
        user_query: &str,
        conversation_history: &[(String, String)],
        previous: Option<&ConversationContext>,
        context: Option<&RequestContext>,
        today: NaiveDate,
    ) -> GeneratedQuery {
        let prompt = build_prompt(user_query, conversation_history, previous, context, today);
        let options = CompletionOptions::json(12_000).with_system_prompt(crate::prompt::SYSTEM_PROMPT);

        let raw = match self.llm.complete(&prompt, &options).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "LLM completion failed during SQL generation");
                metrics::counter!("textsql_generation_total", "outcome" => "llm_error").increment(1);
                return GeneratedQuery::failed("llm_error", "I wasn't able to reach the query model. Please try again.");
            }
        };

        let Some(parsed) = parse_llm_response(&raw) else {
            tracing::warn!("LLM response could not be parsed by any of the three tolerant passes");
            metrics::counter!("textsql_generation_total", "outcome" => "llm_error").increment(1);
            return GeneratedQuery::failed(
                "llm_error",
                "I couldn't understand the query model's response. Please rephrase your question.",
            );
        };

        if parsed.sql.trim().is_empty() {
            metrics::counter!("textsql_generation_total", "outcome" => "clarification").increment(1);
            return self.finish_clarification(parsed);
        }

        if let Err(err) = self.validator.validate(&parsed.sql) {
            tracing::warn!(error = %err, "generated SQL rejected by validator");
            metrics::counter!("textsql_generation_total", "outcome" => "validation_failed").increment(1);
            return GeneratedQuery::failed(
                "validation_failed",
                "The generated query didn't pass our safety checks. Please rephrase your question.",
            );
        }

        let mut sql = parsed.sql.clone();
        let mut metadata: HashMap<String, Value> = HashMap::new();

        if let Some(ctx) = context.filter(|c| !c.is_admin) {
            let (enforced_sql, modified) = AccountScopeEnforcer::enforce(&sql, &ctx.allowed_account_ids);
            sql = enforced_sql;
            if modified {
                metadata.insert("account_filter_enforced".to_string(), Value::Bool(true));
            }
        }

        if let Some(period) = infer_time_period(&sql) {
            metadata.insert("inferred_time_period".to_string(), period);
        }
        metadata.insert("inferred_scope".to_string(), Value::String(infer_scope(&sql).to_string()));
        let filters = infer_filters(&sql);
        if !filters.is_empty() {
            metadata.insert(
                "inferred_filters".to_string(),
                serde_json::to_value(filters).unwrap_or(Value::Null),
            );
        }

        metrics::counter!("textsql_generation_total", "outcome" => "success").increment(1);

        GeneratedQuery {
            sql,
            explanation: parsed.explanation,
            result_columns: parsed.result_columns,
            query_type: parsed.query_type,
            status: parsed.generated_via,
            metadata,
        }
    }

    fn finish_clarification(&self, parsed: ParsedResponse) -> GeneratedQuery {
        GeneratedQuery {
            sql: String::new(),
            explanation: parsed.explanation,
            result_columns: Vec::new(),
            query_type: parsed.query_type,
            status: "clarification_needed".to_string(),
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use finops_core::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLlm {
        response: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 4).unwrap()
    }

    #[tokio::test]
    async fn generates_and_enriches_metadata_on_success() {
        let llm = Arc::new(StubLlm {
            response: r#"{"sql": "SELECT product_region_code AS region, SUM(cost) AS cost_usd FROM cost_usage_db.cur_data WHERE CAST(line_item_usage_start_date AS DATE) BETWEEN DATE '2025-11-04' AND DATE '2025-12-04' GROUP BY 1", "explanation": "**Summary:** costs by region", "result_columns": ["region", "cost_usd"], "query_type": "regional"}"#.to_string(),
            calls: AtomicUsize::new(0),
        });
        let generator = TextToSQLGenerator::new(llm, "cost_usage_db.cur_data");
        let result = generator.generate("show costs by region", &[], None, None, today()).await;

        assert_eq!(result.status, "text_to_sql_llm");
        assert!(!result.needs_clarification());
        assert_eq!(result.metadata.get("inferred_scope").unwrap(), "region");
        assert!(result.metadata.contains_key("inferred_time_period"));
    }

    #[tokio::test]
    async fn empty_sql_is_reported_as_clarification_needed() {
        let llm = Arc::new(StubLlm {
            response: r#"{"sql": "", "explanation": "Which service did you mean?", "result_columns": [], "query_type": "unknown"}"#.to_string(),
            calls: AtomicUsize::new(0),
        });
        let generator = TextToSQLGenerator::new(llm, "cost_usage_db.cur_data");
        let result = generator.generate("show me costs", &[], None, None, today()).await;

        assert!(result.needs_clarification());
        assert_eq!(result.status, "clarification_needed");
        assert_eq!(result.explanation, "Which service did you mean?");
    }

    #[tokio::test]
    async fn rejects_sql_that_fails_validation() {
        let llm = Arc::new(StubLlm {
            response: r#"{"sql": "DROP TABLE cur_data", "explanation": "x", "result_columns": [], "query_type": "unknown"}"#.to_string(),
            calls: AtomicUsize::new(0),
        });
        let generator = TextToSQLGenerator::new(llm, "cost_usage_db.cur_data");
        let result = generator.generate("drop the table", &[], None, None, today()).await;

        assert!(result.needs_clarification());
        assert_eq!(result.status, "validation_failed");
    }

    #[tokio::test]
    async fn enforces_account_scope_for_non_admin_context() {
        let llm = Arc::new(StubLlm {
            response: r#"{"sql": "SELECT SUM(cost) AS cost_usd FROM cost_usage_db.cur_data WHERE line_item_product_code = 'AmazonEC2'", "explanation": "x", "result_columns": ["cost_usd"], "query_type": "unknown"}"#.to_string(),
            calls: AtomicUsize::new(0),
        });
        let generator = TextToSQLGenerator::new(llm, "cost_usage_db.cur_data");
        let ctx = RequestContext {
            user_id: "u".into(),
            user_email: "u@example.com".into(),
            is_admin: false,
            organization_id: "org".into(),
            organization_name: "Org".into(),
            org_role: "member".into(),
            allowed_account_ids: vec!["123456789012".to_string()],
            active_saved_view: None,
        };
        let result = generator.generate("ec2 costs", &[], None, Some(&ctx), today()).await;

        assert!(result.sql.contains("line_item_usage_account_id IN ('123456789012')"));
        assert_eq!(result.metadata.get("account_filter_enforced").unwrap(), true);
        assert_eq!(
            result.metadata.get("inferred_filters").unwrap()["line_item_product_code"],
            "AmazonEC2"
        );
    }

    #[tokio::test]
    async fn llm_error_is_reported_when_response_unparseable() {
        let llm = Arc::new(StubLlm {
            response: "not json and no sql field anywhere".to_string(),
            calls: AtomicUsize::new(0),
        });
        let generator = TextToSQLGenerator::new(llm, "cost_usage_db.cur_data");
        let result = generator.generate("anything", &[], None, None, today()).await;

        assert_eq!(result.status, "llm_error");
        assert!(result.needs_clarification());
    }
}
