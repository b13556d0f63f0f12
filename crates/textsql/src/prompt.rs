// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! The static prompt text handed to the LLM and the small amount of
//! per-request context that gets interpolated into it.

use chrono::NaiveDate;
use finops_core::{ConversationContext, RequestContext};

/// CUR schema, effective-cost formula, service-name mappings, and the
/// query-pattern library the model is taught before it sees the user's
/// question. Kept as one static blob so the generator's prompt assembly
/// stays a straight concatenation.
pub const CUR_SCHEMA_CONTEXT: &str = r#"
AWS Cost and Usage Report (CUR) Schema for Athena Queries:

**Database**: cost_usage_db
**Table**: cur_data

**Key Columns:**
- line_item_usage_start_date: DATE - When the usage started
- line_item_usage_end_date: DATE - When the usage ended
- line_item_product_code: STRING - AWS service (e.g. 'AmazonEC2', 'AmazonCloudWatch', 'AmazonS3')
- line_item_unblended_cost: DECIMAL - Base cost before discounts
- savings_plan_savings_plan_effective_cost: DECIMAL - Cost after Savings Plans discount
- reservation_effective_cost: DECIMAL - Cost after Reserved Instance discount
- line_item_usage_type: STRING - Detailed usage type (e.g. 'DataTransfer-Out-Bytes', 'BoxUsage:m5.large')
- line_item_operation: STRING - API operation or action
- line_item_resource_id: STRING - Resource identifier (instance ID, bucket name, ARN, etc.)
- line_item_line_item_type: STRING - Type of charge (Usage, Tax, Credit, Fee, etc.)
- product_region_code: STRING - AWS region (e.g. 'us-east-1')
- product_instance_type: STRING - EC2 instance type (e.g. 'm5.large')
- line_item_usage_account_id: STRING - AWS account ID

**Effective Cost Calculation (ALWAYS USE THIS):**
```sql
COALESCE(
  NULLIF(savings_plan_savings_plan_effective_cost, 0),
  NULLIF(reservation_effective_cost, 0),
  line_item_unblended_cost
) AS cost
```
This handles Savings Plans, Reserved Instances, and On-Demand pricing in one expression.

**Service Name Mappings (CRITICAL):**
- "CloudWatch" -> line_item_product_code = 'AmazonCloudWatch'
- "EC2" -> line_item_product_code = 'AmazonEC2'
- "S3" -> line_item_product_code = 'AmazonS3'
- "RDS" -> line_item_product_code = 'AmazonRDS'
- "Lambda" -> line_item_product_code = 'AWSLambda'
- "VPC" -> line_item_product_code = 'AmazonVPC'

**Services That Don't Generate Direct Costs (IMPORTANT):**
ECS and EKS don't bill directly as their own product code. Rewrite queries
against them to the underlying cost-generating services and say so in the
explanation:
- ECS: line_item_product_code IN ('AmazonEC2', 'AmazonECR') OR line_item_usage_type LIKE '%Fargate%'
- EKS: line_item_product_code IN ('AmazonEC2', 'AmazonEKS') OR line_item_usage_type LIKE '%Fargate%'

**Athena GROUP BY Rules (CRITICAL):**
- NEVER reference a column alias in GROUP BY; Athena will fail with COLUMN_NOT_FOUND.
- Use the column position number (1, 2, 3, ...) for CASE expressions, CASTs, and
  other computed columns. Simple column references may use the name or the position.
- Totals-only queries (a single number) must omit GROUP BY entirely.

**Resource-Level Queries:**
- "per resource", "by resource", "each instance" -> GROUP BY line_item_resource_id,
  and always add `AND line_item_resource_id IS NOT NULL AND line_item_resource_id != ''`.
- A specific ARN/resource id is an exact match: `line_item_resource_id = 'arn:...'`.
  GROUP BY must then include every non-aggregated selected column, or be omitted
  entirely if only aggregates are selected.
- ECS/EKS cluster ARNs never appear in billing data directly; do not filter on
  them with line_item_resource_id, rewrite to the underlying services instead.

**Date Handling:**
- Always use `CAST(line_item_usage_start_date AS DATE) >= DATE 'YYYY-MM-DD'`, never
  string comparison.
- "last N days" counts back N days from today; "last N months" counts back N
  complete prior calendar months, not including the current partial month.
- Cap any end date beyond today to today; cost data does not exist for future dates.

**Filtering Best Practices:**
- Exclude meta-services: `AND line_item_product_code NOT IN ('AWS Cost Explorer', 'AWS Support')`.
- Exclude non-usage rows: `AND line_item_line_item_type = 'Usage'` to drop Tax/Credit/Refund rows.
- The effective-cost formula already reflects Savings Plans and Reserved Instance
  discounts; do not additionally filter by line_item_usage_type patterns like
  '%OnDemand%' unless the user explicitly asks to exclude a pricing model.

**Multi-Service Comparison Queries:**
Never pivot services into separate columns with CASE WHEN. Return one row per
service (or per month+service for a trend) instead:
```sql
SELECT line_item_product_code AS service, ROUND(SUM(cost), 2) AS cost_usd
FROM cost_usage_db.cur_data
WHERE line_item_product_code IN ('AmazonEC2', 'AmazonCloudFront')
  AND CAST(line_item_usage_start_date AS DATE) BETWEEN DATE 'start' AND DATE 'end'
GROUP BY 1
ORDER BY cost_usd DESC
```
"#;

/// Injected ahead of the user's question whenever a non-admin
/// `RequestContext` is supplied, per SPEC_FULL.md §4.5(v).
fn account_scoping_block(allowed_accounts: &[String]) -> String {
    let quoted: Vec<String> = allowed_accounts.iter().map(|a| format!("'{a}'")).collect();
    format!(
        "\n**CRITICAL - Account Scoping:**\nThe user only has access to the following AWS account IDs: {}\n\nYou MUST include a filter for these accounts in your WHERE clause:\n`AND line_item_usage_account_id IN ({})`\n\nIf the user asks about accounts outside this list, say so in the explanation. Never return data from accounts not in this list.\n",
        allowed_accounts.join(", "),
        quoted.join(", ")
    )
}

/// Flatten the last six conversation turns into a short transcript
/// excerpt, `ROLE: first 200 chars of content` per line.
pub fn conversation_excerpt(history: &[(String, String)]) -> String {
    if history.is_empty() {
        return "No previous conversation.".to_string();
    }
    let recent = &history[history.len().saturating_sub(6)..];
    recent
        .iter()
        .map(|(role, content)| {
            let truncated: String = content.chars().take(200).collect();
            format!("{}: {}", role.to_uppercase(), truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append the selected `previous_context` hints (last service, last time
/// range) to a conversation excerpt, matching the original source's
/// "Previous Query Context" appendix.
pub fn with_previous_context(mut excerpt: String, previous: Option<&ConversationContext>) -> String {
    let Some(previous) = previous else {
        return excerpt;
    };
    let mut parts = Vec::new();
    if let Some(service) = &previous.last_service {
        parts.push(format!("- Previously queried service: {service}"));
    }
    if let Some(time_range) = &previous.time_range {
        parts.push(format!("- Previous time range: {}", time_range.description));
    }
    if !parts.is_empty() {
        excerpt.push_str("\n\nPrevious Query Context:\n");
        excerpt.push_str(&parts.join("\n"));
    }
    excerpt
}

/// Assemble the full prompt text for one generation request.
#[allow(clippy::too_many_arguments)]
pub fn build_prompt(
    user_query: &str,
    conversation_history: &[(String, String)],
    previous: Option<&ConversationContext>,
    context: Option<&RequestContext>,
    today: NaiveDate,
) -> String {
    let mut conv_context = conversation_excerpt(conversation_history);
    conv_context = with_previous_context(conv_context, previous);

    let scoping = context
        .filter(|c| !c.is_admin && !c.allowed_account_ids.is_empty())
        .map(|c| account_scoping_block(&c.allowed_account_ids))
        .unwrap_or_default();

    format!(
        r#"You are an expert SQL query generator for AWS Cost and Usage Reports (CUR) in Athena.

{schema_context}
{scoping}
**Today's Date**: {today}

**Conversation History:**
{conv_context}

**User Query**: "{user_query}"

Your task: Generate a COMPLETE, EXECUTABLE Athena SQL query that answers the
user's question.

**CRITICAL RULES:**
1. Produce syntactically valid SQL: matched parentheses, correct `column AS alias`
   aliasing, GROUP BY covering every non-aggregated SELECT column (by position
   number for computed columns), no GROUP BY at all for single-number totals.
2. If the request is unclear or ambiguous, do not guess: set `sql` to an empty
   string and put a clarifying question in `explanation`.
3. Always use the effective-cost expression from the schema above.
4. Map service names per the table above, rewriting ECS/EKS to their
   underlying cost-generating services and saying so in the explanation.
5. Handle dates per the rules above; cap any future end date to today's date;
   if the requested range is entirely in the future or before the data's
   start, ask for clarification instead of guessing.
6. Group by the dimension the user actually asked for (service, region,
   usage type, resource) using position numbers for computed expressions.
7. For service-comparison queries, return one row per service (optionally per
   month+service), never a pivoted/CASE-WHEN column layout.
8. Inherit filters from conversation context only for implicit/relational
   follow-ups ("breakdown by region" after "CloudWatch costs"); start from
   an unfiltered scope whenever the new query names an explicit new scope
   ("overall AWS costs", "total AWS spend", "all services").

**Response Format:**
Return ONLY valid JSON, no markdown fences, with this shape:
{{
  "sql": "SELECT ... FROM ... WHERE ... GROUP BY ... ORDER BY ...",
  "explanation": "**Summary:** one sentence with the key numbers.\n\n**Insights:**\n\n- **Category**: finding\n- **Category**: finding\n\nFor optimization queries, add:\n\n**Recommendations:**\n\n1. **Action**: recommendation with an estimated saving",
  "result_columns": ["service", "cost_usd"],
  "query_type": "top_services | breakdown | time_series | regional | comparison"
}}

Address the user directly ("Your costs are...", "You spent..."), never
describe the query itself. Use `${{Placeholder}}` tokens (TotalCost, TopItem,
TopCost, TopPct, Top2Pct, Top3Pct, Top5Pct, NumItems, Item1, Item2, Item3)
wherever you do not yet know the exact value; the caller substitutes these
from the executed query's results. For time-series explanations, compute the
trend (increasing/decreasing/stable) and the peak period from the data shape
you are querying rather than using placeholders, since there is no single
"top item" to substitute. Use a single `%` for percentages, never `%%`.

Now generate the query for the user's request. Return ONLY the JSON."#,
        schema_context = CUR_SCHEMA_CONTEXT,
        scoping = scoping,
        today = today,
        conv_context = conv_context,
        user_query = user_query,
    )
}

/// The system prompt paired with [`build_prompt`]'s user prompt.
pub const SYSTEM_PROMPT: &str = "You are an expert SQL generator for AWS Cost and Usage Reports. Generate complete, executable Athena SQL queries. Return ONLY valid JSON. Escape all newlines in strings as \\n, not literal line breaks. Use a single % for percentages, never %%. The JSON must have sql, explanation, result_columns, and query_type fields.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_falls_back_when_history_empty() {
        assert_eq!(conversation_excerpt(&[]), "No previous conversation.");
    }

    #[test]
    fn excerpt_keeps_only_last_six_turns() {
        let history: Vec<(String, String)> = (0..10)
            .map(|i| ("user".to_string(), format!("turn {i}")))
            .collect();
        let excerpt = conversation_excerpt(&history);
        assert!(excerpt.contains("turn 9"));
        assert!(!excerpt.contains("turn 3"));
    }

    #[test]
    fn prompt_includes_account_scoping_only_for_non_admin() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 4).unwrap();
        let ctx = RequestContext {
            user_id: "u".into(),
            user_email: "u@example.com".into(),
            is_admin: false,
            organization_id: "org".into(),
            organization_name: "Org".into(),
            org_role: "member".into(),
            allowed_account_ids: vec!["111111111111".to_string()],
            active_saved_view: None,
        };
        let prompt = build_prompt("show my costs", &[], None, Some(&ctx), today);
        assert!(prompt.contains("line_item_usage_account_id IN"));
        assert!(prompt.contains("111111111111"));
    }

    #[test]
    fn prompt_omits_account_scoping_for_admin() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 4).unwrap();
        let ctx = RequestContext {
            user_id: "u".into(),
            user_email: "u@example.com".into(),
            is_admin: true,
            organization_id: "org".into(),
            organization_name: "Org".into(),
            org_role: "admin".into(),
            allowed_account_ids: vec![],
            active_saved_view: None,
        };
        let prompt = build_prompt("show my costs", &[], None, Some(&ctx), today);
        assert!(!prompt.contains("CRITICAL - Account Scoping"));
    }
}
