// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Three-pass tolerant parsing of the LLM's JSON response, per
//! SPEC_FULL.md §4.5.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// The fields the generator cares about in the LLM's JSON payload.
#[derive(Debug, Clone, Deserialize)]
struct RawResponse {
    #[serde(default)]
    sql: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    result_columns: Vec<String>,
    #[serde(default)]
    query_type: String,
}

/// A successfully parsed response, tagged with which pass produced it.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    /// The generated SQL. Empty when the model asked for clarification.
    pub sql: String,
    /// The formatted explanation (or clarifying question).
    pub explanation: String,
    /// Column names the SQL is expected to produce.
    pub result_columns: Vec<String>,
    /// One of `top_services`, `breakdown`, `time_series`, `regional`,
    /// `comparison`, or `unknown`.
    pub query_type: String,
    /// `text_to_sql_llm` for a clean parse, `text_to_sql_llm_partial`
    /// when pass 3's regex salvage had to reconstruct the fields.
    pub generated_via: String,
}

fn strip_code_fences(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.starts_with("```")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn sanitize_control_chars(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let stripped: String = normalized
        .chars()
        .filter(|&c| c == ' ' || c == '\t' || c == '\n' || (' '..='~').contains(&c))
        .collect();
    strip_code_fences(stripped.trim())
}

static SQL_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""sql"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());
static EXPLANATION_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""explanation"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());
static QUERY_TYPE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""query_type"\s*:\s*"([^"]+)""#).unwrap());
static RESULT_COLUMNS_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""result_columns"\s*:\s*\[([^\]]*)\]"#).unwrap());

fn unescape_json_string(raw: &str) -> String {
    raw.replace("\\\"", "\"")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
}

/// Infer `query_type` from the shape of a salvaged SQL string, matching
/// the original source's best-effort classification when pass 3 has to
/// reconstruct a response the model truncated or malformed.
fn infer_query_type(sql: &str) -> String {
    let upper = sql.to_uppercase();
    let has_group_by = upper.contains("GROUP BY");
    if upper.contains("DATE_TRUNC") || upper.contains("DATE_FORMAT") {
        if has_group_by
            && (upper.contains("LINE_ITEM_PRODUCT_CODE") || upper.contains("SERVICE"))
        {
            return "comparison".to_string();
        } else if has_group_by {
            return "time_series".to_string();
        }
    }
    if upper.contains("LIMIT") && (upper.contains("LIMIT 5") || upper.contains("LIMIT 10")) {
        return "top_services".to_string();
    }
    if has_group_by {
        return "breakdown".to_string();
    }
    "unknown".to_string()
}

fn salvage(sanitized: &str) -> Option<ParsedResponse> {
    let sql_match = SQL_FIELD.captures(sanitized)?;
    let sql = unescape_json_string(&sql_match[1]);

    let explanation = EXPLANATION_FIELD
        .captures(sanitized)
        .map(|c| unescape_json_string(&c[1]))
        .unwrap_or_else(|| "Query executed successfully".to_string());

    let query_type = QUERY_TYPE_FIELD
        .captures(sanitized)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| infer_query_type(&sql));

    let result_columns = RESULT_COLUMNS_FIELD
        .captures(sanitized)
        .map(|c| {
            c[1].split(',')
                .map(|s| s.trim().trim_matches('"').to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Some(ParsedResponse {
        sql,
        explanation,
        result_columns,
        query_type,
        generated_via: "text_to_sql_llm_partial".to_string(),
    })
}

/// Run the three-pass tolerant parse described in SPEC_FULL.md §4.5.
/// Returns `None` only when all three passes fail to find even a `sql`
/// field; the caller turns that into a `llm_error` outcome.
pub fn parse_llm_response(raw: &str) -> Option<ParsedResponse> {
    let cleaned = strip_code_fences(raw.trim());
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<RawResponse>(&cleaned) {
        return Some(ParsedResponse {
            sql: parsed.sql,
            explanation: parsed.explanation,
            result_columns: parsed.result_columns,
            query_type: if parsed.query_type.is_empty() {
                "unknown".to_string()
            } else {
                parsed.query_type
            },
            generated_via: "text_to_sql_llm".to_string(),
        });
    }

    let sanitized = sanitize_control_chars(&cleaned);
    if let Ok(parsed) = serde_json::from_str::<RawResponse>(&sanitized) {
        return Some(ParsedResponse {
            sql: parsed.sql,
            explanation: parsed.explanation,
            result_columns: parsed.result_columns,
            query_type: if parsed.query_type.is_empty() {
                "unknown".to_string()
            } else {
                parsed.query_type
            },
            generated_via: "text_to_sql_llm".to_string(),
        });
    }

    salvage(&sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json_directly() {
        let raw = r#"{"sql": "SELECT 1", "explanation": "x", "result_columns": ["a"], "query_type": "breakdown"}"#;
        let parsed = parse_llm_response(raw).unwrap();
        assert_eq!(parsed.sql, "SELECT 1");
        assert_eq!(parsed.generated_via, "text_to_sql_llm");
    }

    #[test]
    fn strips_code_fences_before_parsing() {
        let raw = "```json\n{\"sql\": \"SELECT 1\", \"explanation\": \"x\", \"result_columns\": [], \"query_type\": \"unknown\"}\n```";
        let parsed = parse_llm_response(raw).unwrap();
        assert_eq!(parsed.sql, "SELECT 1");
    }

    #[test]
    fn second_pass_tolerates_stray_control_characters() {
        let raw = "{\"sql\": \"SELECT 1\", \"explanation\": \"x\u{0001}\", \"result_columns\": [], \"query_type\": \"unknown\"}";
        let parsed = parse_llm_response(raw).unwrap();
        assert_eq!(parsed.sql, "SELECT 1");
    }

    #[test]
    fn third_pass_salvages_sql_from_malformed_json() {
        let raw = r#"{"sql": "SELECT line_item_product_code AS service, SUM(cost) FROM cur_data GROUP BY 1", "explanation": "broken"#;
        let parsed = parse_llm_response(raw).unwrap();
        assert!(parsed.sql.starts_with("SELECT line_item_product_code"));
        assert_eq!(parsed.generated_via, "text_to_sql_llm_partial");
        assert_eq!(parsed.query_type, "breakdown");
    }

    #[test]
    fn returns_none_when_no_sql_field_can_be_found() {
        let raw = "not json at all, no sql field here";
        assert!(parse_llm_response(raw).is_none());
    }

    #[test]
    fn infers_time_series_from_date_trunc_and_group_by() {
        assert_eq!(
            infer_query_type(
                "SELECT DATE_TRUNC('month', d) AS month, SUM(cost) FROM t GROUP BY 1"
            ),
            "time_series"
        );
    }

    #[test]
    fn infers_comparison_from_date_trunc_plus_service_group_by() {
        assert_eq!(
            infer_query_type(
                "SELECT DATE_TRUNC('month', d) AS month, line_item_product_code AS service, SUM(cost) FROM t GROUP BY 1, 2"
            ),
            "comparison"
        );
    }
}
