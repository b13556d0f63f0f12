// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Multi-tenant account-scope enforcement, applied defensively at two
//! points in the pipeline: right after SQL generation and again
//! immediately before submission to Athena (§4.4).

use finops_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// The single CUR column every account-scope check and injection
/// targets.
pub const ACCOUNT_ID_COLUMN: &str = "line_item_usage_account_id";

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static scope pattern is valid regex")
}

static TWELVE_DIGIT_ID: Lazy<Regex> = Lazy::new(|| rx(r"^[0-9]{12}$"));
static QUOTED_ACCOUNT_LITERAL: Lazy<Regex> = Lazy::new(|| rx(r"'(\d{12})'"));
static WHERE_KEYWORD: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bWHERE\b"));
static FROM_CLAUSE: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bFROM\s+[\w.]+(?:\s+AS\s+\w+)?"));

/// Injects and verifies the `line_item_usage_account_id` filter.
pub struct AccountScopeEnforcer;

impl AccountScopeEnforcer {
    /// Inject an account filter into `sql` if one isn't already present.
    /// Returns the (possibly unchanged) SQL and whether it was modified.
    ///
    /// Trusts an upstream filter if the column is referenced anywhere in
    /// the statement already (case-insensitive). Only 12-digit allowlist
    /// entries are used to build the injected clause; if none survive
    /// validation the SQL is returned unchanged (and the gap is logged,
    /// relying on [`Self::validate`] to catch it downstream).
    pub fn enforce(sql: &str, allowed_account_ids: &[String]) -> (String, bool) {
        if sql.to_uppercase().contains(ACCOUNT_ID_COLUMN.to_uppercase().as_str()) {
            return (sql.to_string(), false);
        }

        let validated: Vec<&String> = allowed_account_ids
            .iter()
            .filter(|id| TWELVE_DIGIT_ID.is_match(id))
            .collect();
        if validated.is_empty() {
            tracing::warn!("no valid account ids available to inject filter");
            return (sql.to_string(), false);
        }

        let in_list = validated
            .iter()
            .map(|id| format!("'{id}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let filter = format!("{ACCOUNT_ID_COLUMN} IN ({in_list})");

        let modified = if let Some(where_match) = WHERE_KEYWORD.find(sql) {
            let end = where_match.end();
            format!("{} {filter} AND {}", &sql[..end], &sql[end..])
        } else if let Some(from_match) = FROM_CLAUSE.find(sql) {
            let end = from_match.end();
            format!("{} WHERE {filter} {}", &sql[..end], &sql[end..])
        } else {
            sql.to_string()
        };

        tracing::debug!(account_count = allowed_account_ids.len(), "account filter injected");
        (modified, true)
    }

    /// Verify that `sql` doesn't reach outside `allowed_account_ids`.
    ///
    /// If no 12-digit account literal is quoted anywhere in the SQL,
    /// the filter column itself must be present (i.e. [`Self::enforce`]
    /// would have injected it). If literals are present, every one of
    /// them must be in the allowlist.
    pub fn validate(sql: &str, allowed_account_ids: &[String]) -> Result<()> {
        let mentioned: HashSet<&str> = QUOTED_ACCOUNT_LITERAL
            .captures_iter(sql)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();

        if mentioned.is_empty() {
            if !sql.to_uppercase().contains(ACCOUNT_ID_COLUMN.to_uppercase().as_str()) {
                return Err(Error::access_denied("query must include account filter"));
            }
            return Ok(());
        }

        let allowed: HashSet<&str> = allowed_account_ids.iter().map(String::as_str).collect();
        let unauthorized: Vec<&str> = mentioned.iter().filter(|id| !allowed.contains(*id)).copied().collect();
        if !unauthorized.is_empty() {
            return Err(Error::access_denied(format!(
                "Access denied to accounts: {}",
                unauthorized.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforce_trusts_sql_that_already_filters_by_account() {
        let sql = "SELECT * FROM cur_table WHERE line_item_usage_account_id = '123456789012'";
        let (result, modified) = AccountScopeEnforcer::enforce(sql, &["123456789012".to_string()]);
        assert!(!modified);
        assert_eq!(result, sql);
    }

    #[test]
    fn enforce_injects_after_where() {
        let sql = "SELECT * FROM cur_table WHERE line_item_product_code = 'AmazonEC2'";
        let (result, modified) =
            AccountScopeEnforcer::enforce(sql, &["123456789012".to_string()]);
        assert!(modified);
        assert!(result.contains("line_item_usage_account_id IN ('123456789012')"));
        assert!(result.contains("AND line_item_product_code"));
    }

    #[test]
    fn enforce_injects_where_clause_when_absent() {
        let sql = "SELECT * FROM cur_table";
        let (result, modified) =
            AccountScopeEnforcer::enforce(sql, &["123456789012".to_string()]);
        assert!(modified);
        assert!(result.contains("WHERE line_item_usage_account_id IN"));
    }

    #[test]
    fn enforce_leaves_sql_unchanged_when_no_valid_ids() {
        let sql = "SELECT * FROM cur_table";
        let (result, modified) = AccountScopeEnforcer::enforce(sql, &["not-an-id".to_string()]);
        assert!(!modified);
        assert_eq!(result, sql);
    }

    #[test]
    fn validate_requires_filter_column_when_no_literal_present() {
        assert!(AccountScopeEnforcer::validate("SELECT * FROM cur_table", &[]).is_err());
        let sql = "SELECT * FROM cur_table WHERE line_item_usage_account_id IN ('123456789012')";
        assert!(AccountScopeEnforcer::validate(sql, &["123456789012".to_string()]).is_ok());
    }

    #[test]
    fn validate_rejects_out_of_scope_literal() {
        let sql = "SELECT * FROM cur_table WHERE line_item_usage_account_id = '999999999999'";
        let err = AccountScopeEnforcer::validate(sql, &["123456789012".to_string()]).unwrap_err();
        assert_eq!(err.status(), "denied");
    }
}
