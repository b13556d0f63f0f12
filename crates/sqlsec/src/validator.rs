// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Whole-statement SQL validation (§4.2).

use finops_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static sqlsec pattern is valid regex")
}

const DANGEROUS_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "TRUNCATE", "CREATE",
    "REPLACE", "GRANT", "REVOKE", "EXEC", "EXECUTE", "MERGE", "CALL",
];

const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "pg_catalog", "sys", "mysql"];

static SCHEMA_INSPECTION: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\b(EXPLAIN|DESCRIBE|SHOW)\b"));
static STANDALONE_DESC: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bDESC\b"));
static DESC_IN_ORDER_BY: Lazy<Regex> = Lazy::new(|| rx(r"(?is)\bORDER\s+BY\b.*?\bDESC\b"));
static LEADING_COMMENTS: Lazy<Regex> = Lazy::new(|| rx(r"(?s)^\s*(?:--.*?\n|/\*.*?\*/\s*)*"));
static CTE_NAME: Lazy<Regex> = Lazy::new(|| rx(r"(?i)\bWITH\s+([a-z_][a-z0-9_]*)\s+AS\s*\("));
static TABLE_REF: Lazy<Regex> =
    Lazy::new(|| rx(r"(?i)\b(?:FROM|JOIN)\s+([a-z_][a-z0-9_]*(?:\.[a-z_][a-z0-9_]*)?)"));

static SUSPICIOUS_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (rx(r"(?i);\s*SELECT"), "stacked SELECT detected"),
        (rx(r"(?is)\bUNION\b.*?\bSELECT\b"), "UNION injection attempt detected"),
        (rx(r"--"), "SQL comment detected"),
        (rx(r"/\*"), "block comment detected"),
    ]
});

/// Validates that a generated SQL string is a single, read-only
/// statement against the configured CUR table (and its own CTEs only).
pub struct SqlValidator {
    cur_table: String,
}

impl SqlValidator {
    /// Build a validator scoped to a single CUR table name.
    pub fn new(cur_table: impl Into<String>) -> Self {
        Self {
            cur_table: cur_table.into().to_lowercase(),
        }
    }

    /// Validate `sql`, returning `Err(Error::SqlRejected(..))` on the
    /// first rule violated. Order follows §4.2: single statement,
    /// keyword denylist, schema-inspection denylist, SELECT/WITH-only
    /// start, then table allowlist (system schemas checked first).
    pub fn validate(&self, sql: &str) -> Result<()> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        self.check_single_statement(trimmed)?;
        self.check_dangerous_keywords(sql)?;
        self.check_schema_inspection(sql)?;
        self.check_starts_with_select_or_with(sql)?;
        self.log_suspicious_patterns(sql);
        self.check_system_schemas(sql)?;
        self.check_table_allowlist(sql)?;

        tracing::info!(sql_length = sql.len(), "generated SQL validation passed");
        Ok(())
    }

    fn check_single_statement(&self, trimmed: &str) -> Result<()> {
        let without_trailing_semicolons = trimmed.trim_end_matches(';');
        if without_trailing_semicolons.contains(';') {
            return Err(Error::sql_rejected("multi-statement SQL not allowed"));
        }
        Ok(())
    }

    fn check_dangerous_keywords(&self, sql: &str) -> Result<()> {
        for keyword in DANGEROUS_KEYWORDS {
            let pattern = rx(&format!(r"(?i)\b{keyword}\b"));
            if pattern.is_match(sql) {
                return Err(Error::sql_rejected(format!(
                    "dangerous SQL keyword not allowed: {keyword}"
                )));
            }
        }
        Ok(())
    }

    fn check_schema_inspection(&self, sql: &str) -> Result<()> {
        if SCHEMA_INSPECTION.is_match(sql) {
            return Err(Error::sql_rejected("schema inspection commands not allowed"));
        }
        if STANDALONE_DESC.is_match(sql) && !DESC_IN_ORDER_BY.is_match(sql) {
            return Err(Error::sql_rejected("schema inspection commands not allowed"));
        }
        Ok(())
    }

    fn check_starts_with_select_or_with(&self, sql: &str) -> Result<()> {
        let cleaned = LEADING_COMMENTS.replace(sql, "");
        let cleaned = cleaned.trim().to_uppercase();
        if !(cleaned.starts_with("SELECT") || cleaned.starts_with("WITH")) {
            return Err(Error::sql_rejected("only SELECT queries (including CTEs) are allowed"));
        }
        Ok(())
    }

    fn log_suspicious_patterns(&self, sql: &str) {
        for (pattern, description) in SUSPICIOUS_PATTERNS.iter() {
            if pattern.is_match(sql) {
                let preview: String = sql.chars().take(150).collect();
                tracing::warn!(pattern = description, sql_preview = %preview, "suspicious SQL pattern in generated query");
            }
        }
    }

    fn check_system_schemas(&self, sql: &str) -> Result<()> {
        let lower = sql.to_lowercase();
        for schema in SYSTEM_SCHEMAS {
            let pattern = rx(&format!(r"\b{schema}\b"));
            if pattern.is_match(&lower) {
                return Err(Error::sql_rejected(format!(
                    "access to system tables not allowed: {schema}"
                )));
            }
        }
        Ok(())
    }

    fn check_table_allowlist(&self, sql: &str) -> Result<()> {
        let cte_names: HashSet<String> = CTE_NAME
            .captures_iter(sql)
            .map(|c| c[1].to_lowercase())
            .collect();

        let mut mentioned_tables = HashSet::new();
        for captures in TABLE_REF.captures_iter(sql) {
            let mut table_ref = captures[1].to_lowercase();
            if let Some((_, suffix)) = table_ref.split_once('.') {
                table_ref = suffix.to_string();
            }
            mentioned_tables.insert(table_ref);
        }

        let unauthorized: Vec<&String> = mentioned_tables
            .iter()
            .filter(|t| **t != self.cur_table && !cte_names.contains(*t))
            .collect();

        if !unauthorized.is_empty() {
            let names = unauthorized
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::sql_rejected(format!(
                "access to table(s) not allowed: {names}. Only '{}' is permitted.",
                self.cur_table
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SqlValidator {
        SqlValidator::new("cur_table")
    }

    #[test]
    fn accepts_plain_select() {
        assert!(validator().validate("SELECT * FROM cur_table LIMIT 10").is_ok());
    }

    #[test]
    fn accepts_cte_referencing_only_the_cur_table() {
        let sql = "WITH recent AS (SELECT * FROM cur_table) SELECT * FROM recent";
        assert!(validator().validate(sql).is_ok());
    }

    #[test]
    fn rejects_multi_statement() {
        let err = validator().validate("SELECT 1; SELECT 2").unwrap_err();
        assert_eq!(err.status(), "validation_failed");
    }

    #[test]
    fn rejects_drop_as_whole_word() {
        assert!(validator().validate("DROP TABLE cur_table").is_err());
    }

    #[test]
    fn does_not_reject_column_names_containing_keyword_substrings() {
        // "created_at" contains "create" but not as a whole word.
        assert!(validator().validate("SELECT created_at FROM cur_table").is_ok());
    }

    #[test]
    fn rejects_describe() {
        assert!(validator().validate("DESCRIBE cur_table").is_err());
    }

    #[test]
    fn allows_order_by_desc() {
        let sql = "SELECT service FROM cur_table ORDER BY cost DESC";
        assert!(validator().validate(sql).is_ok());
    }

    #[test]
    fn rejects_standalone_desc_outside_order_by() {
        assert!(validator().validate("SELECT * FROM cur_table DESC").is_err());
    }

    #[test]
    fn rejects_non_select_start() {
        assert!(validator().validate("EXPLAIN SELECT * FROM cur_table").is_err());
    }

    #[test]
    fn rejects_information_schema_before_table_check() {
        let err = validator()
            .validate("SELECT * FROM information_schema.tables")
            .unwrap_err();
        assert!(err.to_string().contains("system tables"));
    }

    #[test]
    fn rejects_unauthorized_table() {
        let err = validator()
            .validate("SELECT * FROM other_table")
            .unwrap_err();
        assert!(err.to_string().contains("other_table"));
    }
}
