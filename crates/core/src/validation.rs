// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Input validators for every caller-supplied value that can reach a
//! generated SQL string.
//!
//! Athena has no prepared-statement parameter binding, so every value
//! that ends up inside a query body is validated or escaped here first.
//! Validators return the *normalized* value (canonical casing, trimmed,
//! and in a few cases pre-escaped for direct interpolation) rather than
//! a boolean, so callers cannot accidentally use the original unchecked
//! string after calling one.

use crate::error::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern is valid regex")
}

static SAFE_IDENTIFIER: Lazy<Regex> = Lazy::new(|| rx(r"^[a-zA-Z][a-zA-Z0-9_-]*$"));
static AWS_ACCOUNT_ID: Lazy<Regex> = Lazy::new(|| rx(r"^\d{12}$"));
static AWS_REGION: Lazy<Regex> = Lazy::new(|| rx(r"^[a-z]{2}-[a-z]+-\d$"));
static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| rx(r"^\d{4}-\d{2}-\d{2}$"));
static SAFE_RESOURCE_ID: Lazy<Regex> = Lazy::new(|| rx(r"^[a-zA-Z0-9][a-zA-Z0-9_\-:/.]*$"));
static INSTANCE_TYPE_LOOSE: Lazy<Regex> = Lazy::new(|| rx(r"^[a-z][a-z0-9]*\d*[a-z]*\."));
static DB_ENGINE_PATTERN: Lazy<Regex> = Lazy::new(|| rx(r"^[a-z][a-z0-9_-]*$"));

static SQL_INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        rx(r#"['"].*?['"]"#),
        rx(r"--"),
        rx(r"(?s)/\*.*?\*/"),
        rx(r"(?i);\s*(?:SELECT|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|TRUNCATE)"),
        rx(r#"(?i)\bOR\b\s+['"]?\d+['"]?\s*=\s*['"]?\d+['"]?"#),
        rx(r#"(?i)\bAND\b\s+['"]?\d+['"]?\s*=\s*['"]?\d+['"]?"#),
        rx(r"(?is)\bUNION\b.*?\bSELECT\b"),
        rx(r";\s*$"),
    ]
});

static KNOWN_AWS_SERVICES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "AmazonEC2", "AmazonS3", "AmazonRDS", "AWSLambda", "AmazonDynamoDB",
        "AmazonCloudWatch", "AmazonVPC", "AmazonRoute53", "AmazonSNS", "AmazonSQS",
        "AmazonElastiCache", "AmazonEFS", "AmazonEKS", "AmazonECS", "AmazonECR",
        "AWSCloudTrail", "AWSConfig", "AWSSecretsManager", "AWSSystemsManager",
        "AmazonKinesis", "AmazonRedshift", "AmazonAthena", "AWSGlue",
        "AmazonSageMaker", "AmazonComprehend", "AmazonRekognition", "AmazonTextract",
        "AmazonTranscribe", "AmazonTranslate", "AmazonPolly", "AmazonLex",
        "AWSCodeBuild", "AWSCodePipeline", "AWSCodeDeploy", "AWSCodeCommit",
        "AmazonCloudFront", "AmazonAPIGateway", "AWSAppSync", "AmazonCognito",
        "AWSAmplify", "AWSBatch", "AWSStep Functions", "AmazonMQ",
        "AmazonMSK", "AmazonDocumentDB", "AmazonNeptune", "AmazonQLDB",
        "AmazonTimestream", "AmazonKeyspaces", "AmazonMemoryDB",
        "AWSBackup", "AWSDataSync", "AWSTransfer", "AWSSnowball",
        "AmazonWorkSpaces", "AmazonAppStream", "AmazonConnect",
        "AWSDirectConnect", "AWSPrivateLink", "AWSTransitGateway",
        "AWSGlobalAccelerator", "AWSNetworkFirewall", "AWSShield",
        "AWSWAF", "AWSFirewallManager", "AmazonGuardDuty", "AmazonInspector",
        "AWSSecurityHub", "AWSArtifact", "AmazonMacie", "AWSDetective",
        "AWSIoT", "AWSIoTAnalytics", "AWSIoTEvents", "AWSIoTSiteWise",
        "AWSRoboMaker", "AWSGroundStation", "AWSOutposts", "AWSWavelength",
        "AWSLocalZones", "AmazonLightsail", "AWSElasticBeanstalk",
        "AmazonOpenSearch", "AmazonKendra", "AmazonPersonalize",
        "AmazonForecast", "AmazonFraudDetector", "AmazonDevOpsGuru",
        "AWSProton", "AWSAppRunner", "AmazonMWAA", "AWSDataExchange",
        "AWSMarketplace", "AWSSavingsPlans", "AWSCostExplorer",
        "AWSBudgets", "AWSCostAndUsageReport", "AmazonQuickSight",
        "AWSDataPipeline", "AmazonEMR", "AWSLakeFormation",
        "Amazon Elastic Compute Cloud", "Amazon Simple Storage Service",
        "Amazon Relational Database Service", "AWS Lambda",
    ]
    .into_iter()
    .collect()
});

static KNOWN_AWS_REGIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "us-east-1", "us-east-2", "us-west-1", "us-west-2",
        "eu-west-1", "eu-west-2", "eu-west-3", "eu-central-1", "eu-north-1",
        "eu-south-1", "eu-south-2", "eu-central-2",
        "ap-south-1", "ap-south-2", "ap-northeast-1", "ap-northeast-2", "ap-northeast-3",
        "ap-southeast-1", "ap-southeast-2", "ap-southeast-3", "ap-southeast-4",
        "ap-east-1", "sa-east-1", "ca-central-1", "ca-west-1",
        "me-south-1", "me-central-1", "af-south-1", "il-central-1",
        "us-gov-west-1", "us-gov-east-1",
        "cn-north-1", "cn-northwest-1",
        "global",
    ]
    .into_iter()
    .collect()
});

static KNOWN_OPERATING_SYSTEMS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Linux", "Windows", "RHEL", "SUSE", "Ubuntu",
        "Amazon Linux", "Amazon Linux 2", "Amazon Linux 2023",
        "Windows Server", "Red Hat Enterprise Linux",
        "CentOS", "Debian", "macOS",
    ]
});

static KNOWN_DATABASE_ENGINES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "mysql", "postgres", "postgresql", "mariadb", "oracle",
        "sqlserver", "sql-server", "aurora", "aurora-mysql", "aurora-postgresql",
        "neptune", "documentdb", "dynamodb", "redis", "memcached",
        "elasticsearch", "opensearch",
    ]
});

/// Whether `value` matches any of the known SQL-injection shapes, or has
/// unbalanced quotes.
pub fn contains_sql_injection(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    if SQL_INJECTION_PATTERNS.iter().any(|p| p.is_match(value)) {
        return true;
    }
    let singles = value.matches('\'').count();
    let doubles = value.matches('"').count();
    singles % 2 != 0 || doubles % 2 != 0
}

/// Escape single quotes by doubling them, SQL-standard style.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Escape a value for safe inclusion inside a `LIKE` pattern: SQL-escape
/// first, then backslash-escape `%` and `_`.
pub fn escape_like_pattern(value: &str) -> String {
    escape_sql_string(value).replace('%', "\\%").replace('_', "\\_")
}

/// Validate a bare SQL identifier (column or table name fragment).
pub fn validate_identifier(value: &str, field_name: &str) -> crate::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{field_name} cannot be empty")));
    }
    if value.len() > 128 {
        return Err(Error::validation(format!(
            "{field_name} exceeds maximum length (128 characters)"
        )));
    }
    if !SAFE_IDENTIFIER.is_match(value) {
        return Err(Error::validation(format!(
            "invalid {field_name}: must start with letter, contain only alphanumeric, underscore, or hyphen"
        )));
    }
    if contains_sql_injection(value) {
        tracing::warn!(field = field_name, "SQL injection attempt detected in identifier");
        return Err(Error::validation(format!(
            "invalid {field_name}: contains prohibited characters"
        )));
    }
    Ok(value.to_string())
}

/// Validate an AWS service code. In non-strict mode, unknown codes are
/// accepted as long as they match the safe-identifier shape and carry no
/// injection risk; `strict` mode rejects anything not in the allowlist.
pub fn validate_service_code(value: &str, strict: bool) -> crate::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation("service code cannot be empty"));
    }
    let lower = value.to_lowercase();
    if let Some(known) = KNOWN_AWS_SERVICES.iter().find(|k| k.to_lowercase() == lower) {
        return Ok((*known).to_string());
    }
    if strict {
        return Err(Error::validation(format!("unknown service code: {value}")));
    }
    if !SAFE_IDENTIFIER.is_match(value) {
        return Err(Error::validation(format!("invalid service code format: {value}")));
    }
    if contains_sql_injection(value) {
        return Err(Error::validation(format!("invalid service code: {value}")));
    }
    tracing::info!(service = value, "unknown service code used");
    Ok(value.to_string())
}

/// Validate an AWS region, allowing unknown-but-well-shaped regions
/// through (new regions launch faster than allowlists get updated).
pub fn validate_region(value: &str) -> crate::Result<String> {
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        return Err(Error::validation("region cannot be empty"));
    }
    if KNOWN_AWS_REGIONS.contains(value.as_str()) {
        return Ok(value);
    }
    if AWS_REGION.is_match(&value) {
        tracing::info!(region = %value, "unknown AWS region used");
        return Ok(value);
    }
    Err(Error::validation(format!("invalid region: {value}")))
}

/// Validate a 12-digit AWS account id.
pub fn validate_account_id(value: &str) -> crate::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation("account ID cannot be empty"));
    }
    if !AWS_ACCOUNT_ID.is_match(value) {
        return Err(Error::validation("invalid account ID: must be 12 digits"));
    }
    Ok(value.to_string())
}

/// Validate and normalize a tag key into a safe column-name fragment:
/// lowercased, non-alphanumerics collapsed to single underscores,
/// prefixed with `tag_` if the result doesn't start with a letter.
pub fn validate_tag_key(value: &str) -> crate::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation("tag key cannot be empty"));
    }
    if value.len() > 128 {
        return Err(Error::validation("tag key exceeds maximum length (128 characters)"));
    }
    let collapse_underscores = rx(r"_+");
    let non_alnum = rx(r"[^a-z0-9]");
    let mut normalized = non_alnum.replace_all(&value.to_lowercase(), "_").to_string();
    normalized = collapse_underscores.replace_all(&normalized, "_").to_string();
    let normalized = normalized.trim_matches('_').to_string();
    if normalized.is_empty() {
        return Err(Error::validation(format!("tag key contains no valid characters: {value}")));
    }
    if !normalized.chars().next().unwrap().is_alphabetic() {
        return Ok(format!("tag_{normalized}"));
    }
    Ok(normalized)
}

/// Validate and SQL-escape a tag value.
pub fn validate_tag_value(value: &str) -> crate::Result<String> {
    let value = value.trim();
    if value.len() > 256 {
        return Err(Error::validation("tag value exceeds maximum length (256 characters)"));
    }
    if contains_sql_injection(value) {
        return Err(Error::validation("invalid tag value: contains prohibited characters"));
    }
    Ok(escape_sql_string(value))
}

/// Validate an EC2 instance type (e.g. `m5.large`), falling back to a
/// loose family-prefix check for shapes the strict pattern misses.
pub fn validate_instance_type(value: &str) -> crate::Result<String> {
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        return Err(Error::validation("instance type cannot be empty"));
    }
    let strict = rx(r"^[a-z][a-z0-9]*\d*[a-z]*\.(nano|micro|small|medium|large|xlarge|\d*xlarge|metal)$");
    if !strict.is_match(&value) && !INSTANCE_TYPE_LOOSE.is_match(&value) {
        return Err(Error::validation(format!("invalid instance type format: {value}")));
    }
    if contains_sql_injection(&value) {
        return Err(Error::validation(format!("invalid instance type: {value}")));
    }
    Ok(value)
}

/// Validate an operating system name, allowing partial matches against
/// the known list before falling back to pattern validation.
pub fn validate_operating_system(value: &str) -> crate::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation("operating system cannot be empty"));
    }
    let lower = value.to_lowercase();
    if let Some(known) = KNOWN_OPERATING_SYSTEMS.iter().find(|k| k.to_lowercase() == lower) {
        return Ok((*known).to_string());
    }
    if let Some(known) = KNOWN_OPERATING_SYSTEMS
        .iter()
        .find(|k| lower.contains(&k.to_lowercase()) || k.to_lowercase().contains(&lower))
    {
        return Ok((*known).to_string());
    }
    let stripped = value.replace(' ', "");
    if !SAFE_IDENTIFIER.is_match(&stripped) {
        return Err(Error::validation(format!("invalid operating system: {value}")));
    }
    if contains_sql_injection(value) {
        return Err(Error::validation(format!("invalid operating system: {value}")));
    }
    Ok(escape_sql_string(value))
}

/// Validate a database engine name, allowing substring matches against
/// the known list before falling back to pattern validation.
pub fn validate_database_engine(value: &str) -> crate::Result<String> {
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        return Err(Error::validation("database engine cannot be empty"));
    }
    if KNOWN_DATABASE_ENGINES.contains(&value.as_str()) {
        return Ok(value);
    }
    if let Some(known) = KNOWN_DATABASE_ENGINES
        .iter()
        .find(|k| value.contains(*k) || k.contains(&value))
    {
        return Ok((*known).to_string());
    }
    if !DB_ENGINE_PATTERN.is_match(&value) {
        return Err(Error::validation(format!("invalid database engine: {value}")));
    }
    if contains_sql_injection(&value) {
        return Err(Error::validation(format!("invalid database engine: {value}")));
    }
    tracing::info!(engine = %value, "unknown database engine used");
    Ok(escape_sql_string(&value))
}

/// Validate a `YYYY-MM-DD` date string. Only checks the year is in
/// `[2000, 2100]`, month in `[1, 12]`, and day in `[1, 31]` — it does
/// not check day-of-month validity against the actual calendar (e.g.
/// `2025-02-30` passes this check), matching the source this was
/// ported from.
pub fn validate_date(value: &str) -> crate::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation("date cannot be empty"));
    }
    if !DATE_PATTERN.is_match(value) {
        return Err(Error::validation(format!("invalid date format: {value}. Expected YYYY-MM-DD")));
    }
    let parts: Vec<&str> = value.split('-').collect();
    let year: i32 = parts[0].parse().unwrap();
    let month: i32 = parts[1].parse().unwrap();
    let day: i32 = parts[2].parse().unwrap();
    if !(2000..=2100).contains(&year) {
        return Err(Error::validation(format!("invalid year: {year}")));
    }
    if !(1..=12).contains(&month) {
        return Err(Error::validation(format!("invalid month: {month}")));
    }
    if !(1..=31).contains(&day) {
        return Err(Error::validation(format!("invalid day: {day}")));
    }
    Ok(value.to_string())
}

/// Validate and SQL-escape a resource id (instance id, ARN, or similar).
pub fn validate_resource_id(value: &str) -> crate::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation("resource ID cannot be empty"));
    }
    if value.len() > 512 {
        return Err(Error::validation("resource ID exceeds maximum length (512 characters)"));
    }
    if contains_sql_injection(value) {
        tracing::warn!("SQL injection attempt detected in resource ID");
        return Err(Error::validation("invalid resource ID: contains prohibited characters"));
    }
    if !SAFE_RESOURCE_ID.is_match(value) {
        let preview: String = value.chars().take(50).collect();
        return Err(Error::validation(format!("invalid resource ID format: {preview}")));
    }
    Ok(escape_sql_string(value))
}

/// Validate a list of filter values against `validator`, capping the
/// list length and annotating which index failed on error.
pub fn validate_filter_values(
    values: &[String],
    validator: impl Fn(&str) -> crate::Result<String>,
    field_name: &str,
    max_count: usize,
) -> crate::Result<Vec<String>> {
    if values.is_empty() {
        return Ok(Vec::new());
    }
    if values.len() > max_count {
        return Err(Error::validation(format!("too many {field_name}: maximum {max_count} allowed")));
    }
    values
        .iter()
        .enumerate()
        .map(|(i, v)| validator(v).map_err(|e| Error::validation(format!("{field_name}[{i}]: {e}"))))
        .collect()
}

/// Build a safe `IN (...)` clause body (without the `IN` keyword) from a
/// list of values, each run through `validator`. An empty input list
/// produces an impossible-to-match literal rather than an empty clause.
pub fn build_safe_in_clause(
    values: &[String],
    validator: impl Fn(&str) -> crate::Result<String>,
) -> crate::Result<String> {
    if values.is_empty() {
        return Ok("'__EMPTY__'".to_string());
    }
    let validated = validate_filter_values(values, validator, "values", 100)?;
    Ok(validated.iter().map(|v| format!("'{v}'")).collect::<Vec<_>>().join(", "))
}

/// Where in the value the pattern should anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikePosition {
    /// `%value%`.
    Contains,
    /// `value%`.
    Starts,
    /// `%value`.
    Ends,
}

/// Build a safe `column LIKE '...'` clause. `column` must already be a
/// validated identifier.
pub fn build_safe_like_clause(value: &str, column: &str, position: LikePosition) -> String {
    let escaped = escape_like_pattern(value);
    let pattern = match position {
        LikePosition::Starts => format!("{escaped}%"),
        LikePosition::Ends => format!("%{escaped}"),
        LikePosition::Contains => format!("%{escaped}%"),
    };
    format!("{column} LIKE '{pattern}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_or_one_equals_one() {
        assert!(contains_sql_injection("1 OR 1=1"));
        assert!(contains_sql_injection("'; DROP TABLE users; --"));
    }

    #[test]
    fn detects_unbalanced_quotes() {
        assert!(contains_sql_injection("O'Brien's"));
    }

    #[test]
    fn plain_text_passes() {
        assert!(!contains_sql_injection("AmazonEC2"));
        assert!(!contains_sql_injection("us-east-1"));
    }

    #[test]
    fn validate_account_id_requires_12_digits() {
        assert!(validate_account_id("123456789012").is_ok());
        assert!(validate_account_id("12345").is_err());
        assert!(validate_account_id("12345678901a").is_err());
    }

    #[test]
    fn validate_service_code_returns_canonical_casing() {
        assert_eq!(validate_service_code("amazonec2", false).unwrap(), "AmazonEC2");
    }

    #[test]
    fn validate_service_code_strict_rejects_unknown() {
        assert!(validate_service_code("NotARealService", true).is_err());
    }

    #[test]
    fn validate_region_accepts_known_and_well_shaped_unknown() {
        assert_eq!(validate_region("US-EAST-1").unwrap(), "us-east-1");
        assert_eq!(validate_region("ap-newregion-1").unwrap(), "ap-newregion-1");
        assert!(validate_region("not a region").is_err());
    }

    #[test]
    fn validate_date_rejects_out_of_range_but_not_calendar_invalid() {
        assert!(validate_date("2025-13-01").is_err());
        assert!(validate_date("1999-01-01").is_err());
        assert!(validate_date("2025-02-30").is_ok());
    }

    #[test]
    fn validate_tag_key_normalizes_and_prefixes() {
        assert_eq!(validate_tag_key("Cost Center!").unwrap(), "cost_center");
        assert_eq!(validate_tag_key("123abc").unwrap(), "tag_123abc");
    }

    #[test]
    fn build_safe_in_clause_rejects_empty_with_impossible_literal() {
        assert_eq!(
            build_safe_in_clause(&[], validate_account_id).unwrap(),
            "'__EMPTY__'"
        );
    }

    #[test]
    fn build_safe_like_clause_escapes_wildcards() {
        let clause = build_safe_like_clause("50%_off", "line_item_usage_type", LikePosition::Contains);
        assert_eq!(clause, "line_item_usage_type LIKE '%50\\%\\_off%'");
    }
}
