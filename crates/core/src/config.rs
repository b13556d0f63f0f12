// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Layered application configuration, shared by the `finops` CLI and the
//! `query-api` service.

use serde::{Deserialize, Serialize};

/// Top-level configuration for a running pipeline instance.
///
/// Loaded in the order compiled-in defaults → an optional
/// `config/default.toml` → environment variables prefixed `FINOPS_`
/// (double-underscore separated, e.g. `FINOPS_ATHENA__DATABASE`). Callers
/// load any `.env` file with `dotenvy::dotenv()` before calling
/// [`AppConfig::load`] so its values are visible to the environment step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// AWS region Athena and Cost Explorer clients are built against.
    #[serde(default = "default_aws_region")]
    pub aws_region: String,
    /// Athena configuration.
    #[serde(default)]
    pub athena: AthenaConfig,
    /// LLM provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Default account allowlist used when no `RequestContext` is supplied
    /// (local CLI runs).
    #[serde(default)]
    pub default_allowed_account_ids: Vec<String>,
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// `ServiceResolver` tuning.
    #[serde(default)]
    pub resolver: ResolverConfig,
}

/// Athena driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthenaConfig {
    /// Glue/Athena database name.
    #[serde(default = "default_athena_database")]
    pub database: String,
    /// CUR table name within `database`.
    #[serde(default = "default_cur_table")]
    pub cur_table: String,
    /// S3 location Athena writes query results to.
    #[serde(default = "default_output_location")]
    pub output_location: String,
    /// Poll interval, in milliseconds, while waiting for a query execution
    /// to finish.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum number of poll attempts before giving up on an execution.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

/// LLM provider selection and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which provider backs [`finops_core::provider::LlmClient`]: `"openai"`
    /// or `"anthropic"`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    /// API key for the selected provider. Left unset here and resolved
    /// from `OPENAI_API_KEY`/`ANTHROPIC_API_KEY` by the provider's own
    /// `from_env` unless overridden.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name override.
    #[serde(default)]
    pub model: Option<String>,
}

/// `query-api` HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port for the query API.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind port for the Prometheus metrics exporter.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// `ServiceResolver` tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Minimum Jaro-Winkler similarity accepted as a fuzzy match.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    /// How often the product-code cache should be considered stale, in
    /// seconds.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}
fn default_athena_database() -> String {
    "cost_usage_db".to_string()
}
fn default_cur_table() -> String {
    "cur_data".to_string()
}
fn default_output_location() -> String {
    "s3://finops-athena-results/".to_string()
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_max_poll_attempts() -> u32 {
    60
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_fuzzy_threshold() -> f64 {
    0.82
}
fn default_refresh_interval_secs() -> u64 {
    3600
}

impl Default for AthenaConfig {
    fn default() -> Self {
        Self {
            database: default_athena_database(),
            cur_table: default_cur_table(),
            output_location: default_output_location(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { provider: default_llm_provider(), api_key: None, model: None }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), metrics_port: default_metrics_port() }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { fuzzy_threshold: default_fuzzy_threshold(), refresh_interval_secs: default_refresh_interval_secs() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            aws_region: default_aws_region(),
            athena: AthenaConfig::default(),
            llm: LlmConfig::default(),
            default_allowed_account_ids: Vec::new(),
            server: ServerConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from compiled-in defaults, an optional
    /// `config/default.toml`, and `FINOPS_`-prefixed environment
    /// variables, in that precedence order.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("FINOPS").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = AppConfig::default();
        assert_eq!(config.athena.database, "cost_usage_db");
        assert_eq!(config.server.port, 8080);
        assert!(config.default_allowed_account_ids.is_empty());
    }

    #[test]
    fn load_falls_back_to_defaults_without_env_or_file() {
        let config = AppConfig::load().expect("defaults alone must deserialize");
        assert_eq!(config.llm.provider, "openai");
    }
}
