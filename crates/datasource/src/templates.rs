// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hand-written Athena SQL templates for the programmatic query paths
//! (§4.6 step 1). LLM-generated SQL from `finops-textsql` bypasses this
//! module entirely; these templates exist for the requests the
//! orchestrator composes itself (top-N, dimension breakdowns, ARN
//! lookups, trend, comparison, anomaly detection).

use chrono::NaiveDate;

/// `COALESCE(NULLIF(sp_effective,0), NULLIF(ri_effective,0), unblended)`,
/// used by every template here and by the text-to-SQL prompt.
pub const EFFECTIVE_COST_EXPR: &str = "COALESCE(NULLIF(savings_plan_savings_plan_effective_cost, 0), NULLIF(reservation_effective_cost, 0), line_item_unblended_cost)";

fn date_range_filter(column: &str, start: NaiveDate, end: NaiveDate) -> String {
    format!("CAST({column} AS DATE) BETWEEN DATE '{start}' AND DATE '{end}'")
}

fn quoted_list(values: &[String]) -> String {
    values.iter().map(|v| format!("'{v}'")).collect::<Vec<_>>().join(", ")
}

/// SQL template builder bound to one CUR database/table pair.
pub struct CurTemplates {
    full_table: String,
}

impl CurTemplates {
    /// Build a template generator for `database.table`.
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            full_table: format!("{}.{}", database.into(), table.into()),
        }
    }

    /// Top-N services by effective cost, with optional include/exclude
    /// service filters.
    pub fn top_n_services(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        limit: u32,
        include_services: &[String],
        exclude_services: &[String],
    ) -> String {
        let date_filter = date_range_filter("line_item_usage_start_date", start, end);
        let service_filter = if !include_services.is_empty() {
            format!("AND line_item_product_code IN ({})", quoted_list(include_services))
        } else if !exclude_services.is_empty() {
            format!("AND line_item_product_code NOT IN ({})", quoted_list(exclude_services))
        } else {
            String::new()
        };

        format!(
            r#"WITH service_costs AS (
  SELECT
    line_item_product_code AS service,
    SUM({cost}) AS cost
  FROM {table}
  WHERE {date_filter}
    AND line_item_line_item_type = 'Usage'
    {service_filter}
  GROUP BY 1
)
SELECT
  service,
  ROUND(cost, 2) AS cost_usd,
  ROUND(cost * 100.0 / (SELECT SUM(cost) FROM service_costs), 2) AS pct_of_total
FROM service_costs
WHERE service IS NOT NULL
ORDER BY cost DESC
LIMIT {limit}"#,
            cost = EFFECTIVE_COST_EXPR,
            table = self.full_table,
        )
    }

    /// Breakdown of a single service's cost by one dimension column,
    /// e.g. region, account, usage type, or operation.
    pub fn service_cost_breakdown(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        service: &str,
        dimension_column: &str,
    ) -> String {
        let date_filter = date_range_filter("line_item_usage_start_date", start, end);
        format!(
            r#"SELECT
  COALESCE(NULLIF(TRIM({dim}), ''), 'Unspecified') AS dimension_value,
  ROUND(SUM({cost}), 2) AS cost_usd,
  ROUND(SUM({cost}) * 100.0 / SUM(SUM({cost})) OVER (), 2) AS pct_of_service
FROM {table}
WHERE line_item_product_code = '{service}'
  AND {date_filter}
  AND line_item_line_item_type = 'Usage'
GROUP BY 1
ORDER BY cost_usd DESC"#,
            dim = dimension_column,
            cost = EFFECTIVE_COST_EXPR,
            table = self.full_table,
        )
    }

    /// Cost for one exact resource id, bucketed by day.
    pub fn resource_cost_by_arn(&self, start: NaiveDate, end: NaiveDate, resource_id: &str) -> String {
        let date_filter = date_range_filter("line_item_usage_start_date", start, end);
        format!(
            r#"SELECT
  DATE(line_item_usage_start_date) AS usage_date,
  line_item_resource_id AS resource_id,
  line_item_product_code AS service,
  COALESCE(product_region_code, 'global') AS region,
  ROUND(SUM({cost}), 2) AS cost_usd
FROM {table}
WHERE {date_filter}
  AND line_item_resource_id = '{resource_id}'
GROUP BY 1, 2, 3, 4
ORDER BY usage_date"#,
            cost = EFFECTIVE_COST_EXPR,
            table = self.full_table,
        )
    }

    /// The ARN-empty-result rescue query: LIKE-pattern search for
    /// resources related to an ARN that produced no direct cost rows,
    /// with CASE-based resource-type classification (§4.6).
    pub fn related_resources_by_arn_pattern(&self, start: NaiveDate, end: NaiveDate, arn: &str) -> String {
        let date_filter = date_range_filter("line_item_usage_start_date", start, end);
        let parts: Vec<&str> = arn.split(':').collect();
        let (service_pattern, broad_pattern) = if parts.len() >= 6 {
            let service = parts[2];
            let region = parts[3];
            let account = parts[4];
            let resource_part = parts[5..].join(":");
            let resource_name = if let Some(idx) = resource_part.rfind('/') {
                &resource_part[idx + 1..]
            } else if let Some(idx) = resource_part.rfind(':') {
                &resource_part[idx + 1..]
            } else {
                resource_part.as_str()
            };
            (
                format!("%{service}%{resource_name}%"),
                format!("%{service}%{region}%{account}%"),
            )
        } else {
            let fallback = parts.get(2).copied().unwrap_or("unknown");
            (format!("%{fallback}%"), format!("%{fallback}%"))
        };

        format!(
            r#"SELECT
  line_item_resource_id AS dimension_value,
  line_item_product_code AS service,
  COALESCE(product_region_code, 'global') AS region,
  ROUND(SUM({cost}), 2) AS cost_usd,
  COUNT(DISTINCT DATE(line_item_usage_start_date)) AS days_with_usage,
  CASE
    WHEN line_item_resource_id LIKE '%:task/%' THEN 'ECS Task'
    WHEN line_item_resource_id LIKE '%:service/%' THEN 'ECS Service'
    WHEN line_item_resource_id LIKE '%:instance/%' THEN 'EC2 Instance'
    WHEN line_item_resource_id LIKE '%:db:%' THEN 'RDS Database'
    WHEN line_item_resource_id LIKE '%:loadbalancer/%' THEN 'Load Balancer'
    WHEN line_item_resource_id LIKE '%:function:%' THEN 'Lambda Function'
    WHEN line_item_resource_id LIKE '%:natgateway/%' THEN 'NAT Gateway'
    ELSE 'Resource'
  END AS resource_type
FROM {table}
WHERE {date_filter}
  AND (line_item_resource_id LIKE '{service_pattern}' OR line_item_resource_id LIKE '{broad_pattern}')
  AND line_item_resource_id != '{arn}'
  AND {cost} > 0
GROUP BY 1, 2, 3, 6
HAVING SUM({cost}) > 0
ORDER BY cost_usd DESC
LIMIT 20"#,
            cost = EFFECTIVE_COST_EXPR,
            table = self.full_table,
        )
    }

    /// Side-by-side current-vs-previous period comparison for the top N
    /// services (by combined cost), with absolute and percent change.
    #[allow(clippy::too_many_arguments)]
    pub fn period_over_period_comparison(
        &self,
        current_start: NaiveDate,
        current_end: NaiveDate,
        previous_start: NaiveDate,
        previous_end: NaiveDate,
        top_n: u32,
        services: &[String],
    ) -> String {
        let service_filter = if services.is_empty() {
            String::new()
        } else {
            format!("AND line_item_product_code IN ({})", quoted_list(services))
        };
        let curr_filter = date_range_filter("line_item_usage_start_date", current_start, current_end);
        let prev_filter = date_range_filter("line_item_usage_start_date", previous_start, previous_end);

        format!(
            r#"WITH current_period AS (
  SELECT line_item_product_code AS service, ROUND(SUM({cost}), 2) AS cost_usd
  FROM {table}
  WHERE {curr_filter} {service_filter}
  GROUP BY 1
),
previous_period AS (
  SELECT line_item_product_code AS service, ROUND(SUM({cost}), 2) AS cost_usd
  FROM {table}
  WHERE {prev_filter} {service_filter}
  GROUP BY 1
),
combined AS (
  SELECT COALESCE(c.service, p.service) AS service,
         COALESCE(c.cost_usd, 0) AS current_cost,
         COALESCE(p.cost_usd, 0) AS previous_cost
  FROM current_period c
  FULL OUTER JOIN previous_period p ON c.service = p.service
),
top_services AS (
  SELECT service FROM combined ORDER BY current_cost DESC, previous_cost DESC LIMIT {top_n}
)
SELECT
  cs.service AS service,
  cs.current_cost AS current_period_cost,
  cs.previous_cost AS previous_period_cost,
  ROUND(cs.current_cost - cs.previous_cost, 2) AS cost_change,
  ROUND(
    CASE WHEN cs.previous_cost = 0 THEN CASE WHEN cs.current_cost > 0 THEN 100.0 ELSE 0.0 END
         ELSE ((cs.current_cost - cs.previous_cost) / cs.previous_cost) * 100 END, 2
  ) AS percent_change
FROM combined cs
WHERE cs.service IN (SELECT service FROM top_services)
ORDER BY current_period_cost DESC NULLS LAST"#,
            cost = EFFECTIVE_COST_EXPR,
            table = self.full_table,
        )
    }

    /// Month-by-month cost per service with a month-over-month percent
    /// change, optionally scoped to one service.
    pub fn monthly_trend(&self, start: NaiveDate, end: NaiveDate, service: Option<&str>) -> String {
        let date_filter = date_range_filter("line_item_usage_start_date", start, end);
        let service_filter = service.map(|s| format!("AND line_item_product_code = '{s}'")).unwrap_or_default();

        format!(
            r#"WITH monthly_costs AS (
  SELECT
    date_trunc('month', CAST(line_item_usage_start_date AS DATE)) AS month,
    line_item_product_code AS service,
    ROUND(SUM({cost}), 2) AS cost_usd
  FROM {table}
  WHERE {date_filter}
    {service_filter}
    AND line_item_product_code IS NOT NULL
  GROUP BY 1, 2
)
SELECT
  month,
  service,
  cost_usd,
  ROUND((cost_usd - LAG(cost_usd) OVER (PARTITION BY service ORDER BY month)) * 100.0
        / NULLIF(LAG(cost_usd) OVER (PARTITION BY service ORDER BY month), 0), 2) AS mom_change_pct
FROM monthly_costs
ORDER BY month ASC, service"#,
            cost = EFFECTIVE_COST_EXPR,
            table = self.full_table,
        )
    }

    /// Daily z-score anomaly detection against a trailing 7-day window,
    /// optionally scoped to one service.
    pub fn anomaly_detection(&self, start: NaiveDate, end: NaiveDate, service: Option<&str>) -> String {
        let date_filter = date_range_filter("line_item_usage_start_date", start, end);
        let service_filter = service.map(|s| format!("AND line_item_product_code = '{s}'")).unwrap_or_default();

        format!(
            r#"WITH daily_costs AS (
  SELECT
    CAST(line_item_usage_start_date AS DATE) AS dt,
    line_item_product_code AS service,
    ROUND(SUM({cost}), 2) AS cost_usd
  FROM {table}
  WHERE {date_filter}
    {service_filter}
  GROUP BY 1, 2
),
stats AS (
  SELECT
    dt, service, cost_usd,
    AVG(cost_usd) OVER (PARTITION BY service ORDER BY dt ROWS BETWEEN 7 PRECEDING AND 1 PRECEDING) AS mu,
    STDDEV_SAMP(cost_usd) OVER (PARTITION BY service ORDER BY dt ROWS BETWEEN 7 PRECEDING AND 1 PRECEDING) AS sigma
  FROM daily_costs
)
SELECT
  dt, service, cost_usd,
  ROUND(mu, 2) AS expected,
  ROUND(cost_usd - mu, 2) AS delta,
  CASE WHEN sigma IS NULL OR sigma = 0 THEN NULL ELSE ROUND((cost_usd - mu) / sigma, 2) END AS z_score
FROM stats
WHERE ABS((cost_usd - mu) / NULLIF(sigma, 0)) > 2.0
ORDER BY dt DESC, ABS(z_score) DESC NULLS LAST"#,
            cost = EFFECTIVE_COST_EXPR,
            table = self.full_table,
        )
    }

    /// Usage-type breakdown for a single service or resource, the
    /// follow-up query `AutoDrillDown` issues when a primary result
    /// collapses to exactly one row.
    pub fn usage_type_breakdown(&self, start: NaiveDate, end: NaiveDate, service: Option<&str>, resource_id: Option<&str>) -> String {
        let date_filter = date_range_filter("line_item_usage_start_date", start, end);
        let service_filter = service.map(|s| format!("\n  AND line_item_product_code = '{s}'")).unwrap_or_default();
        let resource_filter = resource_id.map(|r| format!("\n  AND line_item_resource_id = '{r}'")).unwrap_or_default();

        format!(
            r#"SELECT
  line_item_usage_type AS usage_type,
  ROUND(SUM({cost}), 2) AS cost_usd
FROM {table}
WHERE {date_filter}{service_filter}{resource_filter}
GROUP BY 1
HAVING SUM({cost}) > 0
ORDER BY cost_usd DESC
LIMIT 20"#,
            cost = EFFECTIVE_COST_EXPR,
            table = self.full_table,
        )
    }

    /// A single-number total-cost summary, used when no other template
    /// fits the classified intent.
    pub fn total_cost_summary(&self, start: NaiveDate, end: NaiveDate) -> String {
        let date_filter = date_range_filter("line_item_usage_start_date", start, end);
        format!(
            r#"SELECT ROUND(SUM({cost}), 2) AS cost_usd
FROM {table}
WHERE {date_filter}
  AND line_item_line_item_type = 'Usage'"#,
            cost = EFFECTIVE_COST_EXPR,
            table = self.full_table,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn top_n_services_includes_limit_and_effective_cost() {
        let templates = CurTemplates::new("cost_usage_db", "cur_data");
        let sql = templates.top_n_services(d("2025-11-01"), d("2025-11-30"), 5, &[], &[]);
        assert!(sql.contains("LIMIT 5"));
        assert!(sql.contains(EFFECTIVE_COST_EXPR));
    }

    #[test]
    fn related_resources_pattern_extracts_service_and_resource_name() {
        let templates = CurTemplates::new("cost_usage_db", "cur_data");
        let sql = templates.related_resources_by_arn_pattern(
            d("2025-11-01"),
            d("2025-11-30"),
            "arn:aws:ecs:us-east-1:123456789012:cluster/my-cluster",
        );
        assert!(sql.contains("%ecs%my-cluster%"));
        assert!(sql.contains("ECS Task"));
    }

    #[test]
    fn service_cost_breakdown_groups_by_given_dimension_column() {
        let templates = CurTemplates::new("cost_usage_db", "cur_data");
        let sql = templates.service_cost_breakdown(d("2025-11-01"), d("2025-11-30"), "AmazonEC2", "product_region_code");
        assert!(sql.contains("product_region_code"));
        assert!(sql.contains("line_item_product_code = 'AmazonEC2'"));
    }

    #[test]
    fn usage_type_breakdown_filters_by_service_when_given() {
        let templates = CurTemplates::new("cost_usage_db", "cur_data");
        let sql = templates.usage_type_breakdown(d("2025-11-01"), d("2025-11-30"), Some("AmazonEC2"), None);
        assert!(sql.contains("line_item_usage_type AS usage_type"));
        assert!(sql.contains("line_item_product_code = 'AmazonEC2'"));
        assert!(!sql.contains("line_item_resource_id ="));
    }
}
