// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Markdown narrative assembly over a `QueryResult` (§4.11).
//!
//! [`ResponseFormatter::build`] composes a fixed, ordered set of
//! sections into one markdown string, substitutes `${Var}` placeholders
//! the LLM's explanation may contain, and re-parses the assembled text
//! into the structured `summary`/`insights`/`recommendations` fields the
//! API also returns alongside the raw markdown.

use std::collections::HashMap;

use finops_core::{Insight, Intent, QueryResult, Recommendation, Row};
use once_cell::sync::Lazy;
use regex::Regex;

/// Everything the formatter needs beyond the raw `QueryResult`: the
/// user's intent, the LLM's own explanation/methodology request flag,
/// any insights/recommendations/chart specs it supplied, and whether
/// the caller asked "how was this computed".
#[derive(Debug, Clone)]
pub struct FormatterInput<'a> {
    /// Classified intent driving the summary/insights/next-steps branch.
    pub intent: Intent,
    /// The LLM's own explanation text, used verbatim as the narrative
    /// seed and placeholder-substituted.
    pub explanation: &'a str,
    /// Whether the user explicitly asked for a methodology explanation.
    pub explanation_request: bool,
    /// Caller-supplied insights (verbatim, bullet-normalized) taking
    /// priority over generated defaults.
    pub insights: &'a [String],
    /// Rendered chart specs; when non-empty, Results renders prose
    /// instead of a full table (except `cost_breakdown`, always tabular).
    pub charts: &'a [serde_json::Value],
    /// Requested time period description, for the Scope section.
    pub period_description: Option<&'a str>,
    /// Requested span start/end, for the data-availability check.
    pub requested_start: Option<chrono::NaiveDate>,
    /// Requested span end, for the data-availability check.
    pub requested_end: Option<chrono::NaiveDate>,
    /// Service filters applied, for the Scope section.
    pub services: &'a [String],
    /// Region filters applied, for the Scope section.
    pub regions: &'a [String],
    /// Account filters applied, for the Scope section.
    pub accounts: &'a [String],
}

impl Default for FormatterInput<'_> {
    fn default() -> Self {
        Self {
            intent: Intent::Other,
            explanation: "",
            explanation_request: false,
            insights: &[],
            charts: &[],
            period_description: None,
            requested_start: None,
            requested_end: None,
            services: &[],
            regions: &[],
            accounts: &[],
        }
    }
}

const COST_COLUMNS: &[&str] = &["cost_usd", "total_cost_usd", "total_cost", "cost", "unblended_cost"];
const DATE_COLUMNS: &[&str] = &["date", "month", "period", "usage_date"];

fn cost_of(row: &Row) -> f64 {
    COST_COLUMNS.iter().find_map(|c| row.get(*c)).map(|v| v.as_f64()).unwrap_or(0.0)
}

fn dimension_of(row: &Row) -> Option<String> {
    let excluded: Vec<&str> = COST_COLUMNS.iter().chain(DATE_COLUMNS).chain(["pct_of_total", "rank"].iter()).copied().collect();
    row.keys().find(|k| !excluded.contains(&k.as_str())).map(|k| row[k].display())
}

fn add_section(out: &mut Vec<String>, title: &str, content: &str) {
    if content.trim().is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push(String::new());
    }
    out.push(format!("**{title}:**"));
    out.push(String::new());
    out.extend(content.trim_end().lines().map(str::to_string));
}

fn fmt_money(v: f64) -> String {
    if v < 0.0 {
        format!("$({:.2})", -v)
    } else {
        format!("${v:.2}")
    }
}

fn fmt_money_grouped(v: f64) -> String {
    let sign = if v < 0.0 { "-" } else { "" };
    let abs = v.abs();
    let whole = abs.trunc() as i64;
    let frac = ((abs - abs.trunc()) * 100.0).round() as i64;
    let mut digits = whole.to_string();
    let mut grouped = String::new();
    while digits.len() > 3 {
        let split_at = digits.len() - 3;
        grouped = format!(",{}{grouped}", &digits[split_at..]);
        digits.truncate(split_at);
    }
    format!("{sign}${digits}{grouped}.{frac:02}")
}

/// Builds the final markdown narrative plus re-parsed structured fields
/// for a single `QueryResult`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseFormatter;

impl ResponseFormatter {
    /// Construct a formatter. Stateless; exists for call-site symmetry
    /// with `ChartRecommender`/`ChartBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Build the markdown message, a derived `summary`, generated
    /// `insights`/`recommendations`, and the raw/clickable next-step
    /// suggestions for a successful, non-empty result.
    pub fn build(&self, input: &FormatterInput<'_>, result: &QueryResult) -> (String, Vec<Insight>, Vec<Recommendation>, Vec<String>) {
        let rows = &result.data;
        let total_cost = result.total_cost();
        let count = rows.len();

        let mut sections = Vec::new();

        let summary = self.summary(input, rows, total_cost, count);
        add_section(&mut sections, "Summary", &summary);

        if let Some(warning) = self.data_availability_warning(input, rows) {
            add_section(&mut sections, "Data availability", &warning);
        }

        let insights_text = self.insights(input, rows, total_cost);
        add_section(&mut sections, "Insights", &insights_text);

        let results_text = self.results(input, rows, total_cost, count);
        add_section(&mut sections, "Results", &results_text);

        if input.explanation_request {
            if let Some(methodology) = self.methodology(input, rows) {
                add_section(&mut sections, "Methodology", &methodology);
            }
        }

        let scope_text = self.scope(input);
        add_section(&mut sections, "Scope", &scope_text);

        let (next_steps_text, next_steps_raw) = self.next_steps(input, rows);
        add_section(&mut sections, "Next steps", &next_steps_text);

        let mut narrative = if !input.explanation.trim().is_empty() {
            substitute_placeholders(input.explanation, rows, total_cost)
        } else {
            String::new()
        };

        if narrative.trim().is_empty() {
            narrative = sections.join("\n");
        } else if narrative.len() < 100 {
            narrative.push_str("\n\n");
            narrative.push_str(&sections.join("\n"));
        }

        let (parsed_summary, parsed_insights, parsed_recommendations) = parse_structured(&narrative);

        let insights = if parsed_insights.is_empty() {
            vec![Insight {
                category: "summary".to_string(),
                description: if parsed_summary.is_empty() { summary.clone() } else { parsed_summary.clone() },
            }]
        } else {
            parsed_insights
        };

        (narrative, insights, parsed_recommendations, next_steps_raw)
    }

    /// Build the "no data" narrative for an empty-but-successful result.
    pub fn build_no_data(&self, input: &FormatterInput<'_>) -> String {
        let mut sections = Vec::new();
        add_section(&mut sections, "Summary", "No significant data found for your query.");

        let mut scope_lines = vec![format!("- Period: {}", input.period_description.unwrap_or("specified period"))];
        if !input.services.is_empty() {
            scope_lines.push(format!("- Services: {}", input.services.join(", ")));
        }
        add_section(&mut sections, "Scope", &scope_lines.join("\n"));
        add_section(&mut sections, "Results", "_No cost data matches your criteria._");

        let suggestions = [
            "**Widen time range**: Try expanding to a longer period (e.g., last 30 days, last quarter)",
            "**Check filters**: Verify service names, regions, or tags are correct",
        ];
        add_section(&mut sections, "Next steps", &suggestions.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n"));

        sections.join("\n")
    }

    /// Classify a data-source error string into one of four canned
    /// clarification sets, per §4.11/§4.12's error-path branching.
    pub fn clarify_error(&self, error: &str) -> Vec<String> {
        if error.contains("COLUMN_NOT_FOUND") || error.contains("cannot be resolved") {
            vec![
                "The query tried to use a column that doesn't exist in the data. This might be too complex for automatic generation.".to_string(),
                "Try simplifying your request (e.g., 'Show EC2 costs by instance type' instead of 'Compare Linux vs Windows').".to_string(),
            ]
        } else if error.contains("SYNTAX_ERROR") || error.contains("mismatched input") {
            vec![
                "The generated query has a syntax error. Please rephrase your question more simply.".to_string(),
                "Example: 'Show me EC2 costs for October 2025 by region'".to_string(),
            ]
        } else if error.contains("PERMISSION") || error.contains("not authorized") {
            vec!["Access to the requested data may be restricted. Try a simpler cost breakdown query.".to_string()]
        } else {
            vec![
                "I couldn't complete your request reliably. Please rephrase or specify a time period.".to_string(),
                "Example: 'Show me my top 5 AWS services by cost for November 2025'".to_string(),
            ]
        }
    }

    fn summary(&self, input: &FormatterInput<'_>, rows: &[Row], total_cost: f64, count: usize) -> String {
        if rows.is_empty() {
            return String::new();
        }
        match input.intent {
            Intent::TopNRanking => {
                let leader = dimension_of(&rows[0]).unwrap_or_else(|| "the leading item".to_string());
                let leader_cost = cost_of(&rows[0]);
                let pct = if total_cost > 0.0 { leader_cost / total_cost * 100.0 } else { 0.0 };
                format!(
                    "Your top {count} cost drivers total {}, with **{leader}** leading at {} ({pct:.1}%).",
                    fmt_money_grouped(total_cost),
                    fmt_money_grouped(leader_cost)
                )
            }
            Intent::CostBreakdown => {
                format!("Breakdown across **{count}** items totals {}.", fmt_money_grouped(total_cost))
            }
            Intent::AnomalyAnalysis => {
                let anomalies: Vec<&Row> = rows.iter().filter(|r| r.get("z_score").map(|v| v.as_f64().abs() > 2.0).unwrap_or(false)).collect();
                if anomalies.is_empty() {
                    "No significant anomalies detected in this period.".to_string()
                } else {
                    let largest = anomalies.iter().max_by(|a, b| a.get("delta").map(|v| v.as_f64().abs()).unwrap_or(0.0).total_cmp(&b.get("delta").map(|v| v.as_f64().abs()).unwrap_or(0.0))).unwrap();
                    let delta = largest.get("delta").map(|v| v.as_f64()).unwrap_or(0.0);
                    format!("Detected **{}** anomalies with |z-score| > 2, the largest a {} deviation.", anomalies.len(), fmt_money_grouped(delta.abs()))
                }
            }
            Intent::CostTrend => {
                if rows.len() >= 2 {
                    let first = cost_of(&rows[0]);
                    let last = cost_of(&rows[rows.len() - 1]);
                    let direction = if last > first { "increased" } else if last < first { "decreased" } else { "remained stable" };
                    format!("Costs {direction} from {} to {} across {count} periods.", fmt_money_grouped(first), fmt_money_grouped(last))
                } else {
                    format!("Analyzed {count} time period(s) totaling {}.", fmt_money_grouped(total_cost))
                }
            }
            Intent::Comparative => {
                if let (Some(current), Some(previous)) = (rows[0].get("current_period_cost"), rows[0].get("previous_period_cost")) {
                    let (current, previous) = (current.as_f64(), previous.as_f64());
                    let change = current - previous;
                    let pct = if previous != 0.0 { change / previous.abs() * 100.0 } else { 0.0 };
                    let direction = if change > 0.0 { "up" } else if change < 0.0 { "down" } else { "flat" };
                    format!(
                        "Current period {} vs previous {}: {direction} {} ({pct:.1}%).",
                        fmt_money_grouped(current),
                        fmt_money_grouped(previous),
                        fmt_money_grouped(change.abs())
                    )
                } else {
                    format!("Comparison across {count} rows totaling {}.", fmt_money_grouped(total_cost))
                }
            }
            Intent::Optimization => {
                let savings_field = ["est_savings_30pct", "est_savings", "savings_usd", "potential_savings"].iter().find(|f| rows[0].contains_key(**f));
                if let Some(field) = savings_field {
                    let total_savings: f64 = rows.iter().map(|r| r.get(*field).map(|v| v.as_f64()).unwrap_or(0.0)).sum();
                    let top = dimension_of(&rows[0]).unwrap_or_else(|| "the leading opportunity".to_string());
                    format!("Identified {} in potential savings, led by **{top}**.", fmt_money_grouped(total_savings))
                } else {
                    format!("Analyzed {count} optimization candidates totaling {}.", fmt_money_grouped(total_cost))
                }
            }
            _ => format!("Retrieved **{count}** results totaling {}.", fmt_money_grouped(total_cost)),
        }
    }

    fn data_availability_warning(&self, input: &FormatterInput<'_>, rows: &[Row]) -> Option<String> {
        let (req_start, req_end) = (input.requested_start?, input.requested_end?);
        let requested_days = (req_end - req_start).num_days() + 1;

        let mut observed_dates: Vec<chrono::NaiveDate> = Vec::new();
        for row in rows {
            for col in DATE_COLUMNS {
                if let Some(v) = row.get(*col) {
                    let text = v.display();
                    if let Ok(d) = chrono::NaiveDate::parse_from_str(&text[..text.len().min(10)], "%Y-%m-%d") {
                        observed_dates.push(d);
                    }
                }
            }
        }
        if observed_dates.is_empty() {
            return None;
        }
        let min = *observed_dates.iter().min().unwrap();
        let max = *observed_dates.iter().max().unwrap();
        let covered_days = (max - min).num_days() + 1;
        let coverage_ratio = covered_days as f64 / requested_days.max(1) as f64;
        let days_missing_start = (min - req_start).num_days();

        let low_coverage = coverage_ratio < 0.3 && requested_days > 7;
        let late_start = days_missing_start > 7 && requested_days > 14;

        if low_coverage || late_start {
            Some(format!(
                "Data covers **{min}** to **{max}**, which is narrower than the requested **{req_start}** to **{req_end}** window. Results may be incomplete for recently ingested dates."
            ))
        } else {
            None
        }
    }

    fn insights(&self, input: &FormatterInput<'_>, rows: &[Row], total_cost: f64) -> String {
        if !input.insights.is_empty() {
            return input
                .insights
                .iter()
                .take(6)
                .map(|s| format!("- {}", s.trim_start_matches(['-', '•']).trim()))
                .collect::<Vec<_>>()
                .join("\n");
        }
        if rows.is_empty() {
            return String::new();
        }

        let mut insights = Vec::new();
        match input.intent {
            Intent::TopNRanking => {
                if rows.len() >= 2 {
                    let top2: f64 = rows.iter().take(2).map(cost_of).sum();
                    let pct = if total_cost > 0.0 { top2 / total_cost * 100.0 } else { 0.0 };
                    insights.push(format!("**High concentration**: Top 2 items account for **{pct:.1}%** of total costs"));
                }
                if let Some(driver) = dimension_of(&rows[0]) {
                    insights.push(format!("**Leading driver**: **{driver}** is the primary cost contributor"));
                }
            }
            Intent::CostBreakdown => {
                let avg = total_cost / rows.len() as f64;
                let outliers = rows.iter().filter(|r| cost_of(r) > avg * 2.0).count();
                if outliers > 0 {
                    insights.push(format!("**Cost outliers**: {outliers} categories significantly above average"));
                }
            }
            Intent::CostTrend => {
                if rows.len() >= 2 {
                    let costs: Vec<f64> = rows.iter().map(cost_of).collect();
                    let deltas: Vec<f64> = costs.windows(2).filter(|w| w[0] > 0.0).map(|w| (w[1] - w[0]) / w[0] * 100.0).collect();
                    let avg_growth = if deltas.is_empty() { 0.0 } else { deltas.iter().sum::<f64>() / deltas.len() as f64 };
                    if avg_growth > 10.0 {
                        insights.push(format!("**Rapid growth**: Average period-over-period growth of **{avg_growth:.1}%** requires attention"));
                    } else if avg_growth < -10.0 {
                        insights.push(format!("**Cost reduction**: Costs declining at **{:.1}%** per period", avg_growth.abs()));
                    } else {
                        insights.push(format!("**Stable trend**: Costs relatively stable with **{:.1}%** average change", avg_growth.abs()));
                    }
                }
            }
            Intent::AnomalyAnalysis => {
                let anomalies: Vec<&Row> = rows.iter().filter(|r| r.get("z_score").map(|v| v.as_f64().abs() > 2.0).unwrap_or(false)).collect();
                if !anomalies.is_empty() {
                    insights.push(format!("**Anomalies detected**: {} significant deviations from expected patterns", anomalies.len()));
                }
            }
            _ => {}
        }
        if insights.is_empty() {
            insights.push(format!("**Total scope**: {} across {} items", fmt_money_grouped(total_cost), rows.len()));
        }
        insights.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n")
    }

    fn results(&self, input: &FormatterInput<'_>, rows: &[Row], total_cost: f64, count: usize) -> String {
        if rows.is_empty() {
            return "_No data available_".to_string();
        }

        if input.intent == Intent::CostBreakdown && count <= 20 {
            return self.breakdown_table(rows, total_cost, count);
        }

        if !input.charts.is_empty() {
            return match input.intent {
                Intent::CostTrend => format!("Analyzed **{count} time periods** showing cost trends over time. See charts above for visualization."),
                _ => format!("Retrieved **{count} results** totaling **{}**. See charts above for detailed visualization.", fmt_money_grouped(total_cost)),
            };
        }

        self.table(rows)
    }

    fn breakdown_table(&self, rows: &[Row], total_cost: f64, count: usize) -> String {
        let mut lines = vec![format!("Analysis shows **{count} items** with total costs of **{}**.\n", fmt_money_grouped(total_cost))];
        lines.push("| Rank | Item | Cost (USD) | % of Total |".to_string());
        lines.push("|---:|---|---:|---:|".to_string());
        for (i, row) in rows.iter().take(20).enumerate() {
            let dim = dimension_of(row).unwrap_or_else(|| "Unknown".to_string());
            let dim = if dim.len() > 50 { format!("{}...", &dim[..47]) } else { dim };
            let cost = cost_of(row);
            let pct = row.get("pct_of_total").map(|v| v.as_f64()).unwrap_or_else(|| if total_cost > 0.0 { cost / total_cost * 100.0 } else { 0.0 });
            lines.push(format!("| {} | {dim} | {} | {pct:.1}% |", i + 1, fmt_money(cost)));
        }
        if count > 20 {
            lines.push(format!("\n_Showing top 20 of {count} results_"));
        }
        lines.join("\n")
    }

    fn table(&self, rows: &[Row]) -> String {
        let mut columns: Vec<&String> = rows[0].keys().collect();
        columns.sort();
        let header = format!("| {} |", columns.iter().map(|c| format_column_name(c)).collect::<Vec<_>>().join(" | "));
        let separator = format!("| {} |", columns.iter().map(|_| "---").collect::<Vec<_>>().join(" | "));
        let mut lines = vec![header, separator];
        for row in rows.iter().take(6) {
            let cells: Vec<String> = columns.iter().map(|c| row.get(*c).map(format_cell_value(c)).unwrap_or_else(|| "-".to_string())).collect();
            lines.push(format!("| {} |", cells.join(" | ")));
        }
        lines.join("\n")
    }

    fn methodology(&self, input: &FormatterInput<'_>, rows: &[Row]) -> Option<String> {
        let mut lines = Vec::new();
        if let Some(period) = input.period_description {
            lines.push(format!("I aggregated spend for **{period}** and grouped it by the requested dimension."));
        } else {
            lines.push("I aggregated spend and grouped it by the requested dimension.".to_string());
        }
        lines.push("Costs reflect net spend, using Savings Plan or Reservation effective cost when available, and falling back to unblended cost otherwise.".to_string());

        let top3: Vec<String> = rows
            .iter()
            .take(3)
            .filter_map(|row| {
                let label = dimension_of(row)?;
                let cost = cost_of(row);
                Some(format!("- **{label}**: {}", fmt_money_grouped(cost)))
            })
            .collect();
        if !top3.is_empty() {
            lines.push(format!("Top cost components:\n{}", top3.join("\n")));
        }
        Some(lines.join("\n"))
    }

    fn scope(&self, input: &FormatterInput<'_>) -> String {
        let mut lines = Vec::new();
        if let Some(period) = input.period_description {
            lines.push(format!("- Period: {period}"));
        }
        if !input.services.is_empty() {
            lines.push(format!("- Services: {}", input.services.join(", ")));
        }
        if !input.regions.is_empty() {
            lines.push(format!("- Regions: {}", input.regions.join(", ")));
        }
        if !input.accounts.is_empty() {
            lines.push(format!("- Accounts: {}", input.accounts.join(", ")));
        }
        lines.join("\n")
    }

    fn next_steps(&self, input: &FormatterInput<'_>, rows: &[Row]) -> (String, Vec<String>) {
        let mut steps = Vec::new();
        match input.intent {
            Intent::TopNRanking => {
                if let Some(top) = rows.first().and_then(dimension_of) {
                    steps.push(format!("Drill down into {top} to identify specific cost drivers by region or account"));
                }
                steps.push("Compare with previous period to identify growth trends".to_string());
            }
            Intent::CostBreakdown => {
                steps.push("Investigate top cost categories for optimization opportunities".to_string());
                if input.regions.is_empty() {
                    steps.push("Add regional breakdown to identify geographic cost patterns".to_string());
                }
            }
            Intent::AnomalyAnalysis => {
                let has_anomalies = rows.iter().any(|r| r.get("z_score").map(|v| v.as_f64().abs() > 2.0).unwrap_or(false));
                if has_anomalies {
                    steps.push("Investigate root causes for detected anomalies with detailed logs".to_string());
                    steps.push("Set up alerts to catch similar patterns in the future".to_string());
                } else {
                    steps.push("Expand time window to 30+ days for more comprehensive anomaly detection".to_string());
                }
            }
            Intent::CostTrend => {
                steps.push("Forecast future costs based on observed trends".to_string());
                steps.push("Identify correlation with business metrics or usage patterns".to_string());
            }
            Intent::Optimization => {
                steps.push("Implement top recommendations and track savings realization".to_string());
                steps.push("Schedule monthly reviews to identify new optimization opportunities".to_string());
            }
            _ => {}
        }
        if steps.is_empty() {
            steps.push("Set up regular monitoring to track cost changes over time".to_string());
            steps.push("Consider enabling AWS Cost Anomaly Detection for automated alerts".to_string());
        }
        steps.truncate(2);
        if steps.is_empty() {
            return (String::new(), Vec::new());
        }
        let formatted = steps.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n");
        let raw = steps.iter().map(|s| s.replace("**", "")).collect();
        (formatted, raw)
    }
}

fn format_column_name(col: &str) -> String {
    col.split('_')
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_cell_value(col: &str) -> impl Fn(&finops_core::CellValue) -> String + '_ {
    move |value| {
        let lower = col.to_lowercase();
        if lower.contains("cost") || lower.contains("amount") || lower.contains("saving") {
            return fmt_money(value.as_f64());
        }
        if lower.contains("pct") || lower.contains("percent") {
            return format!("{:.1}%", value.as_f64());
        }
        value.display()
    }
}

static VAR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{\{?(\w+)\}?\}").unwrap());

fn substitute_placeholders(explanation: &str, rows: &[Row], total_cost: f64) -> String {
    if rows.is_empty() {
        return explanation.to_string();
    }

    let mut ranked: Vec<(String, f64)> = rows.iter().filter_map(|r| dimension_of(r).map(|d| (d, cost_of(r)))).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let top = |n: usize| -> f64 { ranked.iter().take(n).map(|(_, c)| *c).sum() };
    let pct = |n: usize| -> f64 { if total_cost > 0.0 { top(n) / total_cost * 100.0 } else { 0.0 } };

    let mut values: HashMap<&str, String> = HashMap::new();
    values.insert("TotalCost", fmt_money_grouped(total_cost));
    values.insert("NumItems", rows.len().to_string());
    values.insert("TopItem", ranked.first().map(|(d, _)| d.clone()).unwrap_or_else(|| "N/A".to_string()));
    values.insert("TopCost", fmt_money_grouped(ranked.first().map(|(_, c)| *c).unwrap_or(0.0)));
    values.insert("TopPct", format!("{:.0}%", pct(1)));
    values.insert("Top2Pct", format!("{:.0}%", pct(2)));
    values.insert("Top3Pct", format!("{:.0}%", pct(3)));
    values.insert("Top5Pct", format!("{:.0}%", pct(5)));
    for i in 0..3 {
        let key = match i {
            0 => "Item1",
            1 => "Item2",
            _ => "Item3",
        };
        values.insert(key, ranked.get(i).map(|(d, _)| d.clone()).unwrap_or_else(|| "N/A".to_string()));
    }

    if rows.len() == 2 {
        let has_date = DATE_COLUMNS.iter().any(|c| rows[0].contains_key(*c));
        if has_date {
            let p1 = cost_of(&rows[0]);
            let p2 = cost_of(&rows[1]);
            let diff_pct = if p1 > 0.0 { (p2 - p1) / p1 * 100.0 } else { 0.0 };
            let trend = if diff_pct > 0.0 { "increased" } else if diff_pct < 0.0 { "decreased" } else { "remained stable" };
            values.insert("Difference", format!("{:.1}", diff_pct.abs()));
            values.insert("TrendDirection", trend.to_string());
            values.insert("Period1Cost", fmt_money_grouped(p1));
            values.insert("Period2Cost", fmt_money_grouped(p2));
        }
    }

    let mut result = String::with_capacity(explanation.len());
    let mut last_end = 0;
    for caps in VAR_TOKEN.captures_iter(explanation) {
        let m = caps.get(0).unwrap();
        result.push_str(&explanation[last_end..m.start()]);
        let name = &caps[1];
        result.push_str(values.get(name).map(String::as_str).unwrap_or("N/A"));
        last_end = m.end();
    }
    result.push_str(&explanation[last_end..]);
    result
}

fn parse_structured(markdown: &str) -> (String, Vec<Insight>, Vec<Recommendation>) {
    let mut summary = String::new();
    let mut insights = Vec::new();
    let mut recommendations = Vec::new();

    let mut current: Option<String> = None;
    let mut buffer: Vec<&str> = Vec::new();

    let flush = |section: &Option<String>, buffer: &[&str], summary: &mut String, insights: &mut Vec<Insight>, recommendations: &mut Vec<Recommendation>| {
        let Some(section) = section else { return };
        let body = buffer.join("\n");
        match section.as_str() {
            "summary" => *summary = body.trim().to_string(),
            "insights" => {
                for line in body.lines() {
                    let trimmed = line.trim_start_matches(['-', '•']).trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    insights.push(Insight {
                        category: "insight".to_string(),
                        description: trimmed.trim_matches('*').to_string(),
                    });
                }
            }
            "next steps" => {
                for line in body.lines() {
                    let trimmed = line.trim_start_matches(['-', '•']).trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    recommendations.push(Recommendation {
                        action: trimmed.trim_matches('*').to_string(),
                        description: trimmed.to_string(),
                    });
                }
            }
            _ => {}
        }
    };

    for line in markdown.lines() {
        if let Some(title) = line.trim().strip_prefix("**").and_then(|s| s.strip_suffix(":**")) {
            flush(&current, &buffer, &mut summary, &mut insights, &mut recommendations);
            current = Some(title.to_lowercase());
            buffer.clear();
        } else {
            buffer.push(line);
        }
    }
    flush(&current, &buffer, &mut summary, &mut insights, &mut recommendations);

    (summary, insights, recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use finops_core::{CellValue, ResultMetadata};
    use std::collections::HashMap as StdHashMap;

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn result(rows: Vec<Row>) -> QueryResult {
        QueryResult::new(rows, ResultMetadata::default())
    }

    #[test]
    fn top_n_summary_computes_leader_percentage() {
        let rows = vec![
            row(&[("service", CellValue::String("EC2".into())), ("cost_usd", CellValue::Float(80.0))]),
            row(&[("service", CellValue::String("S3".into())), ("cost_usd", CellValue::Float(20.0))]),
        ];
        let res = result(rows);
        let input = FormatterInput { intent: Intent::TopNRanking, ..Default::default() };
        let (markdown, _, _, _) = ResponseFormatter::new().build(&input, &res);
        assert!(markdown.contains("EC2"));
        assert!(markdown.contains("80.0%") || markdown.contains("(80.0%)"));
    }

    #[test]
    fn breakdown_table_adds_rank_and_percentage_columns() {
        let rows = vec![
            row(&[("dimension_value", CellValue::String("EBS".into())), ("cost_usd", CellValue::Float(60.0))]),
            row(&[("dimension_value", CellValue::String("Snapshots".into())), ("cost_usd", CellValue::Float(40.0))]),
        ];
        let res = result(rows);
        let input = FormatterInput { intent: Intent::CostBreakdown, ..Default::default() };
        let (markdown, _, _, _) = ResponseFormatter::new().build(&input, &res);
        assert!(markdown.contains("| Rank |"));
        assert!(markdown.contains("EBS"));
    }

    #[test]
    fn placeholder_substitution_fills_total_cost_and_top_item() {
        let rows = vec![
            row(&[("service", CellValue::String("Lambda".into())), ("cost_usd", CellValue::Float(100.0))]),
            row(&[("service", CellValue::String("RDS".into())), ("cost_usd", CellValue::Float(50.0))]),
        ];
        let out = substitute_placeholders("Total was ${TotalCost}, led by ${TopItem} (${TopPct}).", &rows, 150.0);
        assert_eq!(out, "Total was $150.00, led by Lambda (67%).");
    }

    #[test]
    fn placeholder_substitution_handles_double_brace_form() {
        let rows = vec![row(&[("service", CellValue::String("Lambda".into())), ("cost_usd", CellValue::Float(100.0))])];
        let out = substitute_placeholders("Top item: ${{TopItem}}", &rows, 100.0);
        assert_eq!(out, "Top item: Lambda");
    }

    #[test]
    fn short_narrative_gets_synthesized_block_appended() {
        let rows = vec![row(&[("service", CellValue::String("EC2".into())), ("cost_usd", CellValue::Float(10.0))])];
        let res = result(rows);
        let input = FormatterInput { intent: Intent::Other, explanation: "ok", ..Default::default() };
        let (markdown, _, _, _) = ResponseFormatter::new().build(&input, &res);
        assert!(markdown.len() > 100);
        assert!(markdown.contains("**Summary:**"));
    }

    #[test]
    fn data_availability_warning_fires_on_low_coverage() {
        let rows = vec![row(&[("date", CellValue::String("2025-11-28".into())), ("cost_usd", CellValue::Float(5.0))])];
        let input = FormatterInput {
            intent: Intent::CostTrend,
            requested_start: chrono::NaiveDate::from_ymd_opt(2025, 11, 1),
            requested_end: chrono::NaiveDate::from_ymd_opt(2025, 11, 30),
            ..Default::default()
        };
        let warning = ResponseFormatter::new().data_availability_warning(&input, &rows);
        assert!(warning.is_some());
    }

    #[test]
    fn clarify_error_classifies_column_not_found() {
        let suggestions = ResponseFormatter::new().clarify_error("COLUMN_NOT_FOUND: line_item_foo cannot be resolved");
        assert!(suggestions[0].contains("column"));
    }

    #[test]
    fn clarify_error_falls_back_to_generic() {
        let suggestions = ResponseFormatter::new().clarify_error("connection reset by peer");
        assert!(suggestions[0].contains("rephrase"));
    }

    #[test]
    fn structured_parser_extracts_summary_and_insights() {
        let markdown = "**Summary:**\n\nAll good.\n\n**Insights:**\n\n- First insight\n- Second insight";
        let (summary, insights, _) = parse_structured(markdown);
        assert_eq!(summary, "All good.");
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].description, "First insight");
    }

    #[test]
    fn empty_result_has_no_dimension_or_cost() {
        let empty: StdHashMap<String, CellValue> = StdHashMap::new();
        assert_eq!(dimension_of(&empty), None);
        assert_eq!(cost_of(&empty), 0.0);
    }
}
