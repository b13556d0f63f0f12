// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! [`ChartBuilder`]: turns a [`ChartSpec`] plus result rows into a
//! Chart.js-compatible render object (§4.10).

use std::collections::BTreeMap;

use finops_core::{ConversationContext, Row};
use serde_json::{json, Value};

use crate::types::{ChartSpec, ChartType};

/// Nine-color palette cycled across series/slices, carried verbatim from
/// the original `ChartDataBuilder.color_palette` (RGBA Chart.js strings).
const PALETTE: &[&str] = &[
    "rgba(102, 126, 234, 0.8)",
    "rgba(237, 100, 166, 0.8)",
    "rgba(255, 159, 64, 0.8)",
    "rgba(75, 192, 192, 0.8)",
    "rgba(153, 102, 255, 0.8)",
    "rgba(255, 99, 132, 0.8)",
    "rgba(54, 162, 235, 0.8)",
    "rgba(255, 206, 86, 0.8)",
    "rgba(231, 233, 237, 0.8)",
];

fn color(i: usize) -> &'static str {
    PALETTE[i % PALETTE.len()]
}

fn solid(color: &str) -> String {
    color.replace("0.8", "1.0")
}

fn cell_json(row: &Row, field: &str) -> Value {
    match row.get(field) {
        None | Some(finops_core::CellValue::Null) => Value::Null,
        Some(finops_core::CellValue::Int(i)) => json!(i),
        Some(finops_core::CellValue::Float(f)) => json!(f),
        Some(finops_core::CellValue::String(s)) => json!(s),
    }
}

fn cell_f64(row: &Row, field: &str) -> f64 {
    row.get(field).map(|v| v.as_f64()).unwrap_or(0.0)
}

fn cell_display(row: &Row, field: &str) -> String {
    row.get(field).map(|v| v.display()).unwrap_or_default()
}

/// Formats date/month/period labels as "April 2025" (first-of-month) or
/// "Apr 1, 2025", matching `_format_chart_label`. Non-date fields and
/// unparseable values pass through unchanged.
fn format_label(value: &str, field_name: &str) -> String {
    if !matches!(field_name, "date" | "month" | "period") || !value.contains('-') {
        return value.to_string();
    }
    let date_part = value.split_whitespace().next().unwrap_or(value);
    let parts: Vec<&str> = date_part.split('-').collect();
    if parts.len() != 3 {
        return value.to_string();
    }
    let (Ok(year), Ok(month), Ok(day)) = (parts[0].parse::<i32>(), parts[1].parse::<u32>(), parts[2].parse::<u32>()) else {
        return value.to_string();
    };
    const MONTHS: &[&str] = &["January", "February", "March", "April", "May", "June", "July", "August", "September", "October", "November", "December"];
    let Some(name) = MONTHS.get((month as usize).wrapping_sub(1)) else {
        return value.to_string();
    };
    if day == 1 {
        format!("{name} {year}")
    } else {
        let short = &name[..3.min(name.len())];
        format!("{short} {day}, {year}")
    }
}

/// Adds a null-valued buffer label before the first and after the last
/// point of a month-labeled single-series line, so Chart.js doesn't draw
/// the trend line flush against the canvas edge. Mirrors
/// `_add_chart_buffers`; only triggers when both endpoints parse as
/// "Month Year" labels produced by [`format_label`].
fn add_buffers(labels: Vec<String>, values: Vec<Option<f64>>, field_name: &str) -> (Vec<String>, Vec<Option<f64>>) {
    if labels.len() < 2 || !matches!(field_name, "date" | "month" | "period") {
        return (labels, values);
    }
    const MONTHS: &[&str] = &["January", "February", "March", "April", "May", "June", "July", "August", "September", "October", "November", "December"];
    let parse_month_year = |label: &str| -> Option<(i32, u32)> {
        let mut parts = label.rsplitn(2, ' ');
        let year: i32 = parts.next()?.parse().ok()?;
        let name = parts.next()?;
        let idx = MONTHS.iter().position(|m| *m == name)? as u32 + 1;
        Some((year, idx))
    };
    let Some((first_year, first_month)) = parse_month_year(&labels[0]) else {
        return (labels, values);
    };
    let Some((last_year, last_month)) = parse_month_year(labels.last().unwrap()) else {
        return (labels, values);
    };
    let prev = if first_month == 1 { (first_year - 1, 12) } else { (first_year, first_month - 1) };
    let next = if last_month == 12 { (last_year + 1, 1) } else { (last_year, last_month + 1) };
    let prev_label = format!("{} {}", MONTHS[(prev.1 - 1) as usize], prev.0);
    let next_label = format!("{} {}", MONTHS[(next.1 - 1) as usize], next.0);

    let mut out_labels = Vec::with_capacity(labels.len() + 2);
    out_labels.push(prev_label);
    out_labels.extend(labels);
    out_labels.push(next_label);

    let mut out_values = Vec::with_capacity(values.len() + 2);
    out_values.push(None);
    out_values.extend(values);
    out_values.push(None);

    (out_labels, out_values)
}

/// Whether `last_query_type` or the chart title indicate an explicit
/// breakdown query, per `_build_bar_chart`'s `is_breakdown_query` check:
/// an explicit `cost_breakdown` intent, or a title naming a non-service
/// breakdown dimension ("by usage"/"by operation", but not "service").
fn is_breakdown_query(conv_context: Option<&ConversationContext>, title: &str) -> bool {
    if let Some(ctx) = conv_context {
        if ctx.last_query_type.as_deref() == Some("cost_breakdown") {
            return true;
        }
    }
    let lower = title.to_lowercase();
    (lower.contains("by usage") || lower.contains("by operation")) && !lower.contains("service")
}

/// Transforms chart specs plus result rows into Chart.js-ready render
/// objects. `conv_context`, when supplied, is mutated with the
/// aggregation bookkeeping the formatter/next-query drill-down needs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChartBuilder;

impl ChartBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build_all(&self, specs: &[ChartSpec], rows: &[Row], conv_context: Option<&mut ConversationContext>) -> Vec<Value> {
        if specs.is_empty() || rows.is_empty() {
            tracing::warn!(has_specs = !specs.is_empty(), has_data = !rows.is_empty(), "no chart specs or data results provided");
            return Vec::new();
        }

        let mut conv_context = conv_context;
        let mut charts = Vec::with_capacity(specs.len());
        for (idx, spec) in specs.iter().enumerate() {
            let built = self.build_single(spec, rows, conv_context.as_deref_mut());
            tracing::info!(index = idx, title = %spec.title, "built chart");
            charts.push(built);
        }
        charts
    }

    fn build_single(&self, spec: &ChartSpec, rows: &[Row], conv_context: Option<&mut ConversationContext>) -> Value {
        let limit = spec.limit.unwrap_or(20);
        let is_time_series = matches!(spec.chart_type, ChartType::Line | ChartType::Area) && spec.series_field.is_none();
        let use_full_dataset = matches!(spec.chart_type, ChartType::Bar | ChartType::Column);
        let data: &[Row] = if is_time_series || use_full_dataset { rows } else { &rows[..rows.len().min(limit)] };

        match spec.chart_type {
            ChartType::Line | ChartType::Area => self.build_line(spec, data),
            ChartType::Bar | ChartType::Column => self.build_bar(spec, data, conv_context),
            ChartType::StackedBar => self.build_stacked_bar(spec, data),
            ChartType::ClusteredBar => self.build_clustered_bar(spec, data),
            ChartType::Pie => self.build_pie(spec, data),
            ChartType::Scatter => self.build_scatter(spec, data),
            ChartType::Heatmap => self.build_heatmap(spec, data),
        }
    }

    fn build_line(&self, spec: &ChartSpec, data: &[Row]) -> Value {
        let title_case = |s: &str| -> String {
            s.split('_')
                .map(|w| {
                    let mut c = w.chars();
                    match c.next() {
                        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        };

        if let Some(series_field) = &spec.series_field {
            let mut series_map: BTreeMap<String, (Vec<Value>, Vec<Value>)> = BTreeMap::new();
            let mut order: Vec<String> = Vec::new();
            for row in data {
                let (Some(x), Some(_y)) = (row.get(&spec.x_field), row.get(&spec.y_field)) else {
                    tracing::warn!(x_field = %spec.x_field, y_field = %spec.y_field, "missing chart field in row, skipping");
                    continue;
                };
                let _ = x;
                let series_name = cell_display(row, series_field);
                let series_name = if series_name.is_empty() { "Unknown".to_string() } else { series_name };
                let entry = series_map.entry(series_name.clone()).or_insert_with(|| {
                    order.push(series_name.clone());
                    (Vec::new(), Vec::new())
                });
                entry.0.push(cell_json(row, &spec.x_field));
                entry.1.push(cell_json(row, &spec.y_field));
            }
            let labels = series_map.values().next().map(|(x, _)| x.clone()).unwrap_or_default();
            let datasets: Vec<Value> = order
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let (_, y) = &series_map[name];
                    let c = color(i);
                    json!({
                        "label": name,
                        "data": y,
                        "borderColor": c,
                        "backgroundColor": if spec.chart_type == ChartType::Area { c.replace("0.8", "0.2") } else { "transparent".to_string() },
                        "fill": spec.chart_type == ChartType::Area,
                        "tension": 0.4,
                    })
                })
                .collect();
            json!({
                "type": "line",
                "title": spec.title,
                "data": { "labels": labels, "datasets": datasets },
                "options": {
                    "plugins": { "legend": { "display": true, "position": "top" }, "datalabels": { "display": false } },
                    "scales": { "y": { "beginAtZero": true, "title": { "display": true, "text": "Cost (USD)" } } },
                },
            })
        } else {
            let mut aggregated: BTreeMap<String, f64> = BTreeMap::new();
            let mut order: Vec<String> = Vec::new();
            for row in data {
                if !row.contains_key(&spec.x_field) || !row.contains_key(&spec.y_field) {
                    tracing::warn!(x_field = %spec.x_field, y_field = %spec.y_field, "missing chart field in row, skipping");
                    continue;
                }
                let label = format_label(&cell_display(row, &spec.x_field), &spec.x_field);
                let value = cell_f64(row, &spec.y_field);
                aggregated.entry(label.clone()).and_modify(|v| *v += value).or_insert_with(|| {
                    order.push(label.clone());
                    value
                });
            }
            let mut sorted: Vec<(String, f64)> = aggregated.into_iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            let labels: Vec<String> = sorted.iter().map(|(l, _)| l.clone()).collect();
            let values: Vec<Option<f64>> = sorted.iter().map(|(_, v)| Some(*v)).collect();
            tracing::info!(rows = data.len(), points = labels.len(), "aggregated single-series line chart");
            let (labels, values) = add_buffers(labels, values, &spec.x_field);

            let c = color(0);
            json!({
                "type": "line",
                "title": spec.title,
                "data": {
                    "labels": labels,
                    "datasets": [{
                        "label": title_case(&spec.y_field),
                        "data": values,
                        "borderColor": c,
                        "backgroundColor": if spec.chart_type == ChartType::Area { c.replace("0.8", "0.2") } else { "transparent".to_string() },
                        "fill": spec.chart_type == ChartType::Area,
                        "tension": 0.4,
                        "spanGaps": false,
                    }],
                },
                "options": {
                    "plugins": { "legend": { "display": false }, "datalabels": { "display": false } },
                    "scales": { "y": { "beginAtZero": true, "title": { "display": true, "text": "Cost (USD)" } } },
                },
            })
        }
    }

    fn build_bar(&self, spec: &ChartSpec, data: &[Row], conv_context: Option<&mut ConversationContext>) -> Value {
        let mut items: Vec<(String, f64)> = data.iter().map(|row| (cell_display(row, &spec.x_field), cell_f64(row, &spec.y_field))).collect();
        items.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let breakdown = is_breakdown_query(conv_context.as_deref(), &spec.title);
        let should_aggregate = !breakdown && items.len() > 5;

        let (labels, values) = if should_aggregate {
            let top5 = &items[..5];
            let others = &items[5..];
            let others_sum: f64 = others.iter().map(|(_, v)| v).sum();
            let others_count = others.len();

            if let Some(ctx) = conv_context {
                ctx.last_shown_top_items = top5.to_vec();
                ctx.last_hidden_items = others.to_vec();
                ctx.last_chart_aggregated = true;
                tracing::info!(hidden_count = others_count, "stored hidden items in conversation context for drill-down");
            }

            let mut labels: Vec<String> = top5.iter().map(|(l, _)| l.clone()).collect();
            let mut values: Vec<f64> = top5.iter().map(|(_, v)| *v).collect();
            labels.push(format!("Others ({others_count} items)"));
            values.push(others_sum);
            (labels, values)
        } else {
            if breakdown && items.len() > 15 {
                items.truncate(15);
            }
            if let Some(ctx) = conv_context {
                ctx.last_chart_aggregated = false;
                ctx.last_hidden_items = Vec::new();
                ctx.last_shown_top_items = items.clone();
            }
            (items.iter().map(|(l, _)| l.clone()).collect(), items.iter().map(|(_, v)| *v).collect())
        };

        let colors: Vec<String> = (0..values.len()).map(|i| color(i).to_string()).collect();
        let borders: Vec<String> = colors.iter().map(|c| solid(c)).collect();

        json!({
            "type": "bar",
            "title": spec.title,
            "data": {
                "labels": labels,
                "datasets": [{
                    "label": spec.y_field.replace('_', " "),
                    "data": values,
                    "backgroundColor": colors,
                    "borderColor": borders,
                    "borderWidth": 1,
                }],
            },
            "options": {
                "indexAxis": if spec.chart_type == ChartType::Column { "x" } else { "y" },
                "plugins": { "legend": { "display": false } },
            },
        })
    }

    fn build_stacked_bar(&self, spec: &ChartSpec, data: &[Row]) -> Value {
        let Some(series_field) = spec.series_field.as_ref().filter(|s| **s != spec.x_field) else {
            let mut fallback = spec.clone();
            fallback.chart_type = ChartType::Column;
            return self.build_bar(&fallback, data, None);
        };

        let mut categories: Vec<String> = Vec::new();
        let mut series_map: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        let mut series_order: Vec<String> = Vec::new();
        for row in data {
            let x_val = cell_display(row, &spec.x_field);
            if !categories.contains(&x_val) {
                categories.push(x_val.clone());
            }
            let series_val = cell_display(row, series_field);
            let series_val = if series_val.is_empty() { "Unknown".to_string() } else { series_val };
            if !series_map.contains_key(&series_val) {
                series_order.push(series_val.clone());
            }
            *series_map.entry(series_val).or_default().entry(x_val).or_insert(0.0) += cell_f64(row, &spec.y_field);
        }

        let datasets: Vec<Value> = series_order
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let per_cat = &series_map[name];
                let c = color(i);
                json!({
                    "label": name,
                    "data": categories.iter().map(|cat| per_cat.get(cat).copied().unwrap_or(0.0)).collect::<Vec<_>>(),
                    "backgroundColor": c,
                    "borderColor": solid(c),
                    "borderWidth": 1,
                })
            })
            .collect();

        json!({
            "type": "bar",
            "title": spec.title,
            "data": { "labels": categories, "datasets": datasets },
            "options": {
                "plugins": { "legend": { "display": true, "position": "top" } },
                "scales": { "x": { "stacked": true }, "y": { "stacked": true } },
            },
        })
    }

    fn build_clustered_bar(&self, spec: &ChartSpec, data: &[Row]) -> Value {
        if data.first().is_some_and(|r| r.contains_key("current_period_cost") && r.contains_key("previous_period_cost")) {
            tracing::info!("detected period-over-period comparison data, building comparison chart");
            return self.build_period_comparison(spec, data);
        }

        let Some(series_field) = &spec.series_field else {
            let mut fallback = spec.clone();
            fallback.chart_type = ChartType::Bar;
            return self.build_bar(&fallback, data, None);
        };

        let mut categories: Vec<String> = Vec::new();
        let mut series_map: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        let mut series_order: Vec<String> = Vec::new();
        for row in data {
            let x_val = cell_display(row, &spec.x_field);
            if !categories.contains(&x_val) {
                categories.push(x_val.clone());
            }
            let series_val = cell_display(row, series_field);
            let series_val = if series_val.is_empty() { "Unknown".to_string() } else { series_val };
            if !series_map.contains_key(&series_val) {
                series_order.push(series_val.clone());
            }
            *series_map.entry(series_val).or_default().entry(x_val).or_insert(0.0) += cell_f64(row, &spec.y_field);
        }

        let datasets: Vec<Value> = series_order
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let per_cat = &series_map[name];
                let c = color(i);
                json!({
                    "label": name,
                    "data": categories.iter().map(|cat| per_cat.get(cat).copied().unwrap_or(0.0)).collect::<Vec<_>>(),
                    "backgroundColor": c,
                    "borderColor": solid(c),
                    "borderWidth": 1,
                })
            })
            .collect();

        json!({
            "type": "bar",
            "title": spec.title,
            "data": { "labels": categories, "datasets": datasets },
            "options": { "plugins": { "legend": { "display": true, "position": "top" } } },
        })
    }

    fn build_period_comparison(&self, spec: &ChartSpec, data: &[Row]) -> Value {
        let mut services = Vec::with_capacity(data.len());
        let mut current_costs = Vec::with_capacity(data.len());
        let mut previous_costs = Vec::with_capacity(data.len());
        for row in data {
            services.push(cell_display(row, "service"));
            current_costs.push(cell_f64(row, "current_period_cost"));
            previous_costs.push(cell_f64(row, "previous_period_cost"));
        }
        let first = data.first();
        let current_label = format!(
            "Current Period ({} \u{2192} {})",
            first.map(|r| cell_display(r, "current_start_date")).unwrap_or_default(),
            first.map(|r| cell_display(r, "current_end_date")).unwrap_or_default()
        );
        let previous_label = format!(
            "Previous Period ({} \u{2192} {})",
            first.map(|r| cell_display(r, "previous_start_date")).unwrap_or_default(),
            first.map(|r| cell_display(r, "previous_end_date")).unwrap_or_default()
        );

        json!({
            "type": "bar",
            "title": spec.title,
            "data": {
                "labels": services,
                "datasets": [
                    { "label": current_label, "data": current_costs, "backgroundColor": "rgba(59, 130, 246, 0.8)", "borderColor": "rgb(59, 130, 246)", "borderWidth": 1 },
                    { "label": previous_label, "data": previous_costs, "backgroundColor": "rgba(156, 163, 175, 0.8)", "borderColor": "rgb(156, 163, 175)", "borderWidth": 1 },
                ],
            },
            "options": {
                "plugins": { "legend": { "display": true, "position": "top" } },
                "scales": {
                    "y": { "beginAtZero": true, "title": { "display": true, "text": "Cost (USD)" } },
                    "x": { "title": { "display": true, "text": "Service" } },
                },
            },
        })
    }

    fn build_pie(&self, spec: &ChartSpec, data: &[Row]) -> Value {
        let limited = &data[..data.len().min(10)];
        let labels: Vec<String> = limited.iter().map(|r| cell_display(r, &spec.x_field)).collect();
        let values: Vec<f64> = limited.iter().map(|r| cell_f64(r, &spec.y_field)).collect();
        let colors: Vec<String> = (0..labels.len()).map(|i| color(i).to_string()).collect();
        let borders: Vec<String> = colors.iter().map(|c| solid(c)).collect();

        json!({
            "type": "pie",
            "title": spec.title,
            "data": {
                "labels": labels,
                "datasets": [{ "data": values, "backgroundColor": colors, "borderColor": borders, "borderWidth": 2 }],
            },
            "options": {
                "plugins": { "legend": { "position": "right", "labels": { "boxWidth": 12, "padding": 8 } } },
                "layout": { "padding": 10 },
            },
        })
    }

    fn build_scatter(&self, spec: &ChartSpec, data: &[Row]) -> Value {
        let points: Vec<Value> = data.iter().map(|r| json!({ "x": cell_json(r, &spec.x_field), "y": cell_json(r, &spec.y_field) })).collect();
        let c = color(0);
        json!({
            "type": "scatter",
            "title": spec.title,
            "data": {
                "datasets": [{
                    "label": format!("{} vs {}", spec.y_field, spec.x_field),
                    "data": points,
                    "backgroundColor": c,
                    "borderColor": solid(c),
                    "pointRadius": 5,
                    "pointHoverRadius": 7,
                }],
            },
        })
    }

    fn build_heatmap(&self, spec: &ChartSpec, data: &[Row]) -> Value {
        let points: Vec<Value> = data.iter().map(|r| json!({ "x": cell_json(r, &spec.x_field), "y": cell_json(r, &spec.y_field), "v": cell_f64(r, &spec.y_field) })).collect();
        json!({
            "type": "heatmap",
            "title": spec.title,
            "data": { "datasets": [{ "label": spec.title, "data": points }] },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finops_core::CellValue;
    use std::collections::HashMap;

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<HashMap<_, _>>()
    }

    #[test]
    fn bar_chart_aggregates_top_5_plus_others() {
        let rows: Vec<Row> = (0..10)
            .map(|i| row(&[("service", CellValue::String(format!("svc{i}"))), ("cost_usd", CellValue::Float((10 - i) as f64 * 10.0))]))
            .collect();
        let spec = ChartSpec::new(ChartType::Column, "service", "cost_usd", "Top Services");
        let builder = ChartBuilder::new();
        let mut ctx = ConversationContext::default();
        let out = builder.build_single(&spec, &rows, Some(&mut ctx));
        let labels = out["data"]["labels"].as_array().unwrap();
        assert_eq!(labels.len(), 6);
        assert_eq!(labels[5], "Others (5 items)");
        assert!(ctx.last_chart_aggregated);
        assert_eq!(ctx.last_hidden_items.len(), 5);
        let others_value = out["data"]["datasets"][0]["data"][5].as_f64().unwrap();
        assert!((others_value - 150.0).abs() < 1e-9);
    }

    #[test]
    fn breakdown_query_keeps_up_to_15_items_unaggregated() {
        let rows: Vec<Row> = (0..10)
            .map(|i| row(&[("usage_type", CellValue::String(format!("ut{i}"))), ("cost_usd", CellValue::Float(i as f64))]))
            .collect();
        let spec = ChartSpec::new(ChartType::Column, "usage_type", "cost_usd", "EC2 breakdown by usage");
        let builder = ChartBuilder::new();
        let mut ctx = ConversationContext::default();
        let out = builder.build_single(&spec, &rows, Some(&mut ctx));
        let labels = out["data"]["labels"].as_array().unwrap();
        assert_eq!(labels.len(), 10);
        assert!(!ctx.last_chart_aggregated);
        assert!(ctx.last_hidden_items.is_empty());
    }

    #[test]
    fn pie_chart_limits_to_ten_slices() {
        let rows: Vec<Row> = (0..15)
            .map(|i| row(&[("service", CellValue::String(format!("svc{i}"))), ("cost_usd", CellValue::Float(i as f64))]))
            .collect();
        let spec = ChartSpec::new(ChartType::Pie, "service", "cost_usd", "Cost Share");
        let builder = ChartBuilder::new();
        let out = builder.build_single(&spec, &rows, None);
        assert_eq!(out["data"]["labels"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn single_series_line_aggregates_duplicate_x_values_and_adds_buffers() {
        let rows = vec![
            row(&[("month", CellValue::String("April 2025".into())), ("cost_usd", CellValue::Float(10.0))]),
            row(&[("month", CellValue::String("April 2025".into())), ("cost_usd", CellValue::Float(5.0))]),
            row(&[("month", CellValue::String("May 2025".into())), ("cost_usd", CellValue::Float(7.0))]),
        ];
        let spec = ChartSpec::new(ChartType::Line, "month", "cost_usd", "Monthly Cost");
        let builder = ChartBuilder::new();
        let out = builder.build_single(&spec, &rows, None);
        let labels = out["data"]["labels"].as_array().unwrap();
        // 2 real points + 2 buffer points.
        assert_eq!(labels.len(), 4);
        assert_eq!(labels[0], "March 2025");
        assert_eq!(labels[3], "June 2025");
        let values = out["data"]["datasets"][0]["data"].as_array().unwrap();
        assert!(values[0].is_null());
        assert_eq!(values[1].as_f64().unwrap(), 15.0);
    }

    #[test]
    fn scatter_chart_emits_raw_points() {
        let rows = vec![row(&[("usage", CellValue::Float(3.0)), ("cost_usd", CellValue::Float(9.0))])];
        let spec = ChartSpec::new(ChartType::Scatter, "usage", "cost_usd", "Usage vs Cost");
        let builder = ChartBuilder::new();
        let out = builder.build_single(&spec, &rows, None);
        let points = out["data"]["datasets"][0]["data"].as_array().unwrap();
        assert_eq!(points[0]["x"], 3.0);
        assert_eq!(points[0]["y"], 9.0);
    }

    #[test]
    fn period_comparison_rows_build_two_series() {
        let rows = vec![row(&[
            ("service", CellValue::String("EC2".into())),
            ("current_period_cost", CellValue::Float(100.0)),
            ("previous_period_cost", CellValue::Float(80.0)),
        ])];
        let spec = ChartSpec::new(ChartType::ClusteredBar, "service", "current_period_cost", "Comparison");
        let builder = ChartBuilder::new();
        let out = builder.build_single(&spec, &rows, None);
        assert_eq!(out["data"]["datasets"].as_array().unwrap().len(), 2);
    }
}
