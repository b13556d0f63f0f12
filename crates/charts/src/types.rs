// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared chart types: the chart kinds `ChartRecommender` can choose from,
//! the spec it produces, and the column classification `ChartBuilder`
//! consumes to shape each one.

use serde::{Deserialize, Serialize};

/// A Chart.js-compatible chart kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Bar,
    Column,
    Line,
    Area,
    StackedBar,
    ClusteredBar,
    Heatmap,
    Scatter,
    Pie,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Column => "column",
            ChartType::Line => "line",
            ChartType::Area => "area",
            ChartType::StackedBar => "stacked_bar",
            ChartType::ClusteredBar => "clustered_bar",
            ChartType::Heatmap => "heatmap",
            ChartType::Scatter => "scatter",
            ChartType::Pie => "pie",
        }
    }
}

/// What `ChartRecommender` hands to `ChartBuilder`: which chart, which
/// fields drive its axes, and any presentation hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_type: ChartType,
    pub x_field: String,
    pub y_field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_field: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ChartSpec {
    pub fn new(chart_type: ChartType, x_field: impl Into<String>, y_field: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            chart_type,
            x_field: x_field.into(),
            y_field: y_field.into(),
            series_field: None,
            title: title.into(),
            limit: None,
            note: None,
        }
    }
}

/// Column classification used to infer axes for a chart spec. Columns
/// come from a `Row`, a `HashMap`, so unlike the pipeline this was
/// distilled from there is no stable source ordering; classification
/// falls back to alphabetical order, which only affects which of several
/// equally-suitable columns is picked first.
#[derive(Debug, Clone, Default)]
pub struct DataStructure {
    pub columns: Vec<String>,
    pub dimension_cols: Vec<String>,
    pub metric_cols: Vec<String>,
    pub time_cols: Vec<String>,
    pub is_period_comparison: bool,
    pub cardinality: usize,
    pub has_time_series: bool,
    pub has_multiple_series: bool,
}
