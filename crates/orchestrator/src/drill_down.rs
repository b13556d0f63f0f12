// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! [`DrillDownNavigator`] (§4.8a): a supplemental, independently-invoked
//! OLAP-style dimensional hierarchy, distinct from the automatic
//! single-level drill in [`crate::auto_drill_down`]. Consumed directly
//! by callers that want interactive drill-down ("drill into compute
//! within EC2"), not by the automatic pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use finops_core::{Dimension, Intent, QueryResult, QuerySpec};
use finops_datasource::DataSource;

/// One step in a service's ordered dimension hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct DrillLevel {
    /// Position within the hierarchy, starting at 0.
    pub level: usize,
    /// The dimension grouped by at this level.
    pub dimension: Dimension,
    /// Human display name, e.g. "Instance Type".
    pub display_name: &'static str,
}

/// A fully resolved hierarchy for one service, plus its maximum depth.
#[derive(Debug, Clone)]
pub struct DimensionHierarchy {
    /// The service this hierarchy describes (e.g. `"EC2"`), or `"Default"`.
    pub service: String,
    /// Ordered levels from coarsest to finest.
    pub levels: Vec<DrillLevel>,
}

impl DimensionHierarchy {
    /// The deepest level index, i.e. `levels.len() - 1`.
    pub fn max_depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }
}

fn display_name(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Service => "Service",
        Dimension::Region => "Region",
        Dimension::Account => "Account",
        Dimension::UsageType => "Usage Type",
        Dimension::Operation => "Operation",
        Dimension::InstanceType => "Instance Type",
        Dimension::StorageClass => "Storage Class",
        Dimension::FunctionName => "Function Name",
        Dimension::DatabaseEngine => "Database Engine",
        Dimension::Arn => "ARN",
        Dimension::ResourceType => "Resource Type",
    }
}

fn hierarchy_for(service: &str) -> DimensionHierarchy {
    let dims: Vec<Dimension> = match service.to_uppercase().as_str() {
        "CLOUDWATCH" => vec![Dimension::Service, Dimension::UsageType, Dimension::Operation, Dimension::Region],
        "EC2" => vec![Dimension::Service, Dimension::InstanceType, Dimension::Operation, Dimension::Region],
        "S3" => vec![Dimension::Service, Dimension::StorageClass, Dimension::Operation, Dimension::Region],
        "LAMBDA" => vec![Dimension::Service, Dimension::FunctionName, Dimension::Region],
        "RDS" => vec![Dimension::Service, Dimension::DatabaseEngine, Dimension::InstanceType, Dimension::Region],
        _ => vec![Dimension::Service, Dimension::UsageType, Dimension::Operation, Dimension::Region],
    };
    let levels = dims
        .into_iter()
        .enumerate()
        .map(|(level, dimension)| DrillLevel { level, dimension, display_name: display_name(dimension) })
        .collect();
    DimensionHierarchy { service: service.to_string(), levels }
}

/// Alternative dimensions worth offering at a given depth, filtered to
/// exclude whatever is already part of the hierarchy prefix up to that
/// depth.
fn alternative_dimensions(hierarchy: &DimensionHierarchy, depth: usize) -> Vec<Dimension> {
    let candidates: &[Dimension] = match depth {
        1 => &[Dimension::Account, Dimension::Region, Dimension::UsageType],
        2 => &[Dimension::Region, Dimension::Operation],
        3 => &[Dimension::Account],
        _ => &[],
    };
    let already_used: Vec<Dimension> = hierarchy.levels.iter().take(depth + 1).map(|l| l.dimension).collect();
    candidates.iter().copied().filter(|d| !already_used.contains(d)).collect()
}

/// The next dimension to drill into, plus any same-depth alternatives.
#[derive(Debug, Clone)]
pub struct DrillOptions {
    /// The next dimension in the hierarchy, `None` at the leaf.
    pub next: Option<DrillLevel>,
    /// Other dimensions worth offering at the same depth.
    pub alternatives: Vec<Dimension>,
}

/// The result of executing one drill-down step: the re-fetched result
/// plus the updated path for further navigation.
pub struct DrillDownOutcome {
    /// The re-fetched result at the new dimension.
    pub result: QueryResult,
    /// Dimensions drilled through so far, including the new one.
    pub path: Vec<Dimension>,
    /// Options available from the new depth.
    pub next_options: DrillOptions,
}

/// Kind of navigation between two drill paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// The new path is a strict prefix of the old one (went coarser).
    RollUp,
    /// The old path is a strict prefix of the new one (went finer).
    DrillDown,
    /// Neither is a prefix of the other (sideways move).
    Pivot,
}

/// Exposes per-service dimensional hierarchies for interactive
/// drill-down, independent of the automatic single-level drill.
pub struct DrillDownNavigator {
    source: Arc<dyn DataSource>,
}

impl DrillDownNavigator {
    /// Build a navigator over the given data source.
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }

    /// The full dimension hierarchy for `service` (or the `Default`
    /// hierarchy if the service has no specific one).
    pub fn get_dimension_hierarchy(&self, service: &str) -> DimensionHierarchy {
        hierarchy_for(service)
    }

    /// The next dimension to drill into from `current_dimension` within
    /// `service`'s hierarchy, plus same-depth alternatives. Returns
    /// `None` for `next` at the hierarchy's leaf.
    pub fn get_drill_options(&self, service: &str, current_dimension: Dimension) -> DrillOptions {
        let hierarchy = hierarchy_for(service);
        let depth = hierarchy.levels.iter().position(|l| l.dimension == current_dimension).unwrap_or(0);
        let next = if depth < hierarchy.max_depth() { hierarchy.levels.get(depth + 1).cloned() } else { None };
        DrillOptions { next, alternatives: alternative_dimensions(&hierarchy, depth) }
    }

    /// Clone `spec` with `next_dimension` appended to its dimension
    /// list, re-run it through the same `DataSource` contract as
    /// everything else, and report the resulting path and next options.
    pub async fn execute_drill_down(&self, spec: &QuerySpec, service: &str, next_dimension: Dimension) -> DrillDownOutcome {
        let mut drill_spec = spec.clone();
        drill_spec.query_id = uuid::Uuid::new_v4();
        drill_spec.intent = Intent::CostBreakdown;
        if !drill_spec.dimensions.contains(&next_dimension) {
            drill_spec.dimensions.push(next_dimension);
        }

        let result = self.source.fetch(&drill_spec).await;
        let next_options = self.get_drill_options(service, next_dimension);

        DrillDownOutcome { result, path: drill_spec.dimensions, next_options }
    }

    /// Render a drilled-through path as a human-readable trail, e.g.
    /// `"Service > Instance Type > Operation"`. An empty path renders
    /// as `"All Services"`.
    pub fn build_breadcrumb_trail(path: &[Dimension]) -> String {
        if path.is_empty() {
            return "All Services".to_string();
        }
        path.iter().map(|d| display_name(*d)).collect::<Vec<_>>().join(" > ")
    }

    /// Classify a navigation from `start` to `target` as a roll-up,
    /// drill-down, or sideways pivot, based on the common path prefix.
    pub fn navigate_drill_path(start: &[Dimension], target: &[Dimension]) -> NavigationKind {
        let common = start.iter().zip(target.iter()).take_while(|(a, b)| a == b).count();
        if common == target.len() && target.len() < start.len() {
            NavigationKind::RollUp
        } else if common == start.len() && target.len() > start.len() {
            NavigationKind::DrillDown
        } else {
            NavigationKind::Pivot
        }
    }

    /// Up to 3 suggested next drill dimensions for `service`, based on
    /// which dimension in the current result has the most distinct
    /// values.
    pub fn suggest_drill_path(&self, service: &str, result: &QueryResult) -> Vec<Dimension> {
        let hierarchy = hierarchy_for(service);
        let mut distinct_counts: HashMap<Dimension, usize> = HashMap::new();

        for level in &hierarchy.levels {
            let column = level.dimension.column();
            let distinct: std::collections::HashSet<String> =
                result.data.iter().filter_map(|row| row.get(column)).map(|v| v.display()).collect();
            distinct_counts.insert(level.dimension, distinct.len());
        }

        let mut ranked: Vec<(Dimension, usize)> = distinct_counts.into_iter().filter(|(_, count)| *count > 1).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.into_iter().take(3).map(|(d, _)| d).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use finops_core::ResultMetadata;

    struct StubSource;

    #[async_trait]
    impl DataSource for StubSource {
        async fn fetch(&self, _spec: &QuerySpec) -> QueryResult {
            QueryResult::new(Vec::new(), ResultMetadata { data_source: "athena".to_string(), ..Default::default() })
        }
        fn name(&self) -> &str {
            "athena"
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    #[test]
    fn ec2_hierarchy_matches_expected_order() {
        let navigator = DrillDownNavigator::new(Arc::new(StubSource));
        let hierarchy = navigator.get_dimension_hierarchy("EC2");
        let dims: Vec<Dimension> = hierarchy.levels.iter().map(|l| l.dimension).collect();
        assert_eq!(dims, vec![Dimension::Service, Dimension::InstanceType, Dimension::Operation, Dimension::Region]);
    }

    #[test]
    fn unknown_service_falls_back_to_default_hierarchy() {
        let navigator = DrillDownNavigator::new(Arc::new(StubSource));
        let hierarchy = navigator.get_dimension_hierarchy("SomeObscureService");
        assert_eq!(hierarchy.levels[0].dimension, Dimension::Service);
        assert_eq!(hierarchy.levels[1].dimension, Dimension::UsageType);
    }

    #[test]
    fn get_drill_options_returns_none_at_leaf() {
        let navigator = DrillDownNavigator::new(Arc::new(StubSource));
        let options = navigator.get_drill_options("Lambda", Dimension::Region);
        assert!(options.next.is_none());
    }

    #[test]
    fn get_drill_options_returns_next_level_mid_hierarchy() {
        let navigator = DrillDownNavigator::new(Arc::new(StubSource));
        let options = navigator.get_drill_options("EC2", Dimension::Service);
        assert_eq!(options.next.unwrap().dimension, Dimension::InstanceType);
    }

    #[test]
    fn breadcrumb_trail_renders_empty_path_as_all_services() {
        assert_eq!(DrillDownNavigator::build_breadcrumb_trail(&[]), "All Services");
    }

    #[test]
    fn breadcrumb_trail_joins_display_names() {
        let path = vec![Dimension::Service, Dimension::InstanceType];
        assert_eq!(DrillDownNavigator::build_breadcrumb_trail(&path), "Service > Instance Type");
    }

    #[test]
    fn navigate_drill_path_classifies_roll_up_and_drill_down() {
        let full = vec![Dimension::Service, Dimension::InstanceType, Dimension::Region];
        let shallow = vec![Dimension::Service, Dimension::InstanceType];
        assert_eq!(DrillDownNavigator::navigate_drill_path(&full, &shallow), NavigationKind::RollUp);
        assert_eq!(DrillDownNavigator::navigate_drill_path(&shallow, &full), NavigationKind::DrillDown);
    }

    #[test]
    fn navigate_drill_path_classifies_pivot() {
        let a = vec![Dimension::Service, Dimension::Region];
        let b = vec![Dimension::Service, Dimension::Account];
        assert_eq!(DrillDownNavigator::navigate_drill_path(&a, &b), NavigationKind::Pivot);
    }

    #[tokio::test]
    async fn execute_drill_down_appends_dimension_and_reports_path() {
        let navigator = DrillDownNavigator::new(Arc::new(StubSource));
        let mut spec = QuerySpec::new(Intent::CostBreakdown);
        spec.dimensions = vec![Dimension::Service];

        let outcome = navigator.execute_drill_down(&spec, "EC2", Dimension::InstanceType).await;
        assert_eq!(outcome.path, vec![Dimension::Service, Dimension::InstanceType]);
        assert_eq!(outcome.next_options.next.unwrap().dimension, Dimension::Operation);
    }
}
