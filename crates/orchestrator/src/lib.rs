// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cross-source query coordination for the FinOps query engine:
//! [`QueryOrchestrator`] (defaults, ARN rescue, cross-source fallback),
//! [`AutoDrillDown`] (single-level usage-type auto-expansion), and the
//! supplemental [`DrillDownNavigator`] (per-service dimensional
//! hierarchies for interactive drill-down).

mod auto_drill_down;
mod drill_down;
mod orchestrator;

pub use auto_drill_down::AutoDrillDown;
pub use drill_down::{DimensionHierarchy, DrillDownNavigator, DrillLevel, DrillOptions, NavigationKind};
pub use orchestrator::QueryOrchestrator;
