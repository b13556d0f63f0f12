// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! The data source seam the orchestrator consumes from, implemented by
//! [`crate::driver::AthenaDriver`] and [`crate::cost_explorer::CostExplorerDataSource`].

use async_trait::async_trait;
use finops_core::{QueryResult, QuerySpec};

/// A pluggable backend that can answer a `QuerySpec` with a `QueryResult`.
///
/// Implementations never raise on query failure; a failed fetch is
/// represented as `QueryResult::failed(..)` so the orchestrator can
/// uniformly inspect `result.succeeded()` / `result.is_empty()` across
/// every source.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Execute `spec` and return a standardized result.
    async fn fetch(&self, spec: &QuerySpec) -> QueryResult;

    /// Name of this data source (`athena`, `cost_explorer`), used in
    /// logging, metrics labels, and `ResultMetadata.data_source`.
    fn name(&self) -> &str;

    /// Whether this data source is currently reachable.
    async fn health_check(&self) -> bool;
}
