// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Data sources for the FinOps query engine: Athena (primary) and Cost
//! Explorer (cross-source fallback), behind one [`DataSource`] trait.

mod cost_explorer;
mod driver;
mod source;
mod templates;

pub use cost_explorer::CostExplorerDataSource;
pub use driver::AthenaDriver;
pub use source::DataSource;
pub use templates::CurTemplates;
