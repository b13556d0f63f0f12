// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chart recommendation (§4.9) and Chart.js-shaped rendering (§4.10).

pub mod builder;
pub mod recommender;
pub mod types;

pub use builder::ChartBuilder;
pub use recommender::ChartRecommender;
pub use types::{ChartSpec, ChartType, DataStructure};
