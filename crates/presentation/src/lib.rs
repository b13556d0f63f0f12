// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Markdown narrative formatting (§4.11) and the single-call pipeline
//! entrypoint (§4.12) that wires time-range resolution, SQL generation,
//! orchestrated execution, auto-drill-down, charting, and formatting
//! into one `UnifiedResponse`.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

mod entrypoint;
mod formatter;

pub use entrypoint::Entrypoint;
pub use formatter::{FormatterInput, ResponseFormatter};
