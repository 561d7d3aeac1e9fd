#![warn(missing_docs)]
//! TOPCraft Statistics
//!
//! Summary statistics over repeated benchmark measurements:
//! - Central tendency (mean, median)
//! - Dispersion (sample standard deviation, min, max)
//! - Percentiles with linear interpolation

mod percentiles;
mod summary;

pub use percentiles::{Percentiles, compute_percentile, compute_percentiles};
pub use summary::{SummaryStatistics, compute_summary};
