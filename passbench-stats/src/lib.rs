#![warn(missing_docs)]
//! Passbench Statistical Engine
//!
//! Summary statistics over repeated timing measurements:
//! - Central tendency (mean, median)
//! - Dispersion (sample standard deviation, only when it is defined)
//! - Extremes (min, max)
//! - Per-run speedup ratios and their median

mod speedup;
mod summary;

pub use speedup::{TimingPair, median_speedup, speedups};
pub use summary::{SummaryStatistics, compute_summary, median};
