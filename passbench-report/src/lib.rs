#![warn(missing_docs)]
//! Passbench Report
//!
//! Serializable report structures for benchmark runs plus JSON output and
//! display helpers. Human-readable formatting lives with the CLI; this crate
//! only owns the data shape.

mod json;
mod report;

pub use json::generate_json_report;
pub use report::{Report, ReportMeta, RunRecord, format_seconds};
