//! Report Data Structures

use chrono::{DateTime, Utc};
use passbench_stats::{SummaryStatistics, TimingPair, compute_summary, median_speedup};
use serde::{Deserialize, Serialize};

/// Timings of one completed driver run.
///
/// Batch mode records one of these per preprocessed configuration per
/// repetition; `config_index` ties the record back to its configuration.
/// An absent stage value marks a tolerated failure, not a zero measurement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunRecord {
    /// Index of the configuration this record belongs to.
    pub config_index: usize,
    /// Pass-pipeline stage time in seconds.
    pub stage1_seconds: Option<f64>,
    /// Transform stage time in seconds.
    pub stage2_seconds: Option<f64>,
}

impl RunRecord {
    fn timing_pair(&self) -> TimingPair {
        TimingPair {
            stage1: self.stage1_seconds,
            stage2: self.stage2_seconds,
        }
    }
}

/// Report metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Harness version.
    pub version: String,
    /// UTC time the report was generated.
    pub timestamp: DateTime<Utc>,
    /// Resolved stage-1 compiler path.
    pub opt_tool: String,
    /// Resolved stage-2 compiler path.
    pub transform_tool: String,
    /// Number of repetitions requested.
    pub repetitions: usize,
    /// Per-stage timeout bound in seconds.
    pub stage_timeout_secs: f64,
}

/// Complete benchmark report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Metadata for this run.
    pub meta: ReportMeta,
    /// Every recorded run, in execution order.
    pub records: Vec<RunRecord>,
    /// Pooled summary over all present stage-1 times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage1: Option<SummaryStatistics>,
    /// Pooled summary over all present stage-2 times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage2: Option<SummaryStatistics>,
    /// Median of the defined per-run speedup ratios.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median_speedup: Option<f64>,
}

impl Report {
    /// Assemble a report from collected records, pooling both stages across
    /// every record (batch configurations share one pool, as do repetitions).
    pub fn from_records(meta: ReportMeta, records: Vec<RunRecord>) -> Self {
        let stage1: Vec<f64> = records.iter().filter_map(|r| r.stage1_seconds).collect();
        let stage2: Vec<f64> = records.iter().filter_map(|r| r.stage2_seconds).collect();
        let pairs: Vec<TimingPair> = records.iter().map(RunRecord::timing_pair).collect();

        Report {
            meta,
            stage1: compute_summary(&stage1),
            stage2: compute_summary(&stage2),
            median_speedup: median_speedup(&pairs),
            records,
        }
    }
}

/// Format a seconds value for terminal display.
pub fn format_seconds(seconds: f64) -> String {
    if seconds == 0.0 {
        "0 s".to_string()
    } else if seconds.abs() < 1e-3 {
        format!("{:.2} µs", seconds * 1e6)
    } else if seconds.abs() < 1.0 {
        format!("{:.3} ms", seconds * 1e3)
    } else {
        format!("{:.3} s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ReportMeta {
        ReportMeta {
            version: "0.1.0".to_string(),
            timestamp: Utc::now(),
            opt_tool: "mlir-opt".to_string(),
            transform_tool: "mlir-transform-opt".to_string(),
            repetitions: 2,
            stage_timeout_secs: 15.0,
        }
    }

    fn record(index: usize, stage1: f64, stage2: f64) -> RunRecord {
        RunRecord {
            config_index: index,
            stage1_seconds: Some(stage1),
            stage2_seconds: Some(stage2),
        }
    }

    #[test]
    fn pools_records_across_configs_and_repetitions() {
        let report = Report::from_records(meta(), vec![record(0, 10.0, 5.0), record(1, 8.0, 4.0)]);

        assert!((report.stage1.as_ref().unwrap().mean - 9.0).abs() < 1e-12);
        assert!((report.stage2.as_ref().unwrap().mean - 4.5).abs() < 1e-12);
        assert_eq!(report.median_speedup, Some(2.0));
    }

    #[test]
    fn absent_samples_do_not_poison_the_pools() {
        let report = Report::from_records(
            meta(),
            vec![
                record(0, 10.0, 5.0),
                RunRecord {
                    config_index: 0,
                    stage1_seconds: Some(6.0),
                    stage2_seconds: None,
                },
            ],
        );

        assert_eq!(report.stage1.as_ref().unwrap().sample_count, 2);
        assert_eq!(report.stage2.as_ref().unwrap().sample_count, 1);
        assert_eq!(report.median_speedup, Some(2.0));
    }

    #[test]
    fn formats_seconds_across_magnitudes() {
        assert_eq!(format_seconds(0.0), "0 s");
        assert_eq!(format_seconds(4.2e-5), "42.00 µs");
        assert_eq!(format_seconds(0.0042), "4.200 ms");
        assert_eq!(format_seconds(1.5), "1.500 s");
    }
}
