//! Repetition Loop and Aggregation
//!
//! Runs every configuration through the driver N times, collecting one
//! timing record per configuration per repetition, then pools the records
//! into a report.
//!
//! Repetitions are strictly sequential: one compiler invocation runs to
//! completion (or timeout) before the next starts. Each driver run already
//! stages its artifacts under a unique temp directory, so a future parallel
//! mode only needs to lift this loop.

use crate::driver::{BenchConfig, Driver, DriverError, InjectionMode};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use passbench_report::{Report, ReportMeta, RunRecord, format_seconds};
use passbench_stats::SummaryStatistics;
use tracing::info;

/// Settings for one aggregation run.
#[derive(Debug, Clone, Copy)]
pub struct AggregateSettings {
    /// Number of repetitions over the configuration set.
    pub repetitions: usize,
    /// How the transform script reaches stage 2.
    pub mode: InjectionMode,
    /// Batch mode: tolerate absent stage-2 timings instead of failing.
    pub batch: bool,
}

/// Run `configs` through `driver` repeatedly and pool the results.
///
/// Outside batch mode any driver failure aborts the whole measurement —
/// silently dropping samples would corrupt the statistics.
pub fn repeat_and_aggregate(
    driver: &Driver,
    configs: &[BenchConfig],
    settings: AggregateSettings,
) -> Result<Report, DriverError> {
    let total = (settings.repetitions * configs.len()) as u64;
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut records = Vec::with_capacity(total as usize);
    for repetition in 0..settings.repetitions {
        for (config_index, config) in configs.iter().enumerate() {
            pb.set_message(format!(
                "rep {}/{} {}",
                repetition + 1,
                settings.repetitions,
                config.input.label()
            ));

            let outcome = driver.run_config(config, settings.mode, settings.batch)?;
            records.push(RunRecord {
                config_index,
                stage1_seconds: Some(outcome.stage1_seconds),
                stage2_seconds: outcome.stage2_seconds,
            });
            pb.inc(1);
        }
    }
    pb.finish_with_message("Complete");

    let meta = ReportMeta {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        opt_tool: driver.opt_tool().display().to_string(),
        transform_tool: driver.transform_tool().display().to_string(),
        repetitions: settings.repetitions,
        stage_timeout_secs: driver.stage_timeout().as_secs_f64(),
    };

    let report = Report::from_records(meta, records);
    if let Some(speedup) = report.median_speedup {
        info!(median_speedup = speedup, "aggregation complete");
    }
    Ok(report)
}

/// Format a report for human-readable terminal display.
pub fn format_human_output(report: &Report) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str("Passbench Results\n");
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");

    output.push_str(&format!(
        "  {} record(s), {} repetition(s), stage timeout {:.0} s\n",
        report.records.len(),
        report.meta.repetitions,
        report.meta.stage_timeout_secs
    ));
    output.push_str(&format!("  stage 1: {}\n", report.meta.opt_tool));
    output.push_str(&format!("  stage 2: {}\n\n", report.meta.transform_tool));

    push_stage_section(&mut output, "Stage 1 (pass pipeline)", &report.stage1);
    push_stage_section(&mut output, "Stage 2 (transform script)", &report.stage2);

    output.push_str("Speedup\n");
    output.push_str(&"-".repeat(60));
    output.push('\n');
    match report.median_speedup {
        Some(speedup) => output.push_str(&format!("  median: {:.2}x\n", speedup)),
        None => output.push_str("  no defined speedup samples\n"),
    }

    output
}

fn push_stage_section(output: &mut String, title: &str, stats: &Option<SummaryStatistics>) {
    output.push_str(title);
    output.push('\n');
    output.push_str(&"-".repeat(60));
    output.push('\n');

    match stats {
        Some(s) => {
            output.push_str(&format!(
                "  mean: {}  median: {}\n",
                format_seconds(s.mean),
                format_seconds(s.median)
            ));
            if let Some(std_dev) = s.std_dev {
                output.push_str(&format!("  stddev: {}\n", format_seconds(std_dev)));
            }
            output.push_str(&format!(
                "  min: {}  max: {}  samples: {}\n",
                format_seconds(s.min),
                format_seconds(s.max),
                s.sample_count
            ));
        }
        None => output.push_str("  no samples\n"),
    }
    output.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use passbench_report::{Report, ReportMeta, RunRecord};

    fn report(records: Vec<RunRecord>) -> Report {
        Report::from_records(
            ReportMeta {
                version: "0.1.0".to_string(),
                timestamp: Utc::now(),
                opt_tool: "mlir-opt".to_string(),
                transform_tool: "mlir-transform-opt".to_string(),
                repetitions: 2,
                stage_timeout_secs: 15.0,
            },
            records,
        )
    }

    #[test]
    fn human_output_reports_both_stages_and_speedup() {
        let report = report(vec![
            RunRecord {
                config_index: 0,
                stage1_seconds: Some(10.0),
                stage2_seconds: Some(5.0),
            },
            RunRecord {
                config_index: 0,
                stage1_seconds: Some(8.0),
                stage2_seconds: Some(4.0),
            },
        ]);
        let text = format_human_output(&report);

        assert!(text.contains("Stage 1 (pass pipeline)"));
        assert!(text.contains("Stage 2 (transform script)"));
        assert!(text.contains("mean: 9.000 s"));
        assert!(text.contains("mean: 4.500 s"));
        assert!(text.contains("median: 2.00x"));
    }

    #[test]
    fn single_sample_output_omits_stddev() {
        let report = report(vec![RunRecord {
            config_index: 0,
            stage1_seconds: Some(10.0),
            stage2_seconds: Some(5.0),
        }]);
        let text = format_human_output(&report);
        assert!(!text.contains("stddev"));
    }

    #[test]
    fn missing_stage2_samples_are_called_out() {
        let report = report(vec![RunRecord {
            config_index: 0,
            stage1_seconds: Some(10.0),
            stage2_seconds: None,
        }]);
        let text = format_human_output(&report);
        assert!(text.contains("no samples"));
        assert!(text.contains("no defined speedup samples"));
    }
}
