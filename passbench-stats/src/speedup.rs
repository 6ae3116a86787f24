//! Speedup Aggregation
//!
//! A timing pair holds the two stage measurements of one run. Either side may
//! be absent (a tolerated failure in batch mode); the speedup of a pair is
//! only defined when both sides are present and the second stage is non-zero.
//! Undefined pairs are excluded from the pool, never zero-filled — a silent
//! zero would corrupt the median.

use crate::summary::median;

/// Stage-1/stage-2 timings of one run, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingPair {
    /// First-stage (pipeline) time.
    pub stage1: Option<f64>,
    /// Second-stage (transform) time.
    pub stage2: Option<f64>,
}

impl TimingPair {
    /// Speedup of stage 2 over stage 1, when defined.
    pub fn speedup(&self) -> Option<f64> {
        match (self.stage1, self.stage2) {
            (Some(s1), Some(s2)) if s2 != 0.0 => Some(s1 / s2),
            _ => None,
        }
    }
}

/// All defined per-run speedups, in run order.
pub fn speedups(pairs: &[TimingPair]) -> Vec<f64> {
    pairs.iter().filter_map(TimingPair::speedup).collect()
}

/// Median of the defined per-run speedups; `None` when no pair defines one.
pub fn median_speedup(pairs: &[TimingPair]) -> Option<f64> {
    let ratios = speedups(pairs);
    if ratios.is_empty() {
        None
    } else {
        Some(median(&ratios))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::compute_summary;

    fn pair(stage1: f64, stage2: f64) -> TimingPair {
        TimingPair {
            stage1: Some(stage1),
            stage2: Some(stage2),
        }
    }

    #[test]
    fn aggregates_a_repetition_set() {
        let pairs = vec![pair(10.0, 5.0), pair(8.0, 4.0)];

        let stage1: Vec<f64> = pairs.iter().filter_map(|p| p.stage1).collect();
        let stage2: Vec<f64> = pairs.iter().filter_map(|p| p.stage2).collect();

        assert!((compute_summary(&stage1).unwrap().mean - 9.0).abs() < 1e-12);
        assert!((compute_summary(&stage2).unwrap().mean - 4.5).abs() < 1e-12);
        assert!((median_speedup(&pairs).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn undefined_pairs_are_excluded_not_zeroed() {
        let pairs = vec![
            pair(10.0, 5.0),
            TimingPair {
                stage1: None,
                stage2: Some(3.0),
            },
            TimingPair {
                stage1: Some(6.0),
                stage2: None,
            },
            pair(4.0, 0.0),
        ];
        assert_eq!(speedups(&pairs), vec![2.0]);
        assert_eq!(median_speedup(&pairs), Some(2.0));
    }

    #[test]
    fn no_defined_speedups_means_no_median() {
        let pairs = vec![TimingPair {
            stage1: None,
            stage2: None,
        }];
        assert_eq!(median_speedup(&pairs), None);
    }
}
