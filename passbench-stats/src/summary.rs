//! Summary Statistics
//!
//! Computed over whatever samples a measurement run yielded. The standard
//! deviation is a sample (n−1) estimate and is undefined below two samples;
//! it is reported as absent rather than zero so a single-run report cannot be
//! mistaken for a perfectly stable one.

use serde::{Deserialize, Serialize};

/// Summary of one sample pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Arithmetic mean.
    pub mean: f64,
    /// Median (midpoint average for even counts).
    pub median: f64,
    /// Sample standard deviation; absent with fewer than two samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
    /// Number of samples.
    pub sample_count: usize,
}

/// Median of `samples`; 0.0 for an empty slice.
pub fn median(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Compute summary statistics; `None` when there are no samples at all.
pub fn compute_summary(samples: &[f64]) -> Option<SummaryStatistics> {
    if samples.is_empty() {
        return None;
    }

    let mean = samples.iter().sum::<f64>() / samples.len() as f64;

    let std_dev = if samples.len() < 2 {
        None
    } else {
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
            / (samples.len() - 1) as f64;
        Some(variance.sqrt())
    };

    let min = samples
        .iter()
        .cloned()
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or(0.0);
    let max = samples
        .iter()
        .cloned()
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or(0.0);

    Some(SummaryStatistics {
        mean,
        median: median(samples),
        std_dev,
        min,
        max,
        sample_count: samples.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_summary() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let summary = compute_summary(&samples).unwrap();

        assert!((summary.mean - 3.0).abs() < 1e-12);
        assert!((summary.median - 3.0).abs() < 1e-12);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 5.0);
        assert_eq!(summary.sample_count, 5);
    }

    #[test]
    fn even_count_median_averages_the_middle_pair() {
        assert!((median(&[10.0, 5.0, 8.0, 4.0]) - 6.5).abs() < 1e-12);
    }

    #[test]
    fn std_dev_is_absent_below_two_samples() {
        let summary = compute_summary(&[42.0]).unwrap();
        assert!(summary.std_dev.is_none());
        assert_eq!(summary.sample_count, 1);
    }

    #[test]
    fn std_dev_uses_the_sample_estimator() {
        let summary = compute_summary(&[10.0, 5.0]).unwrap();
        // n-1 denominator: variance = ((2.5)^2 + (2.5)^2) / 1 = 12.5
        let expected = 12.5f64.sqrt();
        assert!((summary.std_dev.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn empty_samples_yield_no_summary() {
        assert!(compute_summary(&[]).is_none());
    }
}
