//! Percentile Computation

use serde::{Deserialize, Serialize};

/// Standard percentiles to compute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percentiles {
    /// 50th percentile (median)
    pub p50: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

/// Compute a single percentile from samples
///
/// Uses linear interpolation between nearest ranks.
///
/// # Examples
///
/// ```
/// # use topcraft_stats::compute_percentile;
/// let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(compute_percentile(&samples, 50.0), 3.0);
/// ```
pub fn compute_percentile(samples: &[f64], percentile: f64) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_of_sorted(&sorted, percentile)
}

fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> f64 {
    let n = sorted.len();
    let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) else {
        return 0.0;
    };
    if n == 1 {
        return first;
    }

    let p = (percentile / 100.0).clamp(0.0, 1.0);
    let rank = p * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = (lower_idx + 1).min(n - 1);
    let fraction = rank - lower_idx as f64;

    match (sorted.get(lower_idx), sorted.get(upper_idx)) {
        (Some(&lower), Some(&upper)) => lower + fraction * (upper - lower),
        _ => last,
    }
}

/// Compute all standard percentiles
pub fn compute_percentiles(samples: &[f64]) -> Percentiles {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Percentiles {
        p50: percentile_of_sorted(&sorted, 50.0),
        p90: percentile_of_sorted(&sorted, 90.0),
        p95: percentile_of_sorted(&sorted, 95.0),
        p99: percentile_of_sorted(&sorted, 99.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        let samples = vec![5.0, 1.0, 4.0, 2.0, 3.0];
        let p50 = compute_percentile(&samples, 50.0);
        assert!((p50 - 3.0).abs() < 0.01);
    }

    #[test]
    fn test_even_count_interpolates() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        assert!((compute_percentile(&samples, 50.0) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_single_sample() {
        let samples = vec![42.0];
        let p50 = compute_percentile(&samples, 50.0);
        assert!((p50 - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_samples() {
        let samples: Vec<f64> = Vec::new();
        let p50 = compute_percentile(&samples, 50.0);
        assert!((p50 - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compute_all_percentiles() {
        let samples: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let percentiles = compute_percentiles(&samples);

        assert!(percentiles.p50 > 49.0 && percentiles.p50 < 51.0);
        assert!(percentiles.p90 > 89.0 && percentiles.p90 < 91.0);
        assert!(percentiles.p99 > 98.0 && percentiles.p99 < 100.0);
    }
}
