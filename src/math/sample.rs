//! Sample statistics over return series.

use nalgebra::DMatrix;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance (`n - 1` denominator). Zero for fewer than two points.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (values.len() as f64 - 1.0)
}

pub fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Unbiased sample covariance of two equally long series.
pub fn covariance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.len() < 2 {
        return 0.0;
    }
    let ma = mean(a);
    let mb = mean(b);
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / (a.len() as f64 - 1.0)
}

/// Sample covariance matrix of equally long series, one series per row/column.
pub fn covariance_matrix(series: &[&[f64]]) -> DMatrix<f64> {
    let n = series.len();
    let means: Vec<f64> = series.iter().map(|s| mean(s)).collect();
    let len = series.first().map_or(0, |s| s.len());
    let denom = (len as f64 - 1.0).max(1.0);

    let mut cov = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in i..n {
            let c = series[i]
                .iter()
                .zip(series[j].iter())
                .map(|(x, y)| (x - means[i]) * (y - means[j]))
                .sum::<f64>()
                / denom;
            cov[(i, j)] = c;
            cov[(j, i)] = c;
        }
    }
    cov
}

/// Ascending copy of `values` under IEEE total order.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Empirical `p`-quantile of an ascending sample.
///
/// Linear interpolation between the order statistics around rank `p * (n - 1)`.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = p * (sorted.len() as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let w = rank - lo as f64;
        sorted[lo] + w * (sorted[hi] - sorted[lo])
    }
}

/// Population moments of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleMoments {
    pub mean: f64,
    pub std_dev: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
}

impl SampleMoments {
    pub fn from_sample(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;

        let mut m2 = 0.0;
        let mut m3 = 0.0;
        let mut m4 = 0.0;
        for &x in values {
            let d = x - mean;
            let d2 = d * d;
            m2 += d2;
            m3 += d2 * d;
            m4 += d2 * d2;
        }
        m2 /= n;
        m3 /= n;
        m4 /= n;

        if m2 <= 1.0e-16 {
            return Self {
                mean,
                ..Self::default()
            };
        }

        Self {
            mean,
            std_dev: m2.sqrt(),
            skewness: m3 / m2.powf(1.5),
            excess_kurtosis: m4 / (m2 * m2) - 3.0,
        }
    }
}

/// Largest peak-to-trough decline of the compounded wealth path `prod(1 + r_t)`, as a
/// positive fraction of the peak.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut wealth = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut worst = 0.0_f64;
    for r in returns {
        wealth *= 1.0 + r;
        peak = peak.max(wealth);
        if peak > 0.0 {
            worst = worst.max((peak - wealth) / peak);
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn variance_uses_unbiased_denominator() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(mean(&x), 2.5, epsilon = 1e-15);
        assert_relative_eq!(sample_variance(&x), 5.0 / 3.0, epsilon = 1e-15);
        assert_eq!(sample_variance(&[1.0]), 0.0);
    }

    #[test]
    fn quantile_interpolates_between_order_statistics() {
        let s = sorted(&[4.0, 1.0, 3.0, 2.0, 5.0]);
        assert_eq!(s, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_relative_eq!(quantile_sorted(&s, 0.0), 1.0);
        assert_relative_eq!(quantile_sorted(&s, 0.5), 3.0);
        assert_relative_eq!(quantile_sorted(&s, 0.1), 1.4, epsilon = 1e-12);
        assert_relative_eq!(quantile_sorted(&s, 1.0), 5.0);
    }

    #[test]
    fn covariance_matrix_is_symmetric_and_matches_pairwise() {
        let a = [0.01, -0.02, 0.015, 0.003];
        let b = [0.02, -0.01, 0.005, -0.004];
        let cov = covariance_matrix(&[&a, &b]);
        assert_relative_eq!(cov[(0, 1)], cov[(1, 0)]);
        assert_relative_eq!(cov[(0, 1)], covariance(&a, &b), epsilon = 1e-18);
        assert_relative_eq!(cov[(0, 0)], sample_variance(&a), epsilon = 1e-18);
    }

    #[test]
    fn moments_of_symmetric_sample() {
        let m = SampleMoments::from_sample(&[-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_relative_eq!(m.mean, 0.0);
        assert_relative_eq!(m.std_dev, 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(m.skewness, 0.0, epsilon = 1e-12);
        assert_relative_eq!(m.excess_kurtosis, -1.3, epsilon = 1e-12);
    }

    #[test]
    fn drawdown_tracks_running_peak() {
        let dd = max_drawdown(&[0.10, -0.20, 0.05, -0.10, 0.30]);
        // Peak 1.10, trough 1.10 * 0.8 * 1.05 * 0.9 = 0.8316.
        assert_relative_eq!(dd, 1.0 - 0.8316 / 1.10, epsilon = 1e-12);
        assert_eq!(max_drawdown(&[0.01, 0.02]), 0.0);
    }
}
