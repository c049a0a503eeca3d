//! Tail statistics of a return series and VaR backtesting.
//!
//! References:
//! - Kupiec (1995), unconditional coverage test.
//! - Christoffersen (1998), independence of VaR exceptions.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::debug;

use super::var::{cornish_fisher_var, historical_tail};
use crate::core::error::{RiskError, RiskResult, ensure_confidence};
use crate::math::{SampleMoments, max_drawdown, sorted};

const PROBABILITY_FLOOR: f64 = 1.0e-12;

/// Tail figures at one confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TailLevel {
    pub confidence_level: f64,
    pub var: f64,
    pub cvar: f64,
    /// Number of returns at or below the VaR quantile.
    pub tail_observations: usize,
    pub cornish_fisher_var: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailRiskReport {
    pub levels: Vec<TailLevel>,
    pub mean: f64,
    pub std_dev: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    /// Largest peak-to-trough loss of the compounded return path.
    pub max_drawdown: f64,
    pub observations: usize,
}

/// Historical tail statistics at every requested confidence level.
pub fn calculate_tail_risk_measures(
    returns: &[f64],
    confidence_levels: &[f64],
) -> RiskResult<TailRiskReport> {
    if confidence_levels.is_empty() {
        return Err(RiskError::invalid_parameter(
            "confidence_levels",
            "at least one level is required",
        ));
    }
    for &c in confidence_levels {
        ensure_confidence("confidence_levels", c)?;
    }
    if returns.is_empty() {
        return Err(RiskError::insufficient_data("return series is empty"));
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(RiskError::invalid_parameter("returns", "contains non-finite values"));
    }

    let ascending = sorted(returns);
    let moments = SampleMoments::from_sample(returns);

    let levels = confidence_levels
        .iter()
        .map(|&c| {
            let tail = historical_tail(&ascending, c)?;
            // Loss = -return flips the sign of odd moments.
            let cf = cornish_fisher_var(
                -moments.mean,
                moments.std_dev,
                -moments.skewness,
                moments.excess_kurtosis,
                c,
            )?;
            Ok(TailLevel {
                confidence_level: c,
                var: tail.var,
                cvar: tail.cvar,
                tail_observations: tail.tail_observations,
                cornish_fisher_var: cf.max(0.0),
            })
        })
        .collect::<RiskResult<Vec<_>>>()?;

    Ok(TailRiskReport {
        levels,
        mean: moments.mean,
        std_dev: moments.std_dev,
        skewness: moments.skewness,
        excess_kurtosis: moments.excess_kurtosis,
        max_drawdown: max_drawdown(returns),
        observations: returns.len(),
    })
}

/// Exception statistics of a VaR forecast series against realised returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarBacktest {
    pub confidence_level: f64,
    pub observations: usize,
    pub exceptions: usize,
    pub expected_exceptions: f64,
    pub exception_rate: f64,
    /// Kupiec proportion-of-failures likelihood ratio, chi-square(1) under the null.
    pub kupiec_lr: f64,
    pub kupiec_p_value: f64,
    /// Christoffersen independence likelihood ratio, chi-square(1) under the null.
    pub independence_lr: f64,
    pub independence_p_value: f64,
}

/// Backtests VaR forecasts: an exception is a period whose loss `-return` exceeds its forecast.
///
/// `var_forecasts` are non-negative loss magnitudes aligned with `returns`.
pub fn backtest_var(
    returns: &[f64],
    var_forecasts: &[f64],
    confidence: f64,
) -> RiskResult<VarBacktest> {
    ensure_confidence("confidence_level", confidence)?;
    if returns.is_empty() {
        return Err(RiskError::insufficient_data("return series is empty"));
    }
    if returns.len() != var_forecasts.len() {
        return Err(RiskError::invalid_parameter(
            "var_forecasts",
            format!("length {} differs from {}", var_forecasts.len(), returns.len()),
        ));
    }
    if returns.iter().chain(var_forecasts).any(|v| !v.is_finite()) {
        return Err(RiskError::invalid_parameter(
            "returns",
            "returns and forecasts must be finite",
        ));
    }

    let hits: Vec<bool> = returns
        .iter()
        .zip(var_forecasts)
        .map(|(r, v)| -r > *v)
        .collect();
    let n = hits.len();
    let x = hits.iter().filter(|&&h| h).count();

    let p = (1.0 - confidence).clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR);
    let pi = (x as f64 / n as f64).clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR);
    let ln_l0 = (n - x) as f64 * (1.0 - p).ln() + x as f64 * p.ln();
    let ln_l1 = (n - x) as f64 * (1.0 - pi).ln() + x as f64 * pi.ln();
    let kupiec_lr = (2.0 * (ln_l1 - ln_l0)).max(0.0);

    let independence_lr = independence_statistic(&hits);

    let chi = ChiSquared::new(1.0)
        .map_err(|e| RiskError::invalid_parameter("degrees_of_freedom", e.to_string()))?;

    debug!(exceptions = x, observations = n, kupiec_lr, "backtested VaR");

    Ok(VarBacktest {
        confidence_level: confidence,
        observations: n,
        exceptions: x,
        expected_exceptions: n as f64 * (1.0 - confidence),
        exception_rate: x as f64 / n as f64,
        kupiec_lr,
        kupiec_p_value: 1.0 - chi.cdf(kupiec_lr),
        independence_lr,
        independence_p_value: 1.0 - chi.cdf(independence_lr),
    })
}

fn independence_statistic(hits: &[bool]) -> f64 {
    let (mut n00, mut n01, mut n10, mut n11) = (0usize, 0usize, 0usize, 0usize);
    for pair in hits.windows(2) {
        match (pair[0], pair[1]) {
            (false, false) => n00 += 1,
            (false, true) => n01 += 1,
            (true, false) => n10 += 1,
            (true, true) => n11 += 1,
        }
    }

    let prob = |num: usize, den: usize| -> f64 {
        if den == 0 {
            PROBABILITY_FLOOR
        } else {
            (num as f64 / den as f64).clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR)
        }
    };
    let p01 = prob(n01, n00 + n01);
    let p11 = prob(n11, n10 + n11);
    let p1 = prob(n01 + n11, n00 + n01 + n10 + n11);

    let ln_l0 = (n00 + n10) as f64 * (1.0 - p1).ln() + (n01 + n11) as f64 * p1.ln();
    let ln_l1 = n00 as f64 * (1.0 - p01).ln()
        + n01 as f64 * p01.ln()
        + n10 as f64 * (1.0 - p11).ln()
        + n11 as f64 * p11.ln();
    (2.0 * (ln_l1 - ln_l0)).max(0.0)
}
