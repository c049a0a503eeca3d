//! Value-at-Risk and Expected-Shortfall estimators for a single return series.
//!
//! Implemented estimators:
//! - historical VaR/ES from the empirical return quantile,
//! - parametric VaR/ES under a normal or Student-t location-scale model fitted by sample
//!   mean and standard deviation,
//! - Monte Carlo VaR/ES: draws from the fitted parametric model, then the historical estimator
//!   applied to the simulated sample,
//! - Cornish-Fisher VaR from sample moments.
//!
//! Conventions: inputs are periodic returns (profits positive); VaR and ES are reported as
//! non-negative loss magnitudes. The empirical quantile at probability `p` interpolates linearly
//! between order statistics around rank `p * (n - 1)`, and ES is the negated mean of every return
//! at or below that quantile.
//!
//! Horizon scaling uses the square-root-of-time rule, `VaR_h = VaR_1 * sqrt(h)`. This assumes
//! i.i.d. returns and is a model assumption, not an approximation error.
//!
//! References:
//! - McNeil, Frey, Embrechts, *Quantitative Risk Management* (2015), VaR/ES theory.
//! - J.P. Morgan/Reuters, *RiskMetrics Technical Document* (1996).
//! - Cornish and Fisher (1937), quantile expansion.

use std::fmt;
use std::str::FromStr;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal, StudentT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{RiskError, RiskResult, ensure_confidence};
use crate::math::{
    mean, normal_inv_cdf, normal_pdf, quantile_sorted, sample_std, sorted,
    student_t_quantile, student_t_tail_expectation,
};

/// VaR estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarMethod {
    Historical,
    Parametric,
    MonteCarlo,
}

impl VarMethod {
    pub const EXPECTED: &'static str = "historical, parametric, monte_carlo";

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Historical => "historical",
            Self::Parametric => "parametric",
            Self::MonteCarlo => "monte_carlo",
        }
    }
}

impl fmt::Display for VarMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VarMethod {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "historical" => Ok(Self::Historical),
            "parametric" => Ok(Self::Parametric),
            "monte_carlo" | "montecarlo" | "monte-carlo" => Ok(Self::MonteCarlo),
            _ => Err(RiskError::InvalidMethod {
                method: s.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

/// Location-scale family for the parametric and Monte Carlo estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReturnDistribution {
    #[default]
    Normal,
    #[serde(rename = "t", alias = "student_t")]
    StudentT,
}

impl ReturnDistribution {
    pub const EXPECTED: &'static str = "normal, t";
}

impl FromStr for ReturnDistribution {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "gaussian" => Ok(Self::Normal),
            "t" | "student_t" | "students_t" => Ok(Self::StudentT),
            _ => Err(RiskError::InvalidMethod {
                method: s.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

/// Inputs for [`calculate_var`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarParams {
    pub method: VarMethod,
    pub confidence_level: f64,
    /// Horizon in periods of the return series.
    pub time_horizon: u32,
    /// Monte Carlo sample size; ignored by the other methods.
    pub num_simulations: usize,
    pub distribution: ReturnDistribution,
    /// Student-t degrees of freedom; defaults to `n - 1`.
    pub degrees_of_freedom: Option<f64>,
    /// Seed for the Monte Carlo generator.
    pub seed: u64,
}

impl VarParams {
    pub fn new(method: VarMethod, confidence_level: f64) -> Self {
        Self {
            method,
            confidence_level,
            time_horizon: 1,
            num_simulations: 10_000,
            distribution: ReturnDistribution::Normal,
            degrees_of_freedom: None,
            seed: 42,
        }
    }

    pub fn with_time_horizon(mut self, time_horizon: u32) -> Self {
        self.time_horizon = time_horizon;
        self
    }

    pub fn with_simulations(mut self, num_simulations: usize, seed: u64) -> Self {
        self.num_simulations = num_simulations;
        self.seed = seed;
        self
    }

    pub fn with_distribution(
        mut self,
        distribution: ReturnDistribution,
        degrees_of_freedom: Option<f64>,
    ) -> Self {
        self.distribution = distribution;
        self.degrees_of_freedom = degrees_of_freedom;
        self
    }
}

/// VaR/ES estimate with its horizon-scaled counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarResult {
    pub method: VarMethod,
    pub confidence_level: f64,
    pub time_horizon: u32,
    pub var: f64,
    pub scaled_var: f64,
    pub conditional_var: f64,
    pub scaled_cvar: f64,
    /// Size of the sample the estimate was taken from.
    pub observations: usize,
}

/// One-period tail estimate shared by the historical, Monte Carlo and batched estimators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TailEstimate {
    pub var: f64,
    pub cvar: f64,
    pub tail_observations: usize,
}

/// Computes VaR and CVaR of `returns` with the requested method.
///
/// # Examples
/// ```rust
/// use ferric_risk::risk::var::{VarMethod, VarParams, calculate_var};
///
/// let returns = [-0.031, 0.012, -0.004, 0.021, -0.017, 0.008, 0.015, -0.009, 0.003, -0.022,
///                0.011, 0.006, -0.013, 0.019, -0.002, 0.007, -0.026, 0.010, 0.004, -0.006];
/// let result = calculate_var(&returns, &VarParams::new(VarMethod::Historical, 0.95)).unwrap();
/// assert!(result.conditional_var >= result.var);
/// ```
pub fn calculate_var(returns: &[f64], params: &VarParams) -> RiskResult<VarResult> {
    validate_params(returns, params)?;

    let c = params.confidence_level;
    let (tail, observations) = match params.method {
        VarMethod::Historical => (historical_tail(&sorted(returns), c)?, returns.len()),
        VarMethod::Parametric => {
            let (var, cvar) = parametric_var_es(returns, c, params)?;
            (
                TailEstimate {
                    var,
                    cvar,
                    tail_observations: 0,
                },
                returns.len(),
            )
        }
        VarMethod::MonteCarlo => {
            let nu = degrees_of_freedom(returns, params)?;
            let mut simulated = simulate_returns(
                mean(returns),
                sample_std(returns),
                params.distribution,
                nu,
                params.num_simulations,
                params.seed,
            )?;
            simulated.sort_by(|a, b| a.total_cmp(b));
            (historical_tail(&simulated, c)?, params.num_simulations)
        }
    };

    let scale = f64::from(params.time_horizon).sqrt();
    debug!(
        method = params.method.as_str(),
        confidence = c,
        var = tail.var,
        cvar = tail.cvar,
        observations,
        "computed VaR"
    );

    Ok(VarResult {
        method: params.method,
        confidence_level: c,
        time_horizon: params.time_horizon,
        var: tail.var,
        scaled_var: tail.var * scale,
        conditional_var: tail.cvar,
        scaled_cvar: tail.cvar * scale,
        observations,
    })
}

/// Historical one-period VaR of a return sample.
pub fn historical_var(returns: &[f64], confidence: f64) -> RiskResult<f64> {
    calculate_var(returns, &VarParams::new(VarMethod::Historical, confidence)).map(|r| r.var)
}

/// Historical one-period Expected Shortfall of a return sample.
pub fn historical_expected_shortfall(returns: &[f64], confidence: f64) -> RiskResult<f64> {
    calculate_var(returns, &VarParams::new(VarMethod::Historical, confidence))
        .map(|r| r.conditional_var)
}

/// Cornish-Fisher adjusted VaR for a loss distribution.
///
/// `excess_kurtosis` should be kurtosis - 3.
pub fn cornish_fisher_var(
    mean_loss: f64,
    std_dev_loss: f64,
    skewness: f64,
    excess_kurtosis: f64,
    confidence: f64,
) -> RiskResult<f64> {
    ensure_confidence("confidence_level", confidence)?;
    if !(std_dev_loss.is_finite() && std_dev_loss >= 0.0) {
        return Err(RiskError::invalid_parameter(
            "std_dev_loss",
            "must be finite and >= 0",
        ));
    }

    let z = normal_inv_cdf(confidence);
    let z2 = z * z;
    let z3 = z2 * z;

    let z_cf = z + (z2 - 1.0) * skewness / 6.0 + (z3 - 3.0 * z) * excess_kurtosis / 24.0
        - (2.0 * z3 - 5.0 * z) * skewness * skewness / 36.0;

    Ok(mean_loss + std_dev_loss * z_cf)
}

/// Tail estimate from an ascending sample. Fails if `floor(n * (1 - c))` is zero.
pub(crate) fn historical_tail(sorted: &[f64], confidence: f64) -> RiskResult<TailEstimate> {
    let n = sorted.len();
    let expected_tail = (n as f64 * (1.0 - confidence) + 1.0e-9).floor();
    if expected_tail < 1.0 {
        return Err(RiskError::insufficient_data(format!(
            "{n} observations leave an empty tail at confidence {confidence}; at least {} are required",
            (1.0 / (1.0 - confidence) - 1.0e-9).ceil()
        )));
    }

    let q = quantile_sorted(sorted, 1.0 - confidence);
    let tail_len = sorted.partition_point(|&r| r <= q).max(1);
    let tail_mean = sorted[..tail_len].iter().sum::<f64>() / tail_len as f64;

    let var = (-q).max(0.0);
    Ok(TailEstimate {
        var,
        cvar: (-tail_mean).max(var),
        tail_observations: tail_len,
    })
}

fn parametric_var_es(
    returns: &[f64],
    confidence: f64,
    params: &VarParams,
) -> RiskResult<(f64, f64)> {
    let mu = mean(returns);
    let sigma = sample_std(returns);
    let alpha = 1.0 - confidence;

    let (var, cvar) = match params.distribution {
        ReturnDistribution::Normal => {
            let z = normal_inv_cdf(alpha);
            (
                -(mu + z * sigma),
                -(mu - sigma * normal_pdf(z) / alpha),
            )
        }
        ReturnDistribution::StudentT => {
            let nu = degrees_of_freedom(returns, params)?;
            let z = student_t_quantile(alpha, nu)
                .map_err(|_| RiskError::invalid_parameter("degrees_of_freedom", "must be > 1"))?;
            let es = student_t_tail_expectation(confidence, nu)
                .map_err(|_| RiskError::invalid_parameter("degrees_of_freedom", "must be > 1"))?;
            (-(mu + z * sigma), sigma * es - mu)
        }
    };

    let var = var.max(0.0);
    Ok((var, cvar.max(var)))
}

fn simulate_returns(
    mu: f64,
    sigma: f64,
    distribution: ReturnDistribution,
    nu: f64,
    num_simulations: usize,
    seed: u64,
) -> RiskResult<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let draws = match distribution {
        ReturnDistribution::Normal => (0..num_simulations)
            .map(|_| {
                let z: f64 = StandardNormal.sample(&mut rng);
                mu + sigma * z
            })
            .collect(),
        ReturnDistribution::StudentT => {
            let t = StudentT::new(nu)
                .map_err(|e| RiskError::invalid_parameter("degrees_of_freedom", e.to_string()))?;
            (0..num_simulations)
                .map(|_| mu + sigma * t.sample(&mut rng))
                .collect()
        }
    };
    Ok(draws)
}

/// Student-t degrees of freedom: explicit value, else `n - 1`. Unused for the normal family.
fn degrees_of_freedom(returns: &[f64], params: &VarParams) -> RiskResult<f64> {
    if params.distribution == ReturnDistribution::Normal {
        return Ok(f64::INFINITY);
    }
    match params.degrees_of_freedom {
        Some(nu) if nu.is_finite() && nu > 1.0 => Ok(nu),
        Some(nu) => Err(RiskError::invalid_parameter(
            "degrees_of_freedom",
            format!("must be finite and > 1, got {nu}"),
        )),
        None if returns.len() > 2 => Ok(returns.len() as f64 - 1.0),
        None => Err(RiskError::insufficient_data(
            "Student-t estimation needs at least 3 returns",
        )),
    }
}

fn validate_params(returns: &[f64], params: &VarParams) -> RiskResult<()> {
    ensure_confidence("confidence_level", params.confidence_level)?;
    if params.time_horizon == 0 {
        return Err(RiskError::invalid_parameter("time_horizon", "must be >= 1"));
    }
    if returns.is_empty() {
        return Err(RiskError::insufficient_data("return series is empty"));
    }
    if let Some(i) = returns.iter().position(|r| !r.is_finite()) {
        return Err(RiskError::invalid_parameter(
            "returns",
            format!("element {i} is not finite"),
        ));
    }
    if params.method != VarMethod::Historical && returns.len() < 2 {
        return Err(RiskError::insufficient_data(format!(
            "{} VaR needs at least 2 returns, got {}",
            params.method,
            returns.len()
        )));
    }
    if params.method == VarMethod::MonteCarlo && params.num_simulations == 0 {
        return Err(RiskError::invalid_parameter("num_simulations", "must be >= 1"));
    }
    Ok(())
}
