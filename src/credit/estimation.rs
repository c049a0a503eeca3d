//! Recovery of unobservable asset value and volatility from equity market data.
//!
//! Two Merton relations link equity to assets:
//!
//! - `E = V N(d1) - D e^{-rT} N(d2)` (equity is a call on assets),
//! - `s_E E = N(d1) s_V V` (Ito's lemma on that call).
//!
//! The solver alternates a Newton solve of the first equation for `V` at the current `s_V`
//! (derivative `N(d1)`) with the fixed-point update `s_V = s_E E / (N(d1) V)` from the second.
//! Iteration starts at `V0 = E + D e^{-rT}`, `s0 = s_E E / V0` and stops when both relative
//! changes fall below the tolerance.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::merton::{merton_d1_d2, merton_equity_value};
use crate::core::config::EstimationConfig;
use crate::core::error::{RiskError, RiskResult, ensure_finite, ensure_positive};
use crate::math::{MathError, newton_raphson, normal_cdf};

/// Convergence budget of the inversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimationOptions {
    /// Relative change in both unknowns below which the iteration stops.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for EstimationOptions {
    fn default() -> Self {
        Self::from(&EstimationConfig::default())
    }
}

impl From<&EstimationConfig> for EstimationOptions {
    fn from(config: &EstimationConfig) -> Self {
        Self {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetEstimate {
    pub asset_value: f64,
    pub asset_volatility: f64,
    pub iterations: usize,
    /// Debt face value over asset value.
    pub leverage: f64,
}

pub fn estimate_asset_parameters(
    equity_value: f64,
    equity_volatility: f64,
    debt_value: f64,
    risk_free_rate: f64,
    time_to_maturity: f64,
    options: &EstimationOptions,
) -> RiskResult<AssetEstimate> {
    ensure_positive("equity_value", equity_value)?;
    ensure_positive("equity_volatility", equity_volatility)?;
    ensure_positive("debt_value", debt_value)?;
    ensure_finite("risk_free_rate", risk_free_rate)?;
    ensure_positive("time_to_maturity", time_to_maturity)?;
    ensure_positive("tolerance", options.tolerance)?;
    if options.max_iterations == 0 {
        return Err(RiskError::invalid_parameter("max_iterations", "must be >= 1"));
    }

    let (e, d, r, t) = (equity_value, debt_value, risk_free_rate, time_to_maturity);
    let mut v = e + d * (-r * t).exp();
    let mut sigma = equity_volatility * e / v;
    let mut residual = f64::INFINITY;

    for iteration in 1..=options.max_iterations {
        let solved = newton_raphson(
            |x| {
                let (d1, _) = merton_d1_d2(x, d, sigma, r, t);
                (merton_equity_value(x, d, sigma, r, t) - e, normal_cdf(d1))
            },
            v,
            options.tolerance * e,
            options.max_iterations,
        )
        .map_err(|err| non_convergence(err, iteration))?;
        let v_next = solved.root;
        if !(v_next.is_finite() && v_next > 0.0) {
            return Err(RiskError::EstimationDidNotConverge {
                iterations: iteration,
                residual: f64::NAN,
            });
        }

        let (d1, _) = merton_d1_d2(v_next, d, sigma, r, t);
        let sigma_next = equity_volatility * e / (normal_cdf(d1) * v_next);

        residual = ((v_next - v) / v).abs().max(((sigma_next - sigma) / sigma).abs());
        v = v_next;
        sigma = sigma_next;

        if !(sigma.is_finite() && sigma > 0.0) {
            break;
        }
        if residual <= options.tolerance {
            debug!(iteration, asset_value = v, asset_volatility = sigma, "asset inversion converged");
            return Ok(AssetEstimate {
                asset_value: v,
                asset_volatility: sigma,
                iterations: iteration,
                leverage: d / v,
            });
        }
    }

    Err(RiskError::EstimationDidNotConverge {
        iterations: options.max_iterations,
        residual,
    })
}

fn non_convergence(err: MathError, iteration: usize) -> RiskError {
    let residual = match err {
        MathError::NonConvergence { residual, .. } => residual,
        _ => f64::NAN,
    };
    RiskError::EstimationDidNotConverge {
        iterations: iteration,
        residual,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// Equity value and volatility implied by known asset parameters.
    fn observed(v: f64, d: f64, sigma_v: f64, r: f64, t: f64) -> (f64, f64) {
        let e = merton_equity_value(v, d, sigma_v, r, t);
        let (d1, _) = merton_d1_d2(v, d, sigma_v, r, t);
        (e, normal_cdf(d1) * sigma_v * v / e)
    }

    #[test]
    fn round_trips_through_the_equity_formula() {
        let (e, sigma_e) = observed(100.0, 80.0, 0.3, 0.05, 1.0);
        let est =
            estimate_asset_parameters(e, sigma_e, 80.0, 0.05, 1.0, &EstimationOptions::default())
                .unwrap();
        assert_relative_eq!(est.asset_value, 100.0, max_relative = 1e-7);
        assert_relative_eq!(est.asset_volatility, 0.3, max_relative = 1e-7);
        assert_relative_eq!(est.leverage, 0.8, max_relative = 1e-7);
        assert!(est.iterations <= 200);
    }

    #[test]
    fn round_trips_for_a_highly_levered_firm() {
        let (e, sigma_e) = observed(100.0, 90.0, 0.2, 0.03, 2.0);
        let est =
            estimate_asset_parameters(e, sigma_e, 90.0, 0.03, 2.0, &EstimationOptions::default())
                .unwrap();
        let repriced = merton_equity_value(est.asset_value, 90.0, est.asset_volatility, 0.03, 2.0);
        assert_relative_eq!(repriced, e, max_relative = 1e-8);
        assert_relative_eq!(est.asset_volatility, 0.2, max_relative = 1e-6);
    }

    #[test]
    fn tiny_budget_fails_with_estimation_error() {
        let (e, sigma_e) = observed(100.0, 80.0, 0.3, 0.05, 1.0);
        let opts = EstimationOptions {
            tolerance: 1e-14,
            max_iterations: 1,
        };
        assert!(matches!(
            estimate_asset_parameters(e, sigma_e, 80.0, 0.05, 1.0, &opts),
            Err(RiskError::EstimationDidNotConverge { .. })
        ));
    }

    #[test]
    fn rejects_non_positive_inputs() {
        let opts = EstimationOptions::default();
        assert!(estimate_asset_parameters(0.0, 0.5, 80.0, 0.05, 1.0, &opts).is_err());
        assert!(estimate_asset_parameters(30.0, 0.0, 80.0, 0.05, 1.0, &opts).is_err());
        assert!(estimate_asset_parameters(30.0, 0.5, 80.0, 0.05, -1.0, &opts).is_err());
    }
}
