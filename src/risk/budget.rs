//! Risk-budget portfolio construction.
//!
//! Target: weights `w` (summing to one, inside per-asset bounds) whose variance shares
//! `w_i (Sigma w)_i / w' Sigma w` match a positive budget vector `b`.
//!
//! Stage 1 solves the convex program `min 1/2 x' Sigma x - sum b_i ln x_i` by cyclical coordinate
//! descent (each coordinate has a closed-form positive root) and normalises. Its solution hits the
//! budget exactly, so it is accepted whenever it satisfies the bounds. Otherwise stage 2 minimises
//! the squared share deviation by projected gradient descent with Armijo backtracking on the capped
//! simplex.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::portfolio::{CovarianceModel, MarketPortfolio};
use crate::core::config::OptimizerConfig;
use crate::core::error::{RiskError, RiskResult};

const BUDGET_SUM_TOLERANCE: f64 = 1.0e-8;
const BOUND_SLACK: f64 = 1.0e-12;
const ARMIJO_C: f64 = 1.0e-4;
const MAX_BACKTRACKS: usize = 60;
const BISECTION_STEPS: usize = 200;

/// Per-asset weight bounds `lower <= w <= upper`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConstraints {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl WeightConstraints {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> RiskResult<Self> {
        if lower.is_empty() || lower.len() != upper.len() {
            return Err(RiskError::invalid_parameter(
                "constraints",
                "lower and upper bounds need the same non-zero length",
            ));
        }
        for i in 0..lower.len() {
            if !lower[i].is_finite() || !upper[i].is_finite() || lower[i] > upper[i] {
                return Err(RiskError::invalid_parameter(
                    "constraints",
                    format!("invalid bound at index {i}: [{}, {}]", lower[i], upper[i]),
                ));
            }
        }
        let (lo, hi): (f64, f64) = (lower.iter().sum(), upper.iter().sum());
        if lo > 1.0 + BOUND_SLACK || hi < 1.0 - BOUND_SLACK {
            return Err(RiskError::invalid_parameter(
                "constraints",
                format!("bounds admit no fully invested portfolio (sum lower {lo}, sum upper {hi})"),
            ));
        }
        Ok(Self { lower, upper })
    }

    /// Long-only, fully invested.
    pub fn long_only(n: usize) -> Self {
        Self {
            lower: vec![0.0; n],
            upper: vec![1.0; n],
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    pub fn contains(&self, w: &[f64]) -> bool {
        w.iter().enumerate().all(|(i, &v)| {
            v >= self.lower[i] - BOUND_SLACK && v <= self.upper[i] + BOUND_SLACK
        })
    }

    /// Euclidean projection onto `{lower <= w <= upper, sum w = 1}`.
    ///
    /// The projection is `clamp(y - tau)` for the shift `tau` that restores the budget; the sum is
    /// monotone in `tau`, so bisection finds it.
    pub fn project(&self, y: &[f64]) -> Vec<f64> {
        let shifted_sum = |tau: f64| -> f64 {
            y.iter()
                .enumerate()
                .map(|(i, v)| (v - tau).clamp(self.lower[i], self.upper[i]))
                .sum()
        };

        let mut lo = y
            .iter()
            .zip(&self.upper)
            .map(|(v, u)| v - u)
            .fold(f64::INFINITY, f64::min);
        let mut hi = y
            .iter()
            .zip(&self.lower)
            .map(|(v, l)| v - l)
            .fold(f64::NEG_INFINITY, f64::max);

        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (lo + hi);
            if shifted_sum(mid) > 1.0 {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo <= f64::EPSILON * (1.0 + lo.abs().max(hi.abs())) {
                break;
            }
        }

        let tau = 0.5 * (lo + hi);
        y.iter()
            .enumerate()
            .map(|(i, v)| (v - tau).clamp(self.lower[i], self.upper[i]))
            .collect()
    }
}

/// Iteration budget for [`optimize_risk_budget`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for BudgetOptions {
    fn default() -> Self {
        OptimizerConfig::default().into()
    }
}

impl From<OptimizerConfig> for BudgetOptions {
    fn from(config: OptimizerConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStage {
    CoordinateDescent,
    ProjectedGradient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBudgetResult {
    pub names: Vec<String>,
    pub weights: Vec<f64>,
    /// Achieved variance shares, summing to one.
    pub risk_contributions: Vec<f64>,
    pub target_budget: Vec<f64>,
    /// `sum (share_i - b_i)^2` at the solution.
    pub objective: f64,
    /// Ex-ante volatility of the weighted return.
    pub portfolio_volatility: f64,
    pub iterations: usize,
    pub stage: BudgetStage,
}

/// Finds weights whose risk shares match `risk_budget`.
///
/// `constraints` defaults to long-only bounds `[0, 1]`. Budgets must be positive and sum to one
/// within `1e-8`; they are renormalised before use.
pub fn optimize_risk_budget(
    portfolio: &MarketPortfolio,
    risk_budget: &[f64],
    constraints: Option<&WeightConstraints>,
    options: &BudgetOptions,
) -> RiskResult<RiskBudgetResult> {
    let model = CovarianceModel::from_portfolio(portfolio)?;
    let n = model.names.len();
    let budget = normalized_budget(risk_budget, n)?;

    let constraints = match constraints {
        Some(c) => {
            let c = WeightConstraints::new(c.lower.clone(), c.upper.clone())?;
            if c.dimension() != n {
                return Err(RiskError::invalid_parameter(
                    "constraints",
                    format!("{} bounds for {n} positions", c.dimension()),
                ));
            }
            c
        }
        None => WeightConstraints::long_only(n),
    };
    if options.max_iterations == 0 || !(options.tolerance > 0.0) {
        return Err(RiskError::invalid_parameter(
            "options",
            "max_iterations and tolerance must be positive",
        ));
    }

    let sigma = &model.covariance;
    if let Some(i) = (0..n).find(|&i| !(sigma[(i, i)] > 0.0)) {
        return Err(RiskError::invalid_parameter(
            format!("positions[{}].returns", model.names[i]),
            "zero variance; risk budgeting needs every asset to carry risk",
        ));
    }

    let (mut weights, mut iterations, mut stage) = match coordinate_descent(sigma, &budget, options)
    {
        Some((w, it)) => (w, it, BudgetStage::CoordinateDescent),
        None => (vec![1.0 / n as f64; n], options.max_iterations, BudgetStage::CoordinateDescent),
    };

    if iterations >= options.max_iterations || !constraints.contains(&weights) {
        debug!(
            iterations,
            "risk-parity solution violates bounds; switching to projected gradient"
        );
        let start = constraints.project(&weights);
        let (w, it) = projected_gradient(sigma, &budget, &constraints, start, options)?;
        weights = w;
        iterations += it;
        stage = BudgetStage::ProjectedGradient;
    }

    let w = DVector::from_vec(weights.clone());
    let g = sigma * &w;
    let variance = w.dot(&g);
    let risk_contributions: Vec<f64> = (0..n).map(|i| w[i] * g[i] / variance).collect();
    let objective = squared_deviation(&risk_contributions, &budget);

    Ok(RiskBudgetResult {
        names: model.names,
        weights,
        risk_contributions,
        target_budget: budget,
        objective,
        portfolio_volatility: variance.max(0.0).sqrt(),
        iterations,
        stage,
    })
}

fn normalized_budget(risk_budget: &[f64], n: usize) -> RiskResult<Vec<f64>> {
    if risk_budget.len() != n {
        return Err(RiskError::invalid_parameter(
            "risk_budget",
            format!("{} budgets for {n} positions", risk_budget.len()),
        ));
    }
    if risk_budget.iter().any(|b| !(b.is_finite() && *b > 0.0)) {
        return Err(RiskError::invalid_parameter(
            "risk_budget",
            "every budget must be finite and > 0",
        ));
    }
    let total: f64 = risk_budget.iter().sum();
    if (total - 1.0).abs() > BUDGET_SUM_TOLERANCE {
        return Err(RiskError::invalid_parameter(
            "risk_budget",
            format!("must sum to 1, got {total}"),
        ));
    }
    Ok(risk_budget.iter().map(|b| b / total).collect())
}

fn coordinate_descent(
    sigma: &DMatrix<f64>,
    budget: &[f64],
    options: &BudgetOptions,
) -> Option<(Vec<f64>, usize)> {
    let n = budget.len();
    let mut x: Vec<f64> = (0..n).map(|i| 1.0 / sigma[(i, i)].sqrt()).collect();

    for sweep in 1..=options.max_iterations {
        let mut max_change = 0.0_f64;
        for i in 0..n {
            let s_ii = sigma[(i, i)];
            let a: f64 = (0..n).filter(|&j| j != i).map(|j| sigma[(i, j)] * x[j]).sum();
            let updated = (-a + (a * a + 4.0 * s_ii * budget[i]).sqrt()) / (2.0 * s_ii);
            max_change = max_change.max((updated - x[i]).abs() / updated.abs().max(f64::MIN_POSITIVE));
            x[i] = updated;
        }
        if !x.iter().all(|v| v.is_finite() && *v > 0.0) {
            warn!(sweep, "coordinate descent left the positive orthant");
            return None;
        }
        if max_change <= options.tolerance {
            let total: f64 = x.iter().sum();
            return Some((x.into_iter().map(|v| v / total).collect(), sweep));
        }
    }
    None
}

fn squared_deviation(shares: &[f64], budget: &[f64]) -> f64 {
    shares
        .iter()
        .zip(budget)
        .map(|(s, b)| (s - b) * (s - b))
        .sum()
}

/// Objective `sum (w_i g_i / s - b_i)^2` and its gradient, `g = Sigma w`, `s = w' g`.
fn objective_and_gradient(sigma: &DMatrix<f64>, budget: &[f64], w: &[f64]) -> (f64, Vec<f64>) {
    let n = w.len();
    let wv = DVector::from_column_slice(w);
    let g = sigma * &wv;
    let s = wv.dot(&g);

    let r: Vec<f64> = (0..n).map(|i| w[i] * g[i] / s - budget[i]).collect();
    let f = r.iter().map(|v| v * v).sum();

    let rw = DVector::from_iterator(n, (0..n).map(|i| r[i] * w[i]));
    let sigma_rw = sigma * &rw;
    let cross: f64 = (0..n).map(|i| r[i] * w[i] * g[i]).sum();

    let grad = (0..n)
        .map(|k| 2.0 * (r[k] * g[k] + sigma_rw[k]) / s - 4.0 * cross * g[k] / (s * s))
        .collect();
    (f, grad)
}

fn projected_gradient(
    sigma: &DMatrix<f64>,
    budget: &[f64],
    constraints: &WeightConstraints,
    mut w: Vec<f64>,
    options: &BudgetOptions,
) -> RiskResult<(Vec<f64>, usize)> {
    let gradient_tolerance = options.tolerance.sqrt();
    let mut step = 1.0_f64;
    let (mut f, mut grad) = objective_and_gradient(sigma, budget, &w);
    let mut residual = f64::INFINITY;

    for iteration in 1..=options.max_iterations {
        let stepped: Vec<f64> = w.iter().zip(&grad).map(|(x, d)| x - d).collect();
        residual = constraints
            .project(&stepped)
            .iter()
            .zip(&w)
            .map(|(p, x)| (p - x).abs())
            .fold(0.0, f64::max);
        if residual <= gradient_tolerance {
            debug!(iteration, objective = f, "projected gradient converged");
            return Ok((w, iteration));
        }

        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let trial: Vec<f64> = w.iter().zip(&grad).map(|(x, d)| x - step * d).collect();
            let candidate = constraints.project(&trial);
            let decrease: f64 = grad
                .iter()
                .zip(candidate.iter().zip(&w))
                .map(|(d, (c, x))| d * (c - x))
                .sum();
            let (f_new, grad_new) = objective_and_gradient(sigma, budget, &candidate);
            if f_new.is_finite() && f_new <= f + ARMIJO_C * decrease {
                accepted = Some((candidate, f_new, grad_new));
                break;
            }
            step *= 0.5;
        }

        let Some((candidate, f_new, grad_new)) = accepted else {
            break;
        };
        let objective_change = f - f_new;
        w = candidate;
        f = f_new;
        grad = grad_new;
        step = (step * 2.0).min(1.0e6);

        if objective_change.abs() <= options.tolerance * options.tolerance * (1.0 + f) {
            debug!(iteration, objective = f, "projected gradient stalled at a stationary point");
            return Ok((w, iteration));
        }
    }

    Err(RiskError::OptimizationDidNotConverge {
        iterations: options.max_iterations,
        residual,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::risk::portfolio::MarketPosition;

    /// Orthogonal zero-mean series: diagonal covariance with volatilities in ratio 1:2:4.
    fn uncorrelated() -> MarketPortfolio {
        let s = 0.01;
        MarketPortfolio::new(vec![
            MarketPosition::new("LOW", 1.0, vec![s, -s, s, -s]),
            MarketPosition::new("MID", 1.0, vec![2.0 * s, 2.0 * s, -2.0 * s, -2.0 * s]),
            MarketPosition::new("HIGH", 1.0, vec![4.0 * s, -4.0 * s, -4.0 * s, 4.0 * s]),
        ])
    }

    #[test]
    fn equal_budget_gives_inverse_volatility_weights() {
        let r = optimize_risk_budget(&uncorrelated(), &[1.0 / 3.0; 3], None, &BudgetOptions::default())
            .unwrap();
        assert_eq!(r.stage, BudgetStage::CoordinateDescent);
        assert_relative_eq!(r.weights[0], 4.0 / 7.0, epsilon = 1e-8);
        assert_relative_eq!(r.weights[1], 2.0 / 7.0, epsilon = 1e-8);
        assert_relative_eq!(r.weights[2], 1.0 / 7.0, epsilon = 1e-8);
        for share in &r.risk_contributions {
            assert_relative_eq!(*share, 1.0 / 3.0, epsilon = 1e-8);
        }
        assert!(r.objective < 1e-14);
    }

    #[test]
    fn correlated_budget_is_hit_exactly() {
        let p = MarketPortfolio::new(vec![
            MarketPosition::new("A", 1.0, vec![0.012, -0.018, 0.007, -0.004, 0.015, -0.022]),
            MarketPosition::new("B", 1.0, vec![0.004, 0.006, -0.010, 0.008, -0.003, 0.001]),
            MarketPosition::new("C", 1.0, vec![-0.002, 0.004, -0.001, 0.003, -0.003, 0.005]),
        ]);
        let budget = [0.5, 0.3, 0.2];
        let r = optimize_risk_budget(&p, &budget, None, &BudgetOptions::default()).unwrap();
        let total: f64 = r.weights.iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        for (share, b) in r.risk_contributions.iter().zip(budget) {
            assert_relative_eq!(*share, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn binding_upper_bound_is_respected() {
        let bounds = WeightConstraints::new(vec![0.0; 3], vec![0.5; 3]).unwrap();
        let r = optimize_risk_budget(
            &uncorrelated(),
            &[1.0 / 3.0; 3],
            Some(&bounds),
            &BudgetOptions::default(),
        )
        .unwrap();
        assert_eq!(r.stage, BudgetStage::ProjectedGradient);
        assert!(r.weights.iter().all(|w| *w >= -1e-12 && *w <= 0.5 + 1e-12));
        assert_relative_eq!(r.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(r.weights[0], 0.5, epsilon = 1e-6);
        assert!(r.risk_contributions[0] < 1.0 / 3.0);
        assert!(r.objective > 0.0);
    }

    #[test]
    fn projection_lands_on_capped_simplex() {
        let c = WeightConstraints::new(vec![0.1, 0.0, 0.0], vec![0.6, 0.6, 0.6]).unwrap();
        let w = c.project(&[2.0, -1.0, 0.3]);
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(c.contains(&w));
        assert_relative_eq!(w[0], 0.6, epsilon = 1e-12);
    }

    #[test]
    fn invalid_budgets_and_bounds_are_rejected() {
        let p = uncorrelated();
        let opts = BudgetOptions::default();
        assert!(matches!(
            optimize_risk_budget(&p, &[0.5, 0.5, 0.5], None, &opts),
            Err(RiskError::InvalidParameter { .. })
        ));
        assert!(matches!(
            optimize_risk_budget(&p, &[0.5, 0.5, 0.0], None, &opts),
            Err(RiskError::InvalidParameter { .. })
        ));
        assert!(WeightConstraints::new(vec![0.5; 3], vec![1.0; 3]).is_err());
    }

    #[test]
    fn exhausted_budget_reports_non_convergence() {
        let bounds = WeightConstraints::new(vec![0.0; 3], vec![0.5; 3]).unwrap();
        let opts = BudgetOptions {
            max_iterations: 1,
            tolerance: 1e-14,
        };
        assert!(matches!(
            optimize_risk_budget(&uncorrelated(), &[0.2, 0.3, 0.5], Some(&bounds), &opts),
            Err(RiskError::OptimizationDidNotConverge { .. })
        ));
    }
}
