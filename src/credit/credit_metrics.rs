//! CreditMetrics rating-migration credit VaR.
//!
//! Each obligor's standardized asset return is driven by one Gaussian systematic factor,
//! `X_i = sqrt(rho) Z + sqrt(1 - rho) eps_i`. Migration thresholds are `N^-1` of the cumulative
//! transition probabilities counted from the default state upwards, so `X_i` below the default
//! threshold means default, the next band means the worst surviving grade, and so on. Lines
//! that share a name are one obligor and migrate on the same `X_i`.
//!
//! At the horizon a surviving position in grade `k` is worth `e * exp(-s_k * max(M - h, 0))`;
//! a defaulted one recovers `e * (1 - lgd)`. Credit VaR is the distance from the simulated mean
//! portfolio value down to its `1 - c` quantile.
//!
//! References:
//! - J.P. Morgan, *CreditMetrics Technical Document* (1997), chapters 6 and 8.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::portfolio::CreditPortfolio;
use super::ratings::{RatingScale, RatingTransitionMatrix};
use crate::core::config::EngineConfig;
use crate::core::error::{RiskError, RiskResult, ensure_confidence, ensure_unit_interval};
use crate::math::{mean, normal_inv_cdf, quantile_sorted, sample_std};

/// Model data and simulation budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditMetricsSettings {
    pub asset_correlation: f64,
    pub num_trials: usize,
    pub seed: u64,
    pub horizon_years: f64,
    pub default_lgd: f64,
    pub default_maturity: f64,
    pub transition_matrix: RatingTransitionMatrix,
    pub spreads: BTreeMap<String, f64>,
    pub master_scale: RatingScale,
}

impl From<&EngineConfig> for CreditMetricsSettings {
    fn from(config: &EngineConfig) -> Self {
        let cm = &config.credit_metrics;
        Self {
            asset_correlation: cm.asset_correlation,
            num_trials: cm.num_trials,
            seed: cm.seed,
            horizon_years: cm.horizon_years,
            default_lgd: config.credit.default_lgd,
            default_maturity: config.credit.default_maturity,
            transition_matrix: cm.transition_matrix.clone(),
            spreads: cm.spreads.clone(),
            master_scale: config.credit.master_scale.clone(),
        }
    }
}

impl Default for CreditMetricsSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl CreditMetricsSettings {
    pub fn with_trials(mut self, num_trials: usize, seed: u64) -> Self {
        self.num_trials = num_trials;
        self.seed = seed;
        self
    }

    pub fn with_asset_correlation(mut self, asset_correlation: f64) -> Self {
        self.asset_correlation = asset_correlation;
        self
    }

    fn validate(&self) -> RiskResult<()> {
        if !(self.asset_correlation.is_finite() && (0.0..1.0).contains(&self.asset_correlation)) {
            return Err(RiskError::invalid_parameter(
                "asset_correlation",
                format!("must be in [0, 1), got {}", self.asset_correlation),
            ));
        }
        if self.num_trials == 0 {
            return Err(RiskError::invalid_parameter("num_trials", "must be >= 1"));
        }
        if !(self.horizon_years.is_finite() && self.horizon_years > 0.0) {
            return Err(RiskError::invalid_parameter("horizon_years", "must be > 0"));
        }
        ensure_unit_interval("default_lgd", self.default_lgd)?;
        self.transition_matrix.validate()?;
        self.master_scale.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditMetricsResult {
    pub confidence_level: f64,
    /// `E[V] - q_{1-c}(V)`, floored at zero.
    pub credit_var: f64,
    pub expected_portfolio_value: f64,
    /// Standard deviation of simulated horizon value.
    pub unexpected_loss: f64,
    /// Probability-weighted horizon value from the transition matrix alone.
    pub analytic_expected_value: f64,
    /// Horizon value if every obligor keeps its current grade.
    pub no_migration_value: f64,
    /// `1 - c` quantile of simulated horizon value.
    pub percentile_value: f64,
    /// Mean number of defaulted obligors per trial.
    pub expected_defaults: f64,
    pub num_trials: usize,
}

/// Per-obligor revaluation grid and migration thresholds.
struct Obligor {
    /// Horizon value in each state, best grade first, default last.
    values: Vec<f64>,
    /// `thresholds[k]` is `N^-1(P(end in state k or worse))`; entry 0 is unused.
    thresholds: Vec<f64>,
    start: usize,
    probabilities: Vec<f64>,
}

impl Obligor {
    #[inline]
    fn migrate(&self, x: f64) -> usize {
        (1..self.thresholds.len())
            .rev()
            .find(|&k| x < self.thresholds[k])
            .unwrap_or(0)
    }
}

pub fn calculate_credit_metrics_var(
    portfolio: &CreditPortfolio,
    confidence: f64,
    settings: &CreditMetricsSettings,
) -> RiskResult<CreditMetricsResult> {
    ensure_confidence("confidence_level", confidence)?;
    settings.validate()?;
    portfolio.validate()?;

    let matrix = &settings.transition_matrix;
    let default_state = matrix.default_index();
    let obligors = portfolio
        .positions
        .iter()
        .map(|p| {
            let rating = match &p.rating {
                Some(r) => r.as_str(),
                None => settings.master_scale.rating_for_pd(p.probability_of_default)?,
            };
            let start = matrix.index_of(rating).ok_or_else(|| {
                RiskError::invalid_parameter(
                    format!("positions[{}].rating", p.name),
                    format!("`{rating}` is not a state of the transition matrix"),
                )
            })?;

            let lgd = p.lgd_or(settings.default_lgd);
            let remaining = (p.maturity_or(settings.default_maturity) - settings.horizon_years).max(0.0);
            let values = matrix
                .states
                .iter()
                .enumerate()
                .map(|(k, state)| {
                    if k == default_state {
                        Ok(p.exposure * (1.0 - lgd))
                    } else {
                        let spread = settings.spreads.get(state).copied().ok_or_else(|| {
                            RiskError::invalid_parameter(
                                "spreads",
                                format!("no spread for rating `{state}`"),
                            )
                        })?;
                        Ok(p.exposure * (-spread * remaining).exp())
                    }
                })
                .collect::<RiskResult<Vec<f64>>>()?;

            let probabilities = matrix.row(start);
            let mut thresholds = vec![f64::INFINITY; probabilities.len()];
            let mut tail = 0.0;
            for k in (1..probabilities.len()).rev() {
                tail += probabilities[k];
                thresholds[k] = normal_inv_cdf(tail.min(1.0));
            }

            Ok(Obligor {
                values,
                thresholds,
                start,
                probabilities,
            })
        })
        .collect::<RiskResult<Vec<Obligor>>>()?;

    let analytic_expected_value: f64 = obligors
        .iter()
        .map(|o| o.values.iter().zip(&o.probabilities).map(|(v, p)| v * p).sum::<f64>())
        .sum();
    let no_migration_value: f64 = obligors.iter().map(|o| o.values[o.start]).sum();

    // Lines sharing a name belong to one obligor and share its asset return.
    let mut names: BTreeMap<&str, usize> = BTreeMap::new();
    let slots: Vec<usize> = portfolio
        .positions
        .iter()
        .map(|p| {
            let next = names.len();
            *names.entry(p.name.as_str()).or_insert(next)
        })
        .collect();

    let rho = settings.asset_correlation;
    let (loading, idio) = (rho.sqrt(), (1.0 - rho).sqrt());
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut defaults = 0usize;
    let mut shocks = vec![0.0; names.len()];
    let mut defaulted = vec![false; names.len()];
    let mut simulated: Vec<f64> = Vec::with_capacity(settings.num_trials);
    for _ in 0..settings.num_trials {
        let z: f64 = StandardNormal.sample(&mut rng);
        for shock in shocks.iter_mut() {
            let eps: f64 = StandardNormal.sample(&mut rng);
            *shock = loading * z + idio * eps;
        }
        defaulted.fill(false);
        let mut value = 0.0;
        for (o, &slot) in obligors.iter().zip(&slots) {
            let state = o.migrate(shocks[slot]);
            if state == default_state {
                defaulted[slot] = true;
            }
            value += o.values[state];
        }
        defaults += defaulted.iter().filter(|d| **d).count();
        simulated.push(value);
    }

    let expected_portfolio_value = mean(&simulated);
    let unexpected_loss = sample_std(&simulated);
    simulated.sort_by(|a, b| a.total_cmp(b));
    let percentile_value = quantile_sorted(&simulated, 1.0 - confidence);
    let credit_var = (expected_portfolio_value - percentile_value).max(0.0);

    debug!(
        trials = settings.num_trials,
        obligors = names.len(),
        credit_var,
        "simulated rating migrations"
    );

    Ok(CreditMetricsResult {
        confidence_level: confidence,
        credit_var,
        expected_portfolio_value,
        unexpected_loss,
        analytic_expected_value,
        no_migration_value,
        percentile_value,
        expected_defaults: defaults as f64 / settings.num_trials as f64,
        num_trials: settings.num_trials,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::credit::portfolio::CreditPosition;

    fn bbb_book(n: usize) -> CreditPortfolio {
        CreditPortfolio::new(
            (0..n)
                .map(|i| {
                    CreditPosition::new(format!("obligor_{i}"), 1_000_000.0, 0.0018)
                        .with_rating("BBB")
                        .with_maturity(5.0)
                })
                .collect(),
        )
    }

    #[test]
    fn simulated_mean_matches_transition_expectation() {
        let settings = CreditMetricsSettings::default().with_trials(20_000, 11);
        let r = calculate_credit_metrics_var(&bbb_book(10), 0.99, &settings).unwrap();
        assert_relative_eq!(
            r.expected_portfolio_value,
            r.analytic_expected_value,
            max_relative = 2e-3
        );
        assert!(r.credit_var >= 0.0);
        assert!(r.percentile_value <= r.expected_portfolio_value);
        assert_eq!(r.num_trials, 20_000);
    }

    #[test]
    fn correlation_fattens_the_loss_tail() {
        let base = CreditMetricsSettings::default().with_trials(20_000, 5);
        let independent = calculate_credit_metrics_var(
            &bbb_book(25),
            0.99,
            &base.clone().with_asset_correlation(0.0),
        )
        .unwrap();
        let correlated =
            calculate_credit_metrics_var(&bbb_book(25), 0.99, &base.with_asset_correlation(0.5))
                .unwrap();
        assert!(correlated.credit_var > independent.credit_var);
        assert!(correlated.unexpected_loss > independent.unexpected_loss);
    }

    #[test]
    fn same_seed_same_answer() {
        let settings = CreditMetricsSettings::default().with_trials(2_000, 99);
        let a = calculate_credit_metrics_var(&bbb_book(3), 0.95, &settings).unwrap();
        let b = calculate_credit_metrics_var(&bbb_book(3), 0.95, &settings).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unrated_positions_map_through_master_scale() {
        let book = CreditPortfolio::new(vec![CreditPosition::new("x", 1_000.0, 0.004)]);
        let settings = CreditMetricsSettings::default().with_trials(500, 1);
        let r = calculate_credit_metrics_var(&book, 0.95, &settings).unwrap();
        let spread = settings.spreads["BBB"];
        assert_relative_eq!(r.no_migration_value, 1_000.0 * (-spread * 4.0_f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn split_obligor_migrates_as_one() {
        let line = |name: &str, exposure: f64, rating: &str| {
            CreditPosition::new(name, exposure, 0.01)
                .with_rating(rating)
                .with_maturity(5.0)
        };
        let split = CreditPortfolio::new(vec![
            line("A", 500_000.0, "BB"),
            line("B", 2_000_000.0, "BBB"),
            line("A", 500_000.0, "BB"),
        ]);
        let merged = CreditPortfolio::new(vec![
            line("A", 1_000_000.0, "BB"),
            line("B", 2_000_000.0, "BBB"),
        ]);
        let settings = CreditMetricsSettings::default().with_trials(5_000, 21);
        let s = calculate_credit_metrics_var(&split, 0.99, &settings).unwrap();
        let m = calculate_credit_metrics_var(&merged, 0.99, &settings).unwrap();
        assert_relative_eq!(s.credit_var, m.credit_var, max_relative = 1e-9);
        assert_relative_eq!(s.unexpected_loss, m.unexpected_loss, max_relative = 1e-9);
        assert_relative_eq!(
            s.expected_portfolio_value,
            m.expected_portfolio_value,
            max_relative = 1e-12
        );
        assert_eq!(s.expected_defaults, m.expected_defaults);
    }

    #[test]
    fn unknown_rating_is_rejected() {
        let book = CreditPortfolio::new(vec![CreditPosition::new("x", 1.0, 0.01).with_rating("Z")]);
        assert!(matches!(
            calculate_credit_metrics_var(&book, 0.95, &CreditMetricsSettings::default()),
            Err(RiskError::InvalidParameter { .. })
        ));
    }
}
