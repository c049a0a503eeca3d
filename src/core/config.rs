//! Engine configuration.
//!
//! All defaults that used to be scattered across call sites (LGD assumptions, stress scenarios,
//! transition tables, solver budgets) live here. The configuration is an immutable value: build it
//! once, validate it, and pass it by reference into every call.
//!
//! Every section deserializes with `#[serde(default)]`, so a JSON file only has to name the values
//! it overrides.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{RiskError, RiskResult};
use crate::credit::ratings::{RatingGrade, RatingScale, RatingTransitionMatrix};
use crate::risk::stress::StressScenario;

/// Top-level configuration passed to both engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub var: VarConfig,
    pub credit: CreditConfig,
    pub credit_metrics: CreditMetricsConfig,
    pub stress: StressConfig,
    pub optimizer: OptimizerConfig,
    pub estimation: EstimationConfig,
}

/// Defaults for the VaR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarConfig {
    pub default_confidence_level: f64,
    pub default_time_horizon: u32,
    pub default_num_simulations: usize,
    /// Hard cap on Monte Carlo sample size per call.
    pub max_simulations: usize,
    pub default_seed: u64,
}

impl Default for VarConfig {
    fn default() -> Self {
        Self {
            default_confidence_level: 0.95,
            default_time_horizon: 1,
            default_num_simulations: 10_000,
            max_simulations: 1_000_000,
            default_seed: 42,
        }
    }
}

/// Defaults for the structural and portfolio credit models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditConfig {
    pub default_lgd: f64,
    /// Maturity in years assumed for positions that do not carry one.
    pub default_maturity: f64,
    /// Pairwise default correlation used for portfolio unexpected loss (0 = independence).
    pub default_correlation: f64,
    /// KMV default point as a fraction of debt face value.
    pub kmv_default_threshold: f64,
    pub edf_floor: f64,
    pub edf_cap: f64,
    pub master_scale: RatingScale,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            default_lgd: 0.45,
            default_maturity: 5.0,
            default_correlation: 0.0,
            kmv_default_threshold: 0.75,
            edf_floor: 0.0001,
            edf_cap: 0.35,
            master_scale: default_master_scale(),
        }
    }
}

/// CreditMetrics simulation settings and market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditMetricsConfig {
    /// Confidence level used when a request names none.
    pub confidence_level: f64,
    pub asset_correlation: f64,
    pub num_trials: usize,
    pub max_trials: usize,
    pub seed: u64,
    /// Risk horizon in years; one-year transition matrices imply 1.0.
    pub horizon_years: f64,
    pub transition_matrix: RatingTransitionMatrix,
    /// Annual credit spread per non-default rating, used to revalue positions at the horizon.
    pub spreads: BTreeMap<String, f64>,
}

impl Default for CreditMetricsConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.99,
            asset_correlation: 0.20,
            num_trials: 10_000,
            max_trials: 1_000_000,
            seed: 7,
            horizon_years: 1.0,
            transition_matrix: default_transition_matrix(),
            spreads: default_rating_spreads(),
        }
    }
}

/// Stress-testing defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Confidence level of the ASRF credit VaR reported by credit stress tests.
    pub confidence_level: f64,
    /// Scenarios run when a request names none.
    pub default_scenarios: Vec<StressScenario>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.999,
            default_scenarios: vec![
                StressScenario::new("mild_recession", 1.5, 1.1),
                StressScenario::new("severe_recession", 2.5, 1.25),
                StressScenario::new("financial_crisis", 4.0, 1.5),
            ],
        }
    }
}

/// Risk-budget optimizer budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1.0e-10,
        }
    }
}

/// Iterative estimator budgets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    /// Relative tolerance for the Merton asset-parameter inversion.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub rating_model_tolerance: f64,
    pub rating_model_max_iterations: usize,
    /// L2 penalty on standardized coefficients; keeps IRLS finite on separable samples.
    pub rating_model_ridge: f64,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-10,
            max_iterations: 200,
            rating_model_tolerance: 1.0e-9,
            rating_model_max_iterations: 100,
            rating_model_ridge: 1.0e-3,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> RiskResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RiskError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> RiskResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RiskError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Checks cross-field consistency. Called once at load time.
    pub fn validate(&self) -> RiskResult<()> {
        let v = &self.var;
        check(
            v.default_confidence_level > 0.0 && v.default_confidence_level < 1.0,
            "var.default_confidence_level must be in (0, 1)",
        )?;
        check(v.default_time_horizon >= 1, "var.default_time_horizon must be >= 1")?;
        check(
            v.default_num_simulations >= 1 && v.default_num_simulations <= v.max_simulations,
            "var.default_num_simulations must be in [1, max_simulations]",
        )?;

        let c = &self.credit;
        check(
            (0.0..=1.0).contains(&c.default_lgd),
            "credit.default_lgd must be in [0, 1]",
        )?;
        check(
            c.default_maturity.is_finite() && c.default_maturity > 0.0,
            "credit.default_maturity must be > 0",
        )?;
        check(
            (0.0..=1.0).contains(&c.default_correlation),
            "credit.default_correlation must be in [0, 1]",
        )?;
        check(
            c.kmv_default_threshold > 0.0 && c.kmv_default_threshold <= 1.0,
            "credit.kmv_default_threshold must be in (0, 1]",
        )?;
        check(
            0.0 <= c.edf_floor && c.edf_floor < c.edf_cap && c.edf_cap <= 1.0,
            "credit.edf_floor < credit.edf_cap must lie in [0, 1]",
        )?;
        c.master_scale.validate()?;

        let cm = &self.credit_metrics;
        check(
            cm.confidence_level > 0.0 && cm.confidence_level < 1.0,
            "credit_metrics.confidence_level must be in (0, 1)",
        )?;
        check(
            (0.0..1.0).contains(&cm.asset_correlation),
            "credit_metrics.asset_correlation must be in [0, 1)",
        )?;
        check(
            cm.num_trials >= 1 && cm.num_trials <= cm.max_trials,
            "credit_metrics.num_trials must be in [1, max_trials]",
        )?;
        check(
            cm.horizon_years.is_finite() && cm.horizon_years > 0.0,
            "credit_metrics.horizon_years must be > 0",
        )?;
        cm.transition_matrix.validate()?;
        for state in cm.transition_matrix.non_default_states() {
            check(
                cm.spreads.get(state).is_some_and(|s| s.is_finite()),
                "credit_metrics.spreads must name every non-default rating",
            )?;
        }
        for grade in &c.master_scale.grades {
            check(
                cm.transition_matrix.index_of(&grade.rating).is_some(),
                "credit.master_scale ratings must appear in the transition matrix",
            )?;
        }

        check(
            self.stress.confidence_level > 0.0 && self.stress.confidence_level < 1.0,
            "stress.confidence_level must be in (0, 1)",
        )?;
        for scenario in &self.stress.default_scenarios {
            scenario.validate()?;
        }

        check(
            self.optimizer.max_iterations >= 1 && self.optimizer.tolerance > 0.0,
            "optimizer budget must be positive",
        )?;
        let e = &self.estimation;
        check(
            e.max_iterations >= 1
                && e.tolerance > 0.0
                && e.rating_model_max_iterations >= 1
                && e.rating_model_tolerance > 0.0
                && e.rating_model_ridge >= 0.0,
            "estimation budgets must be positive",
        )?;
        Ok(())
    }
}

fn check(condition: bool, message: &str) -> RiskResult<()> {
    if condition {
        Ok(())
    } else {
        Err(RiskError::Config(message.to_string()))
    }
}

fn default_master_scale() -> RatingScale {
    let grades = [
        ("AAA", 0.0002),
        ("AA", 0.0006),
        ("A", 0.0015),
        ("BBB", 0.005),
        ("BB", 0.02),
        ("B", 0.08),
        ("CCC", 1.0),
    ];
    RatingScale {
        grades: grades
            .iter()
            .map(|&(rating, max_pd)| RatingGrade {
                rating: rating.to_string(),
                max_pd,
            })
            .collect(),
    }
}

/// One-year rating transition probabilities (CreditMetrics technical document, Table 6.1).
fn default_transition_matrix() -> RatingTransitionMatrix {
    let states = ["AAA", "AA", "A", "BBB", "BB", "B", "CCC", "D"];
    let pct = [
        [90.81, 8.33, 0.68, 0.06, 0.12, 0.00, 0.00, 0.00],
        [0.70, 90.65, 7.79, 0.64, 0.06, 0.14, 0.02, 0.00],
        [0.09, 2.27, 91.05, 5.52, 0.74, 0.26, 0.01, 0.06],
        [0.02, 0.33, 5.95, 86.93, 5.30, 1.17, 0.12, 0.18],
        [0.03, 0.14, 0.67, 7.73, 80.53, 8.84, 1.00, 1.06],
        [0.00, 0.11, 0.24, 0.43, 6.48, 83.46, 4.07, 5.20],
        [0.22, 0.00, 0.22, 1.30, 2.38, 11.24, 64.86, 19.79],
        [0.00, 0.00, 0.00, 0.00, 0.00, 0.00, 0.00, 100.0],
    ];
    RatingTransitionMatrix {
        states: states.iter().map(|s| s.to_string()).collect(),
        probabilities: pct
            .iter()
            .map(|row| row.iter().map(|p| p / 100.0).collect())
            .collect(),
    }
}

fn default_rating_spreads() -> BTreeMap<String, f64> {
    [
        ("AAA", 0.0040),
        ("AA", 0.0060),
        ("A", 0.0090),
        ("BBB", 0.0150),
        ("BB", 0.0300),
        ("B", 0.0550),
        ("CCC", 0.1200),
    ]
    .iter()
    .map(|&(rating, spread)| (rating.to_string(), spread))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config = EngineConfig::from_json_str(
            r#"{ "credit": { "default_lgd": 0.6 }, "var": { "default_seed": 9 } }"#,
        )
        .unwrap();
        assert_eq!(config.credit.default_lgd, 0.6);
        assert_eq!(config.credit.default_maturity, 5.0);
        assert_eq!(config.var.default_seed, 9);
        assert_eq!(config.stress.default_scenarios.len(), 3);
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "credit": { "default_lgd": 1.5 } }"#)
            .unwrap_err();
        assert!(matches!(err, RiskError::Config(_)));

        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, RiskError::Config(_)));
    }

    #[test]
    fn default_correlation_accepts_the_closed_unit_interval() {
        let config =
            EngineConfig::from_json_str(r#"{ "credit": { "default_correlation": 1.0 } }"#).unwrap();
        assert_eq!(config.credit.default_correlation, 1.0);

        let err = EngineConfig::from_json_str(r#"{ "credit": { "default_correlation": 1.01 } }"#)
            .unwrap_err();
        assert!(matches!(err, RiskError::Config(_)));
    }

    #[test]
    fn missing_spread_for_rating_is_rejected() {
        let mut config = EngineConfig::default();
        config.credit_metrics.spreads.remove("BB");
        assert!(config.validate().is_err());
    }
}
