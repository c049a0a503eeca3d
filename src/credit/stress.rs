//! Credit stress testing with loss-distribution metrics.
//!
//! Each scenario stresses PD and LGD line by line (see [`StressScenario`]) and recomputes expected
//! loss, unexpected loss and the Vasicek ASRF credit VaR
//! `sum_i e_i lgd_i N((N^-1(pd_i) + sqrt(rho) N^-1(c)) / sqrt(1 - rho))`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::portfolio::{CreditPortfolio, calculate_portfolio_risk, vasicek_conditional_pd};
use crate::core::config::EngineConfig;
use crate::core::error::{RiskError, RiskResult, ensure_confidence, ensure_unit_interval};
use crate::risk::stress::{StressScenario, check_unique_names};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditStressSettings {
    pub default_lgd: f64,
    /// Pairwise default correlation for unexpected loss.
    pub default_correlation: f64,
    /// Asset correlation of the ASRF model.
    pub asset_correlation: f64,
    pub confidence_level: f64,
    /// Run when the caller supplies no scenarios.
    pub default_scenarios: Vec<StressScenario>,
}

impl From<&EngineConfig> for CreditStressSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            default_lgd: config.credit.default_lgd,
            default_correlation: config.credit.default_correlation,
            asset_correlation: config.credit_metrics.asset_correlation,
            confidence_level: config.stress.confidence_level,
            default_scenarios: config.stress.default_scenarios.clone(),
        }
    }
}

impl Default for CreditStressSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Loss metrics of one PD/LGD state of the book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditLossMetrics {
    pub portfolio_pd: f64,
    pub expected_loss: f64,
    pub unexpected_loss: f64,
    /// ASRF loss quantile at the configured confidence.
    pub credit_var: f64,
    /// `credit_var - expected_loss`.
    pub economic_capital: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditScenarioResult {
    pub scenario: StressScenario,
    pub metrics: CreditLossMetrics,
    pub expected_loss_change: f64,
    pub credit_var_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditStressReport {
    pub confidence_level: f64,
    pub baseline: CreditLossMetrics,
    pub scenarios: BTreeMap<String, CreditScenarioResult>,
}

/// Runs credit stress scenarios; an empty list runs `settings.default_scenarios`.
pub fn run_credit_stress_test(
    portfolio: &CreditPortfolio,
    scenarios: &[StressScenario],
    settings: &CreditStressSettings,
) -> RiskResult<CreditStressReport> {
    ensure_unit_interval("default_lgd", settings.default_lgd)?;
    ensure_unit_interval("default_correlation", settings.default_correlation)?;
    ensure_confidence("confidence_level", settings.confidence_level)?;
    let rho = settings.asset_correlation;
    if !(rho.is_finite() && (0.0..1.0).contains(&rho)) {
        return Err(RiskError::invalid_parameter(
            "asset_correlation",
            format!("must be in [0, 1), got {rho}"),
        ));
    }
    portfolio.validate()?;
    let scenarios = if scenarios.is_empty() {
        settings.default_scenarios.as_slice()
    } else {
        scenarios
    };
    for s in scenarios {
        s.validate()?;
    }
    check_unique_names(scenarios.iter().map(|s| s.name.as_str()))?;

    let baseline = loss_metrics(portfolio, settings)?;
    let mut results = BTreeMap::new();
    for scenario in scenarios {
        let mut stressed = portfolio.clone();
        for p in &mut stressed.positions {
            p.probability_of_default = scenario.stressed_pd(p.probability_of_default);
            p.loss_given_default = Some(scenario.stressed_lgd(p.lgd_or(settings.default_lgd)));
        }
        let metrics = loss_metrics(&stressed, settings)?;
        debug!(
            scenario = %scenario.name,
            expected_loss = metrics.expected_loss,
            credit_var = metrics.credit_var,
            "credit stress scenario evaluated"
        );
        results.insert(
            scenario.name.clone(),
            CreditScenarioResult {
                scenario: scenario.clone(),
                metrics,
                expected_loss_change: metrics.expected_loss - baseline.expected_loss,
                credit_var_change: metrics.credit_var - baseline.credit_var,
            },
        );
    }

    Ok(CreditStressReport {
        confidence_level: settings.confidence_level,
        baseline,
        scenarios: results,
    })
}

fn loss_metrics(
    portfolio: &CreditPortfolio,
    settings: &CreditStressSettings,
) -> RiskResult<CreditLossMetrics> {
    let risk =
        calculate_portfolio_risk(portfolio, settings.default_lgd, settings.default_correlation)?;
    let credit_var = portfolio
        .positions
        .iter()
        .map(|p| {
            vasicek_conditional_pd(
                p.probability_of_default,
                settings.asset_correlation,
                settings.confidence_level,
            )
            .map(|pd| p.exposure * p.lgd_or(settings.default_lgd) * pd)
        })
        .sum::<RiskResult<f64>>()?;

    Ok(CreditLossMetrics {
        portfolio_pd: risk.portfolio_pd,
        expected_loss: risk.expected_loss,
        unexpected_loss: risk.unexpected_loss,
        credit_var,
        economic_capital: credit_var - risk.expected_loss,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::credit::portfolio::CreditPosition;

    fn book() -> CreditPortfolio {
        CreditPortfolio::new(vec![
            CreditPosition::new("Corp1", 2_000_000.0, 0.01),
            CreditPosition::new("Corp2", 1_000_000.0, 0.04).with_lgd(0.6),
            CreditPosition::new("Corp3", 500_000.0, 0.002).with_lgd(0.3),
        ])
    }

    #[test]
    fn empty_list_runs_configured_scenarios() {
        let r = run_credit_stress_test(&book(), &[], &CreditStressSettings::default()).unwrap();
        assert_eq!(r.scenarios.len(), 3);
        let mild = &r.scenarios["mild_recession"];
        let severe = &r.scenarios["severe_recession"];
        let crisis = &r.scenarios["financial_crisis"];
        assert!(mild.expected_loss_change > 0.0);
        assert!(severe.metrics.expected_loss > mild.metrics.expected_loss);
        assert!(crisis.metrics.credit_var > severe.metrics.credit_var);
    }

    #[test]
    fn neutral_scenario_matches_baseline() {
        let r = run_credit_stress_test(
            &book(),
            &[StressScenario::new("flat", 1.0, 1.0)],
            &CreditStressSettings::default(),
        )
        .unwrap();
        let flat = &r.scenarios["flat"];
        assert_relative_eq!(flat.metrics.expected_loss, r.baseline.expected_loss, epsilon = 1e-9);
        assert_relative_eq!(flat.credit_var_change, 0.0, epsilon = 1e-9);
        assert!(r.baseline.credit_var > r.baseline.expected_loss);
    }

    #[test]
    fn stressed_pds_are_clamped() {
        let r = run_credit_stress_test(
            &book(),
            &[StressScenario::new("armageddon", 50.0, 3.0)],
            &CreditStressSettings::default(),
        )
        .unwrap();
        let m = r.scenarios["armageddon"].metrics;
        assert!(m.portfolio_pd <= 1.0);
        assert!(m.expected_loss <= book().total_exposure());
    }

    #[test]
    fn invalid_factor_is_rejected() {
        assert!(matches!(
            run_credit_stress_test(
                &book(),
                &[StressScenario::new("up", 0.9, 1.0)],
                &CreditStressSettings::default()
            ),
            Err(RiskError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn settings_are_checked_before_the_book() {
        let empty = CreditPortfolio::default();
        let mut settings = CreditStressSettings::default();
        settings.confidence_level = 1.0;
        assert!(matches!(
            run_credit_stress_test(&empty, &[], &settings),
            Err(RiskError::InvalidParameter { parameter, .. }) if parameter == "confidence_level"
        ));

        let mut settings = CreditStressSettings::default();
        settings.asset_correlation = 1.0;
        assert!(matches!(
            run_credit_stress_test(&empty, &[], &settings),
            Err(RiskError::InvalidParameter { parameter, .. }) if parameter == "asset_correlation"
        ));
    }

    #[test]
    fn split_obligor_keeps_baseline_metrics() {
        let split = CreditPortfolio::new(vec![
            CreditPosition::new("Corp1", 1_000_000.0, 0.01),
            CreditPosition::new("Corp2", 1_000_000.0, 0.04).with_lgd(0.6),
            CreditPosition::new("Corp1", 1_000_000.0, 0.01),
            CreditPosition::new("Corp3", 500_000.0, 0.002).with_lgd(0.3),
        ]);
        let settings = CreditStressSettings::default();
        let a = run_credit_stress_test(&split, &[], &settings).unwrap();
        let b = run_credit_stress_test(&book(), &[], &settings).unwrap();
        assert_relative_eq!(a.baseline.expected_loss, b.baseline.expected_loss, max_relative = 1e-12);
        assert_relative_eq!(
            a.baseline.unexpected_loss,
            b.baseline.unexpected_loss,
            max_relative = 1e-12
        );
        assert_relative_eq!(a.baseline.credit_var, b.baseline.credit_var, max_relative = 1e-12);
    }
}
