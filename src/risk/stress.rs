//! Deterministic stress tests.
//!
//! Two scenario families:
//! - [`StressScenario`] stresses default probabilities and loss severities of a credit book,
//!   `pd' = clamp(pd * f_pd + pd_shift, 0, 1)` and `lgd' = clamp(lgd * f_lgd + lgd_shift, 0, 1)`;
//! - [`MarketStressScenario`] applies instantaneous equity and rate shocks to a market portfolio
//!   and re-evaluates variance-covariance VaR under shocked volatilities and correlations.
//!
//! Results are keyed by scenario name; names must be unique within one run.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::portfolio::{AssetClass, CovarianceModel, MarketPortfolio, var_multiplier};
use crate::core::error::{RiskError, RiskResult, ensure_finite, ensure_unit_interval};
use crate::credit::portfolio::CreditPortfolio;

fn unit_factor() -> f64 {
    1.0
}

/// Credit stress scenario. Factors multiply, shifts add; factors default to 1 and shifts to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub name: String,
    #[serde(default = "unit_factor")]
    pub pd_stress_factor: f64,
    #[serde(default = "unit_factor")]
    pub lgd_stress_factor: f64,
    #[serde(default)]
    pub pd_shift: f64,
    #[serde(default)]
    pub lgd_shift: f64,
}

impl StressScenario {
    pub fn new(name: impl Into<String>, pd_stress_factor: f64, lgd_stress_factor: f64) -> Self {
        Self {
            name: name.into(),
            pd_stress_factor,
            lgd_stress_factor,
            pd_shift: 0.0,
            lgd_shift: 0.0,
        }
    }

    pub fn with_shifts(mut self, pd_shift: f64, lgd_shift: f64) -> Self {
        self.pd_shift = pd_shift;
        self.lgd_shift = lgd_shift;
        self
    }

    pub fn validate(&self) -> RiskResult<()> {
        if self.name.trim().is_empty() {
            return Err(RiskError::invalid_parameter("scenario.name", "must not be empty"));
        }
        for (field, value) in [
            ("pd_stress_factor", self.pd_stress_factor),
            ("lgd_stress_factor", self.lgd_stress_factor),
        ] {
            if !(value.is_finite() && value >= 1.0) {
                return Err(RiskError::invalid_parameter(
                    format!("{}.{field}", self.name),
                    format!("must be finite and >= 1, got {value}"),
                ));
            }
        }
        for (field, value) in [("pd_shift", self.pd_shift), ("lgd_shift", self.lgd_shift)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(RiskError::invalid_parameter(
                    format!("{}.{field}", self.name),
                    format!("must be finite and >= 0, got {value}"),
                ));
            }
        }
        Ok(())
    }

    pub fn stressed_pd(&self, pd: f64) -> f64 {
        (pd * self.pd_stress_factor + self.pd_shift).clamp(0.0, 1.0)
    }

    pub fn stressed_lgd(&self, lgd: f64) -> f64 {
        (lgd * self.lgd_stress_factor + self.lgd_shift).clamp(0.0, 1.0)
    }
}

/// Position line under one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressedPosition {
    pub name: String,
    pub exposure: f64,
    pub stressed_pd: f64,
    pub stressed_lgd: f64,
    pub stressed_expected_loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub scenario: StressScenario,
    /// Exposure-weighted stressed PD.
    pub stressed_pd: f64,
    /// Exposure-weighted stressed LGD.
    pub stressed_lgd: f64,
    pub baseline_expected_loss: f64,
    pub stressed_expected_loss: f64,
    pub expected_loss_change: f64,
    pub positions: Vec<StressedPosition>,
}

pub(crate) fn check_unique_names<'a>(names: impl Iterator<Item = &'a str>) -> RiskResult<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(RiskError::invalid_parameter(
                "scenarios",
                format!("duplicate scenario name `{name}`"),
            ));
        }
    }
    Ok(())
}

/// Applies each scenario to every position of a credit book.
///
/// Positions without an explicit LGD use `default_lgd`.
pub fn run_stress_test(
    portfolio: &CreditPortfolio,
    scenarios: &[StressScenario],
    default_lgd: f64,
) -> RiskResult<BTreeMap<String, StressTestResult>> {
    ensure_unit_interval("default_lgd", default_lgd)?;
    let total_exposure = portfolio.validate()?;
    if scenarios.is_empty() {
        return Err(RiskError::invalid_parameter(
            "scenarios",
            "at least one scenario is required",
        ));
    }
    for s in scenarios {
        s.validate()?;
    }
    check_unique_names(scenarios.iter().map(|s| s.name.as_str()))?;

    let baseline_expected_loss: f64 = portfolio
        .positions
        .iter()
        .map(|p| p.exposure * p.probability_of_default * p.lgd_or(default_lgd))
        .sum();

    let mut results = BTreeMap::new();
    for scenario in scenarios {
        let positions: Vec<StressedPosition> = portfolio
            .positions
            .iter()
            .map(|p| {
                let pd = scenario.stressed_pd(p.probability_of_default);
                let lgd = scenario.stressed_lgd(p.lgd_or(default_lgd));
                StressedPosition {
                    name: p.name.clone(),
                    exposure: p.exposure,
                    stressed_pd: pd,
                    stressed_lgd: lgd,
                    stressed_expected_loss: p.exposure * pd * lgd,
                }
            })
            .collect();

        let weighted = |f: fn(&StressedPosition) -> f64| -> f64 {
            positions.iter().map(|p| p.exposure * f(p)).sum::<f64>() / total_exposure
        };
        let stressed_expected_loss: f64 = positions.iter().map(|p| p.stressed_expected_loss).sum();

        debug!(
            scenario = %scenario.name,
            baseline_expected_loss,
            stressed_expected_loss,
            "credit stress scenario evaluated"
        );

        results.insert(
            scenario.name.clone(),
            StressTestResult {
                scenario: scenario.clone(),
                stressed_pd: weighted(|p| p.stressed_pd),
                stressed_lgd: weighted(|p| p.stressed_lgd),
                baseline_expected_loss,
                stressed_expected_loss,
                expected_loss_change: stressed_expected_loss - baseline_expected_loss,
                positions,
            },
        );
    }
    Ok(results)
}

/// Instantaneous market shock. All fields are signed decimals and default to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStressScenario {
    pub name: String,
    /// Relative equity move, e.g. `-0.30`.
    #[serde(default)]
    pub equity_shock: f64,
    /// Absolute parallel rate move, e.g. `0.02` for +200bp.
    #[serde(default)]
    pub interest_rate_shock: f64,
    /// Relative volatility move, `> -1`.
    #[serde(default)]
    pub volatility_shock: f64,
    /// Correlation blend in `[-1, 1]`: positive towards perfect correlation, negative towards zero.
    #[serde(default)]
    pub correlation_shock: f64,
}

impl MarketStressScenario {
    pub fn validate(&self) -> RiskResult<()> {
        if self.name.trim().is_empty() {
            return Err(RiskError::invalid_parameter("scenario.name", "must not be empty"));
        }
        ensure_finite("equity_shock", self.equity_shock)?;
        ensure_finite("interest_rate_shock", self.interest_rate_shock)?;
        if !(self.volatility_shock.is_finite() && self.volatility_shock > -1.0) {
            return Err(RiskError::invalid_parameter(
                format!("{}.volatility_shock", self.name),
                format!("must be > -1, got {}", self.volatility_shock),
            ));
        }
        if !(self.correlation_shock.is_finite() && self.correlation_shock.abs() <= 1.0) {
            return Err(RiskError::invalid_parameter(
                format!("{}.correlation_shock", self.name),
                format!("must be in [-1, 1], got {}", self.correlation_shock),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPnl {
    pub name: String,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStressResult {
    pub scenario: MarketStressScenario,
    /// Instantaneous P&L of the shock.
    pub pnl: f64,
    pub positions: Vec<PositionPnl>,
    /// Horizon-scaled VaR before the shock.
    pub base_var: f64,
    /// Horizon-scaled VaR under shocked volatilities and correlations.
    pub stressed_var: f64,
    pub var_change: f64,
}

/// Applies market shocks to a portfolio and re-evaluates its VaR.
///
/// Equity positions move by `equity_shock * value`; rates and credit positions carrying a
/// duration move by `-duration * value * interest_rate_shock`. Other classes take no
/// instantaneous P&L but still enter the stressed VaR.
pub fn run_market_stress_test(
    portfolio: &MarketPortfolio,
    scenarios: &[MarketStressScenario],
    confidence: f64,
    time_horizon: u32,
) -> RiskResult<BTreeMap<String, MarketStressResult>> {
    let z = var_multiplier(confidence, time_horizon)?;
    let model = CovarianceModel::from_portfolio(portfolio)?;
    if scenarios.is_empty() {
        return Err(RiskError::invalid_parameter(
            "scenarios",
            "at least one scenario is required",
        ));
    }
    for s in scenarios {
        s.validate()?;
    }
    check_unique_names(scenarios.iter().map(|s| s.name.as_str()))?;

    let scale = z * f64::from(time_horizon).sqrt();
    let base_var = (scale * model.volatility()).max(0.0);
    let vols: Vec<f64> = (0..model.names.len())
        .map(|i| model.covariance[(i, i)].max(0.0).sqrt())
        .collect();
    let correlation = correlation_from(&model.covariance, &vols);

    let mut results = BTreeMap::new();
    for scenario in scenarios {
        let positions: Vec<PositionPnl> = portfolio
            .positions
            .iter()
            .map(|p| PositionPnl {
                name: p.name.clone(),
                pnl: shock_pnl(p.asset_class, p.value, p.duration, scenario),
            })
            .collect();
        let pnl = positions.iter().map(|p| p.pnl).sum();

        let stressed_cov = stressed_covariance(&correlation, &vols, scenario);
        let variance = model.values.dot(&(&stressed_cov * &model.values));
        let stressed_var = (scale * variance.max(0.0).sqrt()).max(0.0);

        debug!(scenario = %scenario.name, pnl, base_var, stressed_var, "market stress evaluated");

        results.insert(
            scenario.name.clone(),
            MarketStressResult {
                scenario: scenario.clone(),
                pnl,
                positions,
                base_var,
                stressed_var,
                var_change: stressed_var - base_var,
            },
        );
    }
    Ok(results)
}

fn shock_pnl(
    asset_class: AssetClass,
    value: f64,
    duration: Option<f64>,
    scenario: &MarketStressScenario,
) -> f64 {
    match (asset_class, duration) {
        (AssetClass::Equity, _) => scenario.equity_shock * value,
        (AssetClass::Rates | AssetClass::Credit, Some(d)) => -d * value * scenario.interest_rate_shock,
        (AssetClass::Rates | AssetClass::Credit, None) => {
            if scenario.interest_rate_shock != 0.0 {
                warn!("rate-sensitive position without duration takes no rate shock");
            }
            0.0
        }
        _ => 0.0,
    }
}

fn correlation_from(covariance: &DMatrix<f64>, vols: &[f64]) -> DMatrix<f64> {
    let n = vols.len();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else if vols[i] > 0.0 && vols[j] > 0.0 {
            (covariance[(i, j)] / (vols[i] * vols[j])).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    })
}

/// `D C' D` with `D = diag(vol * (1 + vol_shock))` and `C'` the blended correlation. Both blend
/// targets (all-ones and identity) are PSD, so convex combinations stay PSD.
fn stressed_covariance(
    correlation: &DMatrix<f64>,
    vols: &[f64],
    scenario: &MarketStressScenario,
) -> DMatrix<f64> {
    let n = vols.len();
    let c = scenario.correlation_shock;
    let vol_scale = 1.0 + scenario.volatility_shock;
    DMatrix::from_fn(n, n, |i, j| {
        let rho = correlation[(i, j)];
        let blended = if i == j {
            1.0
        } else if c >= 0.0 {
            (1.0 - c) * rho + c
        } else {
            (1.0 + c) * rho
        };
        blended * vols[i] * vols[j] * vol_scale * vol_scale
    })
}
