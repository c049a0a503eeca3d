//! Market portfolios and variance-covariance aggregation.
//!
//! Portfolio VaR uses the zero-mean delta-normal convention over the sample covariance of the
//! aligned position return series:
//!
//! `sigma_p = sqrt(x' Sigma x)`, `VaR_p = z_c * sigma_p`, `VaR_p(h) = VaR_p * sqrt(h)`,
//!
//! where `x` holds signed position values in currency. Full sample correlation is used; no
//! independence assumption is made. Incremental VaR, attribution, risk budgeting and market stress
//! all build on the same [`CovarianceModel`], so their numbers reconcile.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{RiskError, RiskResult, ensure_confidence};
use crate::math::{covariance_matrix, normal_inv_cdf};

/// Asset class, used by market stress scenarios to route shocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    #[default]
    Equity,
    Rates,
    Credit,
    Commodity,
    Fx,
    Other,
}

/// Position with its periodic return history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPosition {
    pub name: String,
    /// Signed market value in currency (negative for shorts).
    pub value: f64,
    pub returns: Vec<f64>,
    #[serde(default)]
    pub asset_class: AssetClass,
    /// Modified duration for rate-sensitive positions.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl MarketPosition {
    pub fn new(name: impl Into<String>, value: f64, returns: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            value,
            returns,
            asset_class: AssetClass::Equity,
            duration: None,
        }
    }

    pub fn with_asset_class(mut self, asset_class: AssetClass, duration: Option<f64>) -> Self {
        self.asset_class = asset_class;
        self.duration = duration;
        self
    }
}

/// Ordered collection of market positions sharing one observation calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MarketPortfolio {
    pub positions: Vec<MarketPosition>,
}

impl MarketPortfolio {
    pub fn new(positions: Vec<MarketPosition>) -> Self {
        Self { positions }
    }

    pub fn add_position(&mut self, position: MarketPosition) {
        self.positions.push(position);
    }

    pub fn total_value(&self) -> f64 {
        self.positions.iter().map(|p| p.value).sum()
    }

    /// Checks alignment and finiteness; returns the common series length.
    pub fn validate(&self) -> RiskResult<usize> {
        let first = self
            .positions
            .first()
            .ok_or_else(|| RiskError::insufficient_data("portfolio has no positions"))?;
        let len = first.returns.len();
        if len < 2 {
            return Err(RiskError::insufficient_data(format!(
                "position `{}` has {len} returns; at least 2 are required",
                first.name
            )));
        }
        for p in &self.positions {
            if !p.value.is_finite() {
                return Err(RiskError::invalid_parameter(
                    format!("positions[{}].value", p.name),
                    "must be finite",
                ));
            }
            if p.returns.len() != len {
                return Err(RiskError::invalid_parameter(
                    format!("positions[{}].returns", p.name),
                    format!("length {} differs from {len}", p.returns.len()),
                ));
            }
            if p.returns.iter().any(|r| !r.is_finite()) {
                return Err(RiskError::invalid_parameter(
                    format!("positions[{}].returns", p.name),
                    "contains non-finite values",
                ));
            }
        }
        Ok(len)
    }
}

/// Portfolio VaR under the variance-covariance convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioVarResult {
    pub confidence_level: f64,
    pub time_horizon: u32,
    pub var: f64,
    pub scaled_var: f64,
    /// One-period P&L standard deviation in currency.
    pub volatility: f64,
    pub total_value: f64,
    pub num_positions: usize,
    pub observations: usize,
}

/// VaR before and after adding a candidate position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IncrementalVarResult {
    pub confidence_level: f64,
    pub time_horizon: u32,
    pub var_before: f64,
    pub var_after: f64,
    pub incremental_var: f64,
}

/// Position values and return covariance of a validated portfolio.
#[derive(Debug, Clone)]
pub(crate) struct CovarianceModel {
    pub names: Vec<String>,
    pub values: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub observations: usize,
}

impl CovarianceModel {
    pub fn from_portfolio(portfolio: &MarketPortfolio) -> RiskResult<Self> {
        let observations = portfolio.validate()?;
        let series: Vec<&[f64]> = portfolio
            .positions
            .iter()
            .map(|p| p.returns.as_slice())
            .collect();
        Ok(Self {
            names: portfolio.positions.iter().map(|p| p.name.clone()).collect(),
            values: DVector::from_iterator(
                portfolio.positions.len(),
                portfolio.positions.iter().map(|p| p.value),
            ),
            covariance: covariance_matrix(&series),
            observations,
        })
    }

    /// `Sigma x`.
    pub fn covariance_times_values(&self) -> DVector<f64> {
        &self.covariance * &self.values
    }

    /// One-period P&L standard deviation `sqrt(x' Sigma x)`.
    pub fn volatility(&self) -> f64 {
        self.values.dot(&self.covariance_times_values()).max(0.0).sqrt()
    }
}

/// Horizon multiplier times the confidence quantile.
pub(crate) fn var_multiplier(confidence: f64, time_horizon: u32) -> RiskResult<f64> {
    ensure_confidence("confidence_level", confidence)?;
    if time_horizon == 0 {
        return Err(RiskError::invalid_parameter("time_horizon", "must be >= 1"));
    }
    Ok(normal_inv_cdf(confidence))
}

/// Variance-covariance VaR of a market portfolio.
pub fn calculate_portfolio_var(
    portfolio: &MarketPortfolio,
    confidence: f64,
    time_horizon: u32,
) -> RiskResult<PortfolioVarResult> {
    let z = var_multiplier(confidence, time_horizon)?;
    let model = CovarianceModel::from_portfolio(portfolio)?;
    let volatility = model.volatility();
    let var = (z * volatility).max(0.0);

    Ok(PortfolioVarResult {
        confidence_level: confidence,
        time_horizon,
        var,
        scaled_var: var * f64::from(time_horizon).sqrt(),
        volatility,
        total_value: portfolio.total_value(),
        num_positions: portfolio.positions.len(),
        observations: model.observations,
    })
}

/// Change in portfolio VaR from adding `new_position`.
///
/// The candidate is appended as its own line; an empty base portfolio has zero VaR. Both
/// figures are horizon-scaled.
pub fn calculate_incremental_var(
    portfolio: &MarketPortfolio,
    new_position: &MarketPosition,
    confidence: f64,
    time_horizon: u32,
) -> RiskResult<IncrementalVarResult> {
    var_multiplier(confidence, time_horizon)?;

    let var_before = if portfolio.positions.is_empty() {
        0.0
    } else {
        calculate_portfolio_var(portfolio, confidence, time_horizon)?.scaled_var
    };

    let mut extended = portfolio.clone();
    extended.add_position(new_position.clone());
    let var_after = calculate_portfolio_var(&extended, confidence, time_horizon)?.scaled_var;

    debug!(
        candidate = %new_position.name,
        var_before,
        var_after,
        "computed incremental VaR"
    );

    Ok(IncrementalVarResult {
        confidence_level: confidence,
        time_horizon,
        var_before,
        var_after,
        incremental_var: var_after - var_before,
    })
}
