//! Euler risk attribution of variance-covariance portfolio VaR.
//!
//! Portfolio VaR `k * sqrt(x' Sigma x)` (with `k = z_c * sqrt(h)`) is homogeneous of degree one
//! in the position values, so Euler's theorem splits it exactly:
//!
//! - `asset`: `c_i = k * x_i (Sigma x)_i / sigma_p`, one line per position;
//! - `factor`: principal components of `Sigma`, `c_k = k * lambda_k * (v_k' x)^2 / sigma_p`;
//! - `systematic`: single-index split `Sigma = beta beta' var(m) + Sigma_idio`, with each position
//!   reporting its systematic and idiosyncratic Euler parts.
//!
//! In every case the contributions sum to the total VaR up to floating-point rounding.

use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};

use super::portfolio::{CovarianceModel, MarketPortfolio, var_multiplier};
use crate::core::error::{RiskError, RiskResult};
use crate::math::{covariance, sample_variance};

const MIN_VOLATILITY: f64 = 1.0e-300;

/// Attribution decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMethod {
    Asset,
    Factor,
    Systematic,
}

impl AttributionMethod {
    pub const EXPECTED: &'static str = "asset, factor, systematic";

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Factor => "factor",
            Self::Systematic => "systematic",
        }
    }
}

impl fmt::Display for AttributionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributionMethod {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asset" => Ok(Self::Asset),
            "factor" => Ok(Self::Factor),
            "systematic" => Ok(Self::Systematic),
            _ => Err(RiskError::InvalidMethod {
                method: s.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

/// One line of an attribution table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContribution {
    /// Position name, or `factor_k` for principal factors.
    pub name: String,
    pub contribution: f64,
    pub percent_of_total: f64,
    /// Sensitivity of VaR to one unit of the line's exposure.
    pub marginal_var: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub systematic: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idiosyncratic: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAttribution {
    pub method: AttributionMethod,
    pub confidence_level: f64,
    pub time_horizon: u32,
    /// Horizon-scaled portfolio VaR.
    pub total_var: f64,
    pub contributions: Vec<RiskContribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub systematic_var: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idiosyncratic_var: Option<f64>,
}

/// Decomposes portfolio VaR into additive contributions.
///
/// `market_returns` is only read by [`AttributionMethod::Systematic`]; when absent the
/// equal-weighted average of the position series serves as the market factor.
pub fn calculate_risk_attribution(
    portfolio: &MarketPortfolio,
    method: AttributionMethod,
    confidence: f64,
    time_horizon: u32,
    market_returns: Option<&[f64]>,
) -> RiskResult<RiskAttribution> {
    let z = var_multiplier(confidence, time_horizon)?;
    if confidence <= 0.5 {
        return Err(RiskError::invalid_parameter(
            "confidence_level",
            "attribution requires a confidence level above 0.5",
        ));
    }
    let model = CovarianceModel::from_portfolio(portfolio)?;
    let k = z * f64::from(time_horizon).sqrt();
    let sigma_p = model.volatility();
    let total_var = k * sigma_p;

    let mut attribution = RiskAttribution {
        method,
        confidence_level: confidence,
        time_horizon,
        total_var,
        contributions: Vec::new(),
        systematic_var: None,
        idiosyncratic_var: None,
    };

    match method {
        AttributionMethod::Asset => {
            let g = model.covariance_times_values();
            for (i, name) in model.names.iter().enumerate() {
                let marginal = scaled(k * g[i], sigma_p);
                attribution.contributions.push(line(
                    name.clone(),
                    model.values[i] * marginal,
                    marginal,
                    total_var,
                ));
            }
        }
        AttributionMethod::Factor => {
            let eigen = SymmetricEigen::new(model.covariance.clone());
            let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
            order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

            for (rank, &j) in order.iter().enumerate() {
                let lambda = eigen.eigenvalues[j];
                let exposure = eigen.eigenvectors.column(j).dot(&model.values);
                let marginal = scaled(k * lambda * exposure, sigma_p);
                attribution.contributions.push(line(
                    format!("factor_{}", rank + 1),
                    exposure * marginal,
                    marginal,
                    total_var,
                ));
            }
        }
        AttributionMethod::Systematic => {
            let market = market_factor(portfolio, market_returns, model.observations)?;
            let market_var = sample_variance(&market);
            let betas = DVector::from_iterator(
                portfolio.positions.len(),
                portfolio
                    .positions
                    .iter()
                    .map(|p| covariance(&p.returns, &market) / market_var),
            );
            let sigma_sys: DMatrix<f64> = &betas * betas.transpose() * market_var;
            let sigma_idio = &model.covariance - &sigma_sys;
            let g_sys = &sigma_sys * &model.values;
            let g_idio = &sigma_idio * &model.values;

            let mut sys_total = 0.0;
            let mut idio_total = 0.0;
            for (i, name) in model.names.iter().enumerate() {
                let sys = model.values[i] * scaled(k * g_sys[i], sigma_p);
                let idio = model.values[i] * scaled(k * g_idio[i], sigma_p);
                sys_total += sys;
                idio_total += idio;
                let mut entry = line(
                    name.clone(),
                    sys + idio,
                    scaled(k * (g_sys[i] + g_idio[i]), sigma_p),
                    total_var,
                );
                entry.systematic = Some(sys);
                entry.idiosyncratic = Some(idio);
                attribution.contributions.push(entry);
            }
            attribution.systematic_var = Some(sys_total);
            attribution.idiosyncratic_var = Some(idio_total);
        }
    }

    Ok(attribution)
}

fn scaled(numerator: f64, sigma_p: f64) -> f64 {
    if sigma_p < MIN_VOLATILITY {
        0.0
    } else {
        numerator / sigma_p
    }
}

fn line(name: String, contribution: f64, marginal_var: f64, total: f64) -> RiskContribution {
    RiskContribution {
        name,
        contribution,
        percent_of_total: if total > 0.0 {
            100.0 * contribution / total
        } else {
            0.0
        },
        marginal_var,
        systematic: None,
        idiosyncratic: None,
    }
}

fn market_factor(
    portfolio: &MarketPortfolio,
    market_returns: Option<&[f64]>,
    observations: usize,
) -> RiskResult<Vec<f64>> {
    let market = match market_returns {
        Some(m) => {
            if m.len() != observations {
                return Err(RiskError::invalid_parameter(
                    "market_returns",
                    format!("length {} differs from {observations}", m.len()),
                ));
            }
            if m.iter().any(|r| !r.is_finite()) {
                return Err(RiskError::invalid_parameter(
                    "market_returns",
                    "contains non-finite values",
                ));
            }
            m.to_vec()
        }
        None => {
            let n = portfolio.positions.len() as f64;
            (0..observations)
                .map(|t| portfolio.positions.iter().map(|p| p.returns[t]).sum::<f64>() / n)
                .collect()
        }
    };
    if sample_variance(&market) <= 0.0 {
        return Err(RiskError::invalid_parameter(
            "market_returns",
            "market factor has zero variance",
        ));
    }
    Ok(market)
}
