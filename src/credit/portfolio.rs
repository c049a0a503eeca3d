//! Credit positions and portfolio expected / unexpected loss.
//!
//! Per position: `EL_i = e_i pd_i lgd_i`, standalone `UL_i = e_i lgd_i sqrt(pd_i (1 - pd_i))`.
//! Lines that share a name are one obligor: they default together, so their expected and
//! standalone unexpected losses add before aggregation. Across obligors, portfolio unexpected
//! loss uses a single pairwise default correlation `rho`:
//! `UL_p = sqrt(sum_ij rho_ij UL_i UL_j)` with `rho_ii = 1`. Each obligor's Euler share
//! `UL_i (rho sum_j UL_j + (1 - rho) UL_i) / UL_p` sums to `UL_p`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{RiskError, RiskResult, ensure_confidence, ensure_unit_interval};
use crate::math::{normal_cdf, normal_inv_cdf};

/// One obligor exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPosition {
    pub name: String,
    /// Exposure at default, in currency.
    pub exposure: f64,
    pub probability_of_default: f64,
    /// Falls back to the configured default LGD when absent.
    #[serde(default)]
    pub loss_given_default: Option<f64>,
    /// Rating label on the configured scale; mapped from PD when absent.
    #[serde(default)]
    pub rating: Option<String>,
    /// Remaining maturity in years; falls back to the configured default when absent.
    #[serde(default)]
    pub maturity: Option<f64>,
}

impl CreditPosition {
    pub fn new(name: impl Into<String>, exposure: f64, probability_of_default: f64) -> Self {
        Self {
            name: name.into(),
            exposure,
            probability_of_default,
            loss_given_default: None,
            rating: None,
            maturity: None,
        }
    }

    pub fn with_lgd(mut self, lgd: f64) -> Self {
        self.loss_given_default = Some(lgd);
        self
    }

    pub fn with_rating(mut self, rating: impl Into<String>) -> Self {
        self.rating = Some(rating.into());
        self
    }

    pub fn with_maturity(mut self, maturity: f64) -> Self {
        self.maturity = Some(maturity);
        self
    }

    #[inline]
    pub fn lgd_or(&self, default_lgd: f64) -> f64 {
        self.loss_given_default.unwrap_or(default_lgd)
    }

    #[inline]
    pub fn maturity_or(&self, default_maturity: f64) -> f64 {
        self.maturity.unwrap_or(default_maturity)
    }
}

/// Ordered credit book. Repeated names are lines of one obligor and aggregate additively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CreditPortfolio {
    pub positions: Vec<CreditPosition>,
}

impl CreditPortfolio {
    pub fn new(positions: Vec<CreditPosition>) -> Self {
        Self { positions }
    }

    pub fn total_exposure(&self) -> f64 {
        self.positions.iter().map(|p| p.exposure).sum()
    }

    /// Checks every line and returns the total exposure, which must be positive.
    pub fn validate(&self) -> RiskResult<f64> {
        if self.positions.is_empty() {
            return Err(RiskError::insufficient_data("credit portfolio has no positions"));
        }
        for p in &self.positions {
            if !(p.exposure.is_finite() && p.exposure >= 0.0) {
                return Err(RiskError::invalid_parameter(
                    format!("positions[{}].exposure", p.name),
                    format!("must be finite and >= 0, got {}", p.exposure),
                ));
            }
            ensure_unit_interval(
                &format!("positions[{}].probability_of_default", p.name),
                p.probability_of_default,
            )?;
            if let Some(lgd) = p.loss_given_default {
                ensure_unit_interval(&format!("positions[{}].loss_given_default", p.name), lgd)?;
            }
            if let Some(m) = p.maturity {
                if !(m.is_finite() && m > 0.0) {
                    return Err(RiskError::invalid_parameter(
                        format!("positions[{}].maturity", p.name),
                        format!("must be finite and > 0, got {m}"),
                    ));
                }
            }
        }
        let total = self.total_exposure();
        if total <= 0.0 {
            return Err(RiskError::insufficient_data("credit portfolio has zero total exposure"));
        }
        Ok(total)
    }
}

/// Risk of one obligor, all of its lines merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionCreditRisk {
    pub name: String,
    pub exposure: f64,
    /// Exposure-weighted PD of the obligor's lines.
    pub probability_of_default: f64,
    /// Effective LGD, `expected_loss / (exposure * probability_of_default)` when that is defined.
    pub loss_given_default: f64,
    pub expected_loss: f64,
    /// Standalone unexpected loss.
    pub unexpected_loss: f64,
    /// Euler share of portfolio unexpected loss.
    pub risk_contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioCreditRisk {
    pub total_exposure: f64,
    /// Exposure-weighted PD.
    pub portfolio_pd: f64,
    pub expected_loss: f64,
    pub expected_loss_rate: f64,
    pub unexpected_loss: f64,
    /// Sum of standalone unexpected losses.
    pub standalone_unexpected_loss: f64,
    /// `1 - UL_p / sum(UL_i)`.
    pub diversification_benefit: f64,
    pub default_correlation: f64,
    /// Number of distinct obligors.
    pub num_positions: usize,
    /// One entry per obligor, in order of first appearance.
    pub positions: Vec<PositionCreditRisk>,
}

/// Running sums of one obligor's lines.
struct Obligor {
    name: String,
    exposure: f64,
    /// `sum e_i pd_i`
    weighted_pd: f64,
    /// `sum e_i lgd_i`
    weighted_lgd: f64,
    expected_loss: f64,
    unexpected_loss: f64,
    first_pd: f64,
    first_lgd: f64,
}

impl Obligor {
    fn into_line(self) -> PositionCreditRisk {
        let (pd, lgd) = if self.exposure > 0.0 {
            let pd = self.weighted_pd / self.exposure;
            let lgd = if self.weighted_pd > 0.0 {
                self.expected_loss / self.weighted_pd
            } else {
                self.weighted_lgd / self.exposure
            };
            (pd, lgd)
        } else {
            (self.first_pd, self.first_lgd)
        };
        PositionCreditRisk {
            name: self.name,
            exposure: self.exposure,
            probability_of_default: pd,
            loss_given_default: lgd,
            expected_loss: self.expected_loss,
            unexpected_loss: self.unexpected_loss,
            risk_contribution: 0.0,
        }
    }
}

fn merge_obligors(portfolio: &CreditPortfolio, default_lgd: f64) -> Vec<PositionCreditRisk> {
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut obligors: Vec<Obligor> = Vec::new();
    for p in &portfolio.positions {
        let pd = p.probability_of_default;
        let lgd = p.lgd_or(default_lgd);
        let slot = *index.entry(p.name.as_str()).or_insert_with(|| {
            obligors.push(Obligor {
                name: p.name.clone(),
                exposure: 0.0,
                weighted_pd: 0.0,
                weighted_lgd: 0.0,
                expected_loss: 0.0,
                unexpected_loss: 0.0,
                first_pd: pd,
                first_lgd: lgd,
            });
            obligors.len() - 1
        });
        let o = &mut obligors[slot];
        o.exposure += p.exposure;
        o.weighted_pd += p.exposure * pd;
        o.weighted_lgd += p.exposure * lgd;
        o.expected_loss += p.exposure * pd * lgd;
        o.unexpected_loss += p.exposure * lgd * (pd * (1.0 - pd)).sqrt();
    }
    obligors.into_iter().map(Obligor::into_line).collect()
}

/// Expected and unexpected loss of a credit book, aggregated per obligor name.
pub fn calculate_portfolio_risk(
    portfolio: &CreditPortfolio,
    default_lgd: f64,
    default_correlation: f64,
) -> RiskResult<PortfolioCreditRisk> {
    ensure_unit_interval("default_lgd", default_lgd)?;
    ensure_unit_interval("default_correlation", default_correlation)?;
    let total_exposure = portfolio.validate()?;
    let rho = default_correlation;

    let mut lines = merge_obligors(portfolio, default_lgd);

    let standalone: f64 = lines.iter().map(|l| l.unexpected_loss).sum();
    let squares: f64 = lines.iter().map(|l| l.unexpected_loss * l.unexpected_loss).sum();
    // sum_ij rho_ij UL_i UL_j = rho (sum UL)^2 + (1 - rho) sum UL^2.
    let unexpected_loss = (rho * standalone * standalone + (1.0 - rho) * squares)
        .max(0.0)
        .sqrt();

    if unexpected_loss > 0.0 {
        for l in &mut lines {
            l.risk_contribution = l.unexpected_loss
                * (rho * standalone + (1.0 - rho) * l.unexpected_loss)
                / unexpected_loss;
        }
    }

    let expected_loss: f64 = lines.iter().map(|l| l.expected_loss).sum();
    let weighted_pd: f64 = lines.iter().map(|l| l.exposure * l.probability_of_default).sum();

    Ok(PortfolioCreditRisk {
        total_exposure,
        portfolio_pd: weighted_pd / total_exposure,
        expected_loss,
        expected_loss_rate: expected_loss / total_exposure,
        unexpected_loss,
        standalone_unexpected_loss: standalone,
        diversification_benefit: if standalone > 0.0 {
            1.0 - unexpected_loss / standalone
        } else {
            0.0
        },
        default_correlation: rho,
        num_positions: lines.len(),
        positions: lines,
    })
}

/// Vasicek conditional PD at the `confidence` quantile of the systematic factor:
/// `N((N^-1(pd) + sqrt(rho) N^-1(c)) / sqrt(1 - rho))`.
pub(crate) fn vasicek_conditional_pd(pd: f64, rho: f64, confidence: f64) -> RiskResult<f64> {
    ensure_confidence("confidence_level", confidence)?;
    if !(rho.is_finite() && (0.0..1.0).contains(&rho)) {
        return Err(RiskError::invalid_parameter(
            "asset_correlation",
            format!("must be in [0, 1), got {rho}"),
        ));
    }
    if pd <= 0.0 {
        return Ok(0.0);
    }
    if pd >= 1.0 {
        return Ok(1.0);
    }
    let arg = (normal_inv_cdf(pd) + rho.sqrt() * normal_inv_cdf(confidence)) / (1.0 - rho).sqrt();
    Ok(normal_cdf(arg))
}
