//! Reduced-form credit spread from PD and LGD.
//!
//! A zero-coupon claim losing `LGD` with probability `PD` over `T` years is worth
//! `(1 - PD * LGD)` of its risk-free value, so the continuously compounded annual spread is
//! `-ln(1 - PD * LGD) / T`.

use serde::{Deserialize, Serialize};

use crate::core::error::{RiskError, RiskResult, ensure_finite, ensure_positive, ensure_unit_interval};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditSpreadResult {
    pub credit_spread: f64,
    pub spread_bps: f64,
    pub risky_yield: f64,
    pub risk_free_rate: f64,
    /// `PD * LGD` over the maturity.
    pub expected_loss_rate: f64,
}

pub fn calculate_credit_spread(
    risk_free_rate: f64,
    probability_of_default: f64,
    lgd: f64,
    maturity: f64,
) -> RiskResult<CreditSpreadResult> {
    ensure_finite("risk_free_rate", risk_free_rate)?;
    ensure_unit_interval("probability_of_default", probability_of_default)?;
    ensure_unit_interval("loss_given_default", lgd)?;
    ensure_positive("maturity", maturity)?;

    let loss = probability_of_default * lgd;
    if loss >= 1.0 {
        return Err(RiskError::invalid_parameter(
            "probability_of_default",
            "PD * LGD = 1 implies an infinite spread",
        ));
    }

    let credit_spread = -(1.0 - loss).ln() / maturity;
    Ok(CreditSpreadResult {
        credit_spread,
        spread_bps: credit_spread * 10_000.0,
        risky_yield: risk_free_rate + credit_spread,
        risk_free_rate,
        expected_loss_rate: loss,
    })
}
