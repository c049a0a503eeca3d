//! Merton (1974) structural default model.
//!
//! Equity is a European call on firm assets `V` struck at the debt face value `D`, maturing at
//! `T`. Under risk-neutral lognormal asset dynamics:
//!
//! - `d1 = (ln(V/D) + (r + s^2/2) T) / (s sqrt(T))`, `d2 = d1 - s sqrt(T)`,
//! - `PD = N(-d2)`, distance to default `d2`,
//! - `E = V N(d1) - D e^{-rT} N(d2)`, risky debt `B = V - E`,
//! - credit spread `-(1/T) ln(B / (D e^{-rT}))`, floored at zero.
//!
//! References:
//! - Merton, *On the Pricing of Corporate Debt* (1974).

use serde::{Deserialize, Serialize};

use crate::core::error::{RiskResult, ensure_finite, ensure_positive, ensure_unit_interval};
use crate::math::normal_cdf;

/// Balance-sheet inputs of a structural model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FirmInputs {
    pub asset_value: f64,
    /// Face value of debt due at `time_to_maturity`.
    pub debt_value: f64,
    pub asset_volatility: f64,
    /// Continuously compounded; may be negative.
    pub risk_free_rate: f64,
    pub time_to_maturity: f64,
}

impl FirmInputs {
    pub fn new(
        asset_value: f64,
        debt_value: f64,
        asset_volatility: f64,
        risk_free_rate: f64,
        time_to_maturity: f64,
    ) -> Self {
        Self {
            asset_value,
            debt_value,
            asset_volatility,
            risk_free_rate,
            time_to_maturity,
        }
    }

    pub fn validate(&self) -> RiskResult<()> {
        ensure_positive("asset_value", self.asset_value)?;
        ensure_positive("debt_value", self.debt_value)?;
        ensure_positive("asset_volatility", self.asset_volatility)?;
        ensure_finite("risk_free_rate", self.risk_free_rate)?;
        ensure_positive("time_to_maturity", self.time_to_maturity)
    }

    pub(crate) fn discounted_debt(&self) -> f64 {
        self.debt_value * (-self.risk_free_rate * self.time_to_maturity).exp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MertonResult {
    pub probability_of_default: f64,
    /// `d2`; negative when default is more likely than not.
    pub distance_to_default: f64,
    pub d1: f64,
    pub loss_given_default: f64,
    /// `PD * LGD * D`.
    pub expected_loss: f64,
    pub equity_value: f64,
    pub risky_debt_value: f64,
    /// Annualised continuously compounded spread over the risk-free rate.
    pub credit_spread: f64,
}

/// `(d1, d2)` for asset value `v`, debt `d`, volatility `sigma`, rate `r`, maturity `t`.
#[inline]
pub(crate) fn merton_d1_d2(v: f64, d: f64, sigma: f64, r: f64, t: f64) -> (f64, f64) {
    let vol_sqrt_t = sigma * t.sqrt();
    let d1 = ((v / d).ln() + (r + 0.5 * sigma * sigma) * t) / vol_sqrt_t;
    (d1, d1 - vol_sqrt_t)
}

/// Merton equity value `V N(d1) - D e^{-rT} N(d2)`.
pub(crate) fn merton_equity_value(v: f64, d: f64, sigma: f64, r: f64, t: f64) -> f64 {
    let (d1, d2) = merton_d1_d2(v, d, sigma, r, t);
    v * normal_cdf(d1) - d * (-r * t).exp() * normal_cdf(d2)
}

/// Structural PD and valuation of a firm under the Merton model.
///
/// # Examples
/// ```rust
/// use ferric_risk::credit::merton::{FirmInputs, calculate_merton_pd};
///
/// let r = calculate_merton_pd(&FirmInputs::new(100.0, 80.0, 0.3, 0.05, 1.0), 0.45).unwrap();
/// assert!((r.distance_to_default - 0.7605).abs() < 1e-4);
/// ```
pub fn calculate_merton_pd(inputs: &FirmInputs, lgd: f64) -> RiskResult<MertonResult> {
    inputs.validate()?;
    ensure_unit_interval("loss_given_default", lgd)?;

    let FirmInputs {
        asset_value: v,
        debt_value: d,
        asset_volatility: sigma,
        risk_free_rate: r,
        time_to_maturity: t,
    } = *inputs;

    let (d1, d2) = merton_d1_d2(v, d, sigma, r, t);
    let pd = normal_cdf(-d2);
    let discounted = inputs.discounted_debt();
    let equity_value = v * normal_cdf(d1) - discounted * normal_cdf(d2);
    let risky_debt_value = v - equity_value;

    let credit_spread = if risky_debt_value > 0.0 {
        (-(risky_debt_value / discounted).ln() / t).max(0.0)
    } else {
        0.0
    };

    Ok(MertonResult {
        probability_of_default: pd,
        distance_to_default: d2,
        d1,
        loss_given_default: lgd,
        expected_loss: pd * lgd * d,
        equity_value,
        risky_debt_value,
        credit_spread,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::core::error::RiskError;

    fn base() -> FirmInputs {
        FirmInputs::new(100.0, 80.0, 0.3, 0.05, 1.0)
    }

    #[test]
    fn matches_hand_computed_reference() {
        let r = calculate_merton_pd(&base(), 0.45).unwrap();
        // ln(1.25) = 0.2231435513; d1 = (0.2231435513 + 0.095) / 0.3.
        assert_relative_eq!(r.d1, 1.060_478_5, epsilon = 1e-6);
        assert_relative_eq!(r.distance_to_default, 0.760_478_5, epsilon = 1e-6);
        assert_relative_eq!(r.probability_of_default, normal_cdf(-0.760_478_5), epsilon = 1e-6);
        assert_relative_eq!(r.expected_loss, r.probability_of_default * 0.45 * 80.0, epsilon = 1e-12);
        assert_relative_eq!(r.risky_debt_value + r.equity_value, 100.0, epsilon = 1e-12);
        assert!(r.credit_spread > 0.0);
    }

    #[test]
    fn risky_debt_is_worth_less_than_riskless_debt() {
        let r = calculate_merton_pd(&base(), 0.45).unwrap();
        assert!(r.risky_debt_value < base().discounted_debt());
    }

    #[test]
    fn pd_moves_with_leverage_and_volatility() {
        let pd = |v: f64, d: f64, s: f64| {
            calculate_merton_pd(&FirmInputs::new(v, d, s, 0.05, 1.0), 0.45)
                .unwrap()
                .probability_of_default
        };
        assert!(pd(100.0, 90.0, 0.3) > pd(100.0, 80.0, 0.3));
        assert!(pd(100.0, 80.0, 0.4) > pd(100.0, 80.0, 0.3));
        assert!(pd(120.0, 80.0, 0.3) < pd(100.0, 80.0, 0.3));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        for inputs in [
            FirmInputs::new(0.0, 80.0, 0.3, 0.05, 1.0),
            FirmInputs::new(100.0, -1.0, 0.3, 0.05, 1.0),
            FirmInputs::new(100.0, 80.0, 0.0, 0.05, 1.0),
            FirmInputs::new(100.0, 80.0, 0.3, f64::NAN, 1.0),
            FirmInputs::new(100.0, 80.0, 0.3, 0.05, 0.0),
        ] {
            assert!(matches!(
                calculate_merton_pd(&inputs, 0.45),
                Err(RiskError::InvalidParameter { .. })
            ));
        }
        assert!(calculate_merton_pd(&base(), 1.2).is_err());
    }

    #[test]
    fn negative_rates_are_accepted() {
        let r = calculate_merton_pd(&FirmInputs::new(100.0, 80.0, 0.3, -0.01, 2.0), 0.45).unwrap();
        assert!((0.0..=1.0).contains(&r.probability_of_default));
    }
}
