//! KMV-style distance to default and expected default frequency.
//!
//! The default point replaces the Merton strike: `DP = threshold * D`, with the threshold
//! defaulting to 0.75 (short-term debt plus half the long-term debt for a typical balance sheet).
//! Distance to default uses the physical drift proxy `r - s^2/2`:
//!
//! `DD = (ln(V / DP) + (r - s^2/2) T) / (s sqrt(T))`, `PD = N(-DD)`.
//!
//! The reported EDF is that PD clamped to an empirical floor and cap.

use serde::{Deserialize, Serialize};

use super::merton::FirmInputs;
use crate::core::config::CreditConfig;
use crate::core::error::{RiskError, RiskResult, ensure_unit_interval};
use crate::math::normal_cdf;

/// Default point and EDF clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KmvSettings {
    pub default_threshold: f64,
    pub edf_floor: f64,
    pub edf_cap: f64,
}

impl Default for KmvSettings {
    fn default() -> Self {
        Self::from(&CreditConfig::default())
    }
}

impl From<&CreditConfig> for KmvSettings {
    fn from(config: &CreditConfig) -> Self {
        Self {
            default_threshold: config.kmv_default_threshold,
            edf_floor: config.edf_floor,
            edf_cap: config.edf_cap,
        }
    }
}

impl KmvSettings {
    pub fn with_threshold(mut self, default_threshold: f64) -> Self {
        self.default_threshold = default_threshold;
        self
    }

    fn validate(&self) -> RiskResult<()> {
        if !(self.default_threshold.is_finite()
            && self.default_threshold > 0.0
            && self.default_threshold <= 1.0)
        {
            return Err(RiskError::invalid_parameter(
                "default_threshold",
                format!("must be in (0, 1], got {}", self.default_threshold),
            ));
        }
        ensure_unit_interval("edf_floor", self.edf_floor)?;
        ensure_unit_interval("edf_cap", self.edf_cap)?;
        if self.edf_floor > self.edf_cap {
            return Err(RiskError::invalid_parameter("edf_floor", "exceeds edf_cap"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KmvResult {
    pub default_point: f64,
    pub distance_to_default: f64,
    /// Unclamped `N(-DD)`.
    pub probability_of_default: f64,
    pub expected_default_frequency: f64,
    /// `EDF * LGD * D`.
    pub expected_loss: f64,
}

pub fn calculate_kmv_pd(
    inputs: &FirmInputs,
    lgd: f64,
    settings: &KmvSettings,
) -> RiskResult<KmvResult> {
    inputs.validate()?;
    ensure_unit_interval("loss_given_default", lgd)?;
    settings.validate()?;

    let default_point = settings.default_threshold * inputs.debt_value;
    let sigma = inputs.asset_volatility;
    let t = inputs.time_to_maturity;
    let distance_to_default = ((inputs.asset_value / default_point).ln()
        + (inputs.risk_free_rate - 0.5 * sigma * sigma) * t)
        / (sigma * t.sqrt());

    let pd = normal_cdf(-distance_to_default);
    let edf = pd.clamp(settings.edf_floor, settings.edf_cap);

    Ok(KmvResult {
        default_point,
        distance_to_default,
        probability_of_default: pd,
        expected_default_frequency: edf,
        expected_loss: edf * lgd * inputs.debt_value,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::credit::merton::calculate_merton_pd;

    #[test]
    fn default_point_is_a_fraction_of_debt() {
        let inputs = FirmInputs::new(100.0, 80.0, 0.3, 0.05, 1.0);
        let r = calculate_kmv_pd(&inputs, 0.45, &KmvSettings::default()).unwrap();
        assert_relative_eq!(r.default_point, 60.0);
        let expected_dd = ((100.0_f64 / 60.0).ln() + (0.05 - 0.045)) / 0.3;
        assert_relative_eq!(r.distance_to_default, expected_dd, epsilon = 1e-12);
        // A lower default point means a safer firm than the Merton strike at full face value.
        let merton = calculate_merton_pd(&inputs, 0.45).unwrap();
        assert!(r.probability_of_default < merton.probability_of_default);
    }

    #[test]
    fn edf_is_clamped() {
        let safe = FirmInputs::new(1_000.0, 10.0, 0.1, 0.02, 1.0);
        let r = calculate_kmv_pd(&safe, 0.45, &KmvSettings::default()).unwrap();
        assert_eq!(r.expected_default_frequency, 0.0001);

        let distressed = FirmInputs::new(50.0, 100.0, 0.5, 0.02, 1.0);
        let r = calculate_kmv_pd(&distressed, 0.45, &KmvSettings::default()).unwrap();
        assert!(r.probability_of_default > 0.35);
        assert_eq!(r.expected_default_frequency, 0.35);
    }

    #[test]
    fn threshold_must_be_in_unit_interval() {
        let inputs = FirmInputs::new(100.0, 80.0, 0.3, 0.05, 1.0);
        let settings = KmvSettings::default().with_threshold(1.5);
        assert!(matches!(
            calculate_kmv_pd(&inputs, 0.45, &settings),
            Err(RiskError::InvalidParameter { .. })
        ));
    }
}
