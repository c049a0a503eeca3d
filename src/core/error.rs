//! Typed failures surfaced by both engines.
//!
//! Every public entry point validates its inputs before any numerical work starts and reports the
//! first violated precondition. Callers translate the variants into transport-level status codes;
//! [`RiskError::is_client_error`] gives the usual split between request errors and engine faults.

use thiserror::Error;

/// Engine error taxonomy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// A numeric input violates a domain precondition.
    #[error("invalid parameter `{parameter}`: {reason}")]
    InvalidParameter { parameter: String, reason: String },

    /// A sample is empty or too small for the requested estimator.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Unknown method or model name.
    #[error("invalid method `{method}`, expected one of: {expected}")]
    InvalidMethod {
        method: String,
        expected: &'static str,
    },

    /// Training records are missing columns or labels.
    #[error("invalid training data: {0}")]
    InvalidTrainingData(String),

    /// A trained-model descriptor is malformed.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// An iterative estimator exhausted its iteration budget.
    #[error("estimation did not converge after {iterations} iterations (residual {residual:e})")]
    EstimationDidNotConverge { iterations: usize, residual: f64 },

    /// An optimizer exhausted its iteration budget.
    #[error("optimization did not converge after {iterations} iterations (residual {residual:e})")]
    OptimizationDidNotConverge { iterations: usize, residual: f64 },

    /// Configuration could not be parsed or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias used across the crate.
pub type RiskResult<T> = Result<T, RiskError>;

impl RiskError {
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn insufficient_data(reason: impl Into<String>) -> Self {
        Self::InsufficientData(reason.into())
    }

    /// `true` for failures caused by the request itself rather than by the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. }
                | Self::InsufficientData(_)
                | Self::InvalidMethod { .. }
                | Self::InvalidTrainingData(_)
                | Self::InvalidModel(_)
        )
    }
}

/// Fails unless `value` is finite.
pub(crate) fn ensure_finite(parameter: &str, value: f64) -> RiskResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RiskError::invalid_parameter(parameter, "must be finite"))
    }
}

/// Fails unless `value` is finite and strictly positive.
pub(crate) fn ensure_positive(parameter: &str, value: f64) -> RiskResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RiskError::invalid_parameter(
            parameter,
            format!("must be finite and > 0, got {value}"),
        ))
    }
}

/// Fails unless `value` lies in the closed unit interval.
pub(crate) fn ensure_unit_interval(parameter: &str, value: f64) -> RiskResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RiskError::invalid_parameter(
            parameter,
            format!("must be in [0, 1], got {value}"),
        ))
    }
}

/// Fails unless `confidence` lies in the open interval `(0, 1)`.
pub(crate) fn ensure_confidence(parameter: &str, confidence: f64) -> RiskResult<()> {
    if confidence.is_finite() && confidence > 0.0 && confidence < 1.0 {
        Ok(())
    } else {
        Err(RiskError::invalid_parameter(
            parameter,
            format!("must be in (0, 1), got {confidence}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_variants_are_client_errors() {
        assert!(RiskError::invalid_parameter("x", "bad").is_client_error());
        assert!(RiskError::insufficient_data("empty").is_client_error());
        assert!(
            !RiskError::EstimationDidNotConverge {
                iterations: 10,
                residual: 1.0
            }
            .is_client_error()
        );
    }

    #[test]
    fn messages_name_the_parameter() {
        let err = ensure_confidence("confidence_level", 1.5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid parameter `confidence_level`: must be in (0, 1), got 1.5"
        );
    }
}
