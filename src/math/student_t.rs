//! Standard Student-t helpers used by the parametric and Monte Carlo VaR paths.

use statrs::distribution::{Continuous, ContinuousCDF, StudentsT};

use super::MathError;

fn standard_t(nu: f64) -> Result<StudentsT, MathError> {
    if !(nu.is_finite() && nu > 0.0) {
        return Err(MathError::InvalidInput("degrees of freedom must be finite and > 0"));
    }
    StudentsT::new(0.0, 1.0, nu).map_err(|_| MathError::InvalidInput("invalid Student-t"))
}

/// Quantile of the standard Student-t distribution with `nu` degrees of freedom.
pub fn student_t_quantile(p: f64, nu: f64) -> Result<f64, MathError> {
    if !(p > 0.0 && p < 1.0) {
        return Err(MathError::InvalidInput("probability must be in (0, 1)"));
    }
    Ok(standard_t(nu)?.inverse_cdf(p))
}

pub fn student_t_pdf(x: f64, nu: f64) -> Result<f64, MathError> {
    Ok(standard_t(nu)?.pdf(x))
}

/// Expected loss of a standard Student-t variable beyond its `confidence` quantile:
/// `E[X | X >= t_c] = f(t_c) (nu + t_c^2) / ((nu - 1)(1 - c))`. Requires `nu > 1`.
pub fn student_t_tail_expectation(confidence: f64, nu: f64) -> Result<f64, MathError> {
    if nu <= 1.0 {
        return Err(MathError::InvalidInput(
            "Student-t tail expectation requires nu > 1",
        ));
    }
    let t = student_t_quantile(confidence, nu)?;
    let density = student_t_pdf(t, nu)?;
    Ok(density * (nu + t * t) / ((nu - 1.0) * (1.0 - confidence)))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::math::normal_inv_cdf;

    #[test]
    fn quantile_matches_reference_table() {
        // t_{0.975, 10} = 2.228138851986.
        assert_relative_eq!(student_t_quantile(0.975, 10.0).unwrap(), 2.228_138_852, epsilon = 1e-6);
        assert_relative_eq!(student_t_quantile(0.5, 4.0).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn heavy_tail_exceeds_normal() {
        let t = student_t_tail_expectation(0.99, 4.0).unwrap();
        let q = student_t_quantile(0.99, 4.0).unwrap();
        assert!(t > q);
        assert!(q > normal_inv_cdf(0.99));
    }

    #[test]
    fn large_nu_approaches_normal_tail() {
        let es = student_t_tail_expectation(0.99, 500.0).unwrap();
        assert_relative_eq!(es, 2.665_214_220_345_8, epsilon = 2e-2);
    }

    #[test]
    fn rejects_invalid_degrees_of_freedom() {
        assert!(student_t_tail_expectation(0.95, 1.0).is_err());
        assert!(student_t_quantile(0.95, -2.0).is_err());
    }
}
