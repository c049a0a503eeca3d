//! VaR / CVaR property and reference tests.
//!
//! Historical estimator: empirical (1 - c) quantile with linear interpolation at rank p (n - 1).
//! Parametric normal: VaR = -(mu + sigma Phi^{-1}(1 - c)), ES = -(mu - sigma phi(z) / (1 - c)).
//! Horizon scaling: sqrt(h) under i.i.d. returns.

use approx::assert_relative_eq;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use ferric_risk::core::RiskError;
use ferric_risk::math::{mean, normal_inv_cdf, normal_pdf, quantile_sorted, sample_std, sorted};
use ferric_risk::risk::{
    ReturnDistribution, VarMethod, VarParams, calculate_var, historical_expected_shortfall,
    historical_var,
};

fn normal_sample(seed: u64, n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let z: f64 = StandardNormal.sample(&mut rng);
            z
        })
        .collect()
}

fn scaled_sample(seed: u64, n: usize) -> Vec<f64> {
    normal_sample(seed, n)
        .into_iter()
        .map(|z| 0.0004 + 0.012 * z)
        .collect()
}

// ============================================================================
// Historical estimator
// ============================================================================

#[test]
fn historical_var_reproduces_interpolated_fifth_percentile() {
    let returns = normal_sample(42, 100);
    let s = sorted(&returns);

    let rank: f64 = (1.0 - 0.95) * 99.0;
    let lo = rank.floor() as usize;
    let manual = s[lo] + (rank - lo as f64) * (s[lo + 1] - s[lo]);
    let q = quantile_sorted(&s, 1.0 - 0.95);
    assert_relative_eq!(q, manual, epsilon = 1e-14);

    let first = historical_var(&returns, 0.95).unwrap();
    let second = historical_var(&returns, 0.95).unwrap();
    assert_eq!(first.to_bits(), second.to_bits());
    assert_eq!(first.to_bits(), (-q).max(0.0).to_bits());
}

#[test]
fn historical_es_averages_the_tail() {
    let returns = normal_sample(7, 200);
    let s = sorted(&returns);
    let q = quantile_sorted(&s, 0.05);
    let tail: Vec<f64> = s.iter().copied().filter(|r| *r <= q).collect();
    let es = historical_expected_shortfall(&returns, 0.95).unwrap();
    assert_relative_eq!(es, -mean(&tail), epsilon = 1e-12);
}

// ============================================================================
// Parametric estimator
// ============================================================================

#[test]
fn parametric_normal_matches_closed_form() {
    let returns = scaled_sample(3, 1_000);
    let (mu, sigma) = (mean(&returns), sample_std(&returns));
    for c in [0.90, 0.95, 0.99] {
        let r = calculate_var(&returns, &VarParams::new(VarMethod::Parametric, c)).unwrap();
        let z = normal_inv_cdf(1.0 - c);
        assert_relative_eq!(r.var, -(mu + sigma * z), max_relative = 1e-10);
        assert_relative_eq!(
            r.conditional_var,
            -(mu - sigma * normal_pdf(z) / (1.0 - c)),
            max_relative = 1e-10
        );
    }
}

#[test]
fn student_t_is_fatter_than_normal() {
    let returns = scaled_sample(11, 250);
    let normal = calculate_var(&returns, &VarParams::new(VarMethod::Parametric, 0.99)).unwrap();
    let t = calculate_var(
        &returns,
        &VarParams::new(VarMethod::Parametric, 0.99)
            .with_distribution(ReturnDistribution::StudentT, Some(4.0)),
    )
    .unwrap();
    assert!(t.var > normal.var);
    assert!(t.conditional_var >= t.var);
}

// ============================================================================
// Cross-method properties
// ============================================================================

#[test]
fn cvar_dominates_var_for_every_method() {
    let returns = scaled_sample(5, 500);
    for method in [VarMethod::Historical, VarMethod::Parametric, VarMethod::MonteCarlo] {
        for c in [0.9, 0.95, 0.99] {
            let r = calculate_var(&returns, &VarParams::new(method, c).with_simulations(20_000, 1))
                .unwrap();
            assert!(r.var >= 0.0, "{method} at {c}");
            assert!(r.conditional_var >= r.var, "{method} at {c}");
        }
    }
}

#[test]
fn horizon_scaling_is_square_root_of_time() {
    let returns = scaled_sample(9, 300);
    for method in [VarMethod::Historical, VarMethod::Parametric] {
        let r = calculate_var(&returns, &VarParams::new(method, 0.99).with_time_horizon(10))
            .unwrap();
        assert_relative_eq!(r.scaled_var, r.var * 10f64.sqrt(), max_relative = 1e-14);
        assert_relative_eq!(r.scaled_cvar, r.conditional_var * 10f64.sqrt(), max_relative = 1e-14);
    }
}

#[test]
fn monte_carlo_is_reproducible_by_seed() {
    let returns = scaled_sample(13, 250);
    let params = VarParams::new(VarMethod::MonteCarlo, 0.99).with_simulations(10_000, 2024);
    let a = calculate_var(&returns, &params).unwrap();
    let b = calculate_var(&returns, &params).unwrap();
    assert_eq!(a, b);

    let other = calculate_var(&returns, &params.clone().with_simulations(10_000, 2025)).unwrap();
    assert_ne!(a.var, other.var);
}

#[test]
fn invalid_inputs_are_typed() {
    assert!(matches!(
        calculate_var(&[], &VarParams::new(VarMethod::Historical, 0.95)),
        Err(RiskError::InsufficientData(_))
    ));
    assert!(matches!(
        calculate_var(&[0.01, -0.02, 0.03], &VarParams::new(VarMethod::Historical, 1.5)),
        Err(RiskError::InvalidParameter { .. })
    ));
    assert!(matches!(
        "garch".parse::<VarMethod>(),
        Err(RiskError::InvalidMethod { .. })
    ));
    assert!(matches!(
        calculate_var(
            &[0.01, -0.02, 0.03],
            &VarParams::new(VarMethod::Historical, 0.95).with_time_horizon(0)
        ),
        Err(RiskError::InvalidParameter { .. })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn historical_var_is_monotone_in_confidence(
        seed in any::<u64>(),
        c in 0.80f64..0.97,
        step in 0.0f64..0.02,
    ) {
        let returns = normal_sample(seed, 500);
        let lo = historical_var(&returns, c).unwrap();
        let hi = historical_var(&returns, c + step).unwrap();
        prop_assert!(hi >= lo);
    }

    #[test]
    fn parametric_var_is_monotone_in_confidence(
        seed in any::<u64>(),
        c in 0.80f64..0.98,
        step in 0.0f64..0.019,
    ) {
        let returns = scaled_sample(seed, 100);
        let lo = calculate_var(&returns, &VarParams::new(VarMethod::Parametric, c)).unwrap();
        let hi = calculate_var(&returns, &VarParams::new(VarMethod::Parametric, c + step)).unwrap();
        prop_assert!(hi.var >= lo.var);
        prop_assert!(hi.conditional_var >= lo.conditional_var);
    }
}
