//! Statistical primitives: normal and Student-t distributions, sample statistics, and a
//! one-dimensional Newton solver.
//!
//! The standard normal CDF is evaluated through `erfc`, which keeps relative accuracy deep in
//! the tails where structural default probabilities live. The inverse CDF starts from Acklam's
//! rational approximation and applies one Halley correction against that CDF.

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::erfc;

pub mod sample;
pub mod student_t;

pub use sample::{
    SampleMoments, covariance, covariance_matrix, max_drawdown, mean, quantile_sorted,
    sample_std, sample_variance, sorted,
};
pub use student_t::{student_t_pdf, student_t_quantile, student_t_tail_expectation};

#[derive(Debug, Clone, PartialEq)]
pub enum MathError {
    NonConvergence { iterations: usize, residual: f64 },
    ZeroDerivative,
    InvalidInput(&'static str),
}

pub fn normal_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Inverse standard normal CDF. Returns `-inf`/`+inf` at 0 and 1 and NaN outside `[0, 1]`.
pub fn normal_inv_cdf(p: f64) -> f64 {
    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    let x = if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    // Halley step.
    let e = normal_cdf(x) - p;
    let u = e * (2.0 * PI).sqrt() * (0.5 * x * x).exp();
    x - u / (1.0 + 0.5 * x * u)
}

/// Root of `f` found by Newton iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonSolution {
    pub root: f64,
    pub iterations: usize,
}

/// Newton-Raphson on a closure returning `(f(x), f'(x))`.
///
/// Stops when `|f(x)| <= tol` or the step is below `tol * max(1, |x|)`.
pub fn newton_raphson<F>(
    mut f_df: F,
    x0: f64,
    tol: f64,
    max_iter: usize,
) -> Result<NewtonSolution, MathError>
where
    F: FnMut(f64) -> (f64, f64),
{
    if tol <= 0.0 {
        return Err(MathError::InvalidInput("tol must be positive"));
    }
    if max_iter == 0 {
        return Err(MathError::InvalidInput("max_iter must be > 0"));
    }

    let mut x = x0;
    let mut residual = f64::INFINITY;
    for iteration in 1..=max_iter {
        let (fx, dfx) = f_df(x);
        residual = fx.abs();
        if residual <= tol {
            return Ok(NewtonSolution {
                root: x,
                iterations: iteration,
            });
        }
        if dfx.abs() <= 1e-14 {
            return Err(MathError::ZeroDerivative);
        }
        let x_next = x - fx / dfx;
        if (x_next - x).abs() <= tol * x.abs().max(1.0) {
            return Ok(NewtonSolution {
                root: x_next,
                iterations: iteration,
            });
        }
        x = x_next;
    }

    Err(MathError::NonConvergence {
        iterations: max_iter,
        residual,
    })
}
