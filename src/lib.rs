//! ferric-risk is the quantitative core of a valuation backend: a market VaR engine and a credit
//! risk engine behind one typed error and one configuration value.
//!
//! The market side covers historical, parametric and Monte Carlo VaR/CVaR, variance-covariance
//! portfolio VaR with incremental and Euler-attributed variants, risk-budget weights, tail
//! statistics with VaR backtests, and stress scenarios. The credit side covers Merton and KMV
//! structural PD, asset-parameter inversion, reduced-form spreads, portfolio expected and
//! unexpected loss, CreditMetrics migration VaR, ASRF credit stress tests and logistic/probit
//! rating models.
//!
//! Every function is pure: results depend only on explicit arguments, the
//! [`EngineConfig`](core::EngineConfig) passed in, and explicit seeds.
//!
//! References used across modules include:
//! - Jorion, *Value at Risk* (3rd ed.), Ch. 5-7 and 11.
//! - Merton (1974); Crosbie and Bohn, *Modeling Default Risk* (2003).
//! - J.P. Morgan, *CreditMetrics Technical Document* (1997).
//! - Roncalli, *Introduction to Risk Parity and Budgeting* (2013).
//!
//! # Quick Start
//! Historical VaR of a return series:
//! ```rust
//! use ferric_risk::risk::{VarMethod, VarParams, calculate_var};
//!
//! let returns: Vec<f64> = (0..250).map(|i| ((i * 37 % 101) as f64 - 50.0) / 2_000.0).collect();
//! let r = calculate_var(&returns, &VarParams::new(VarMethod::Historical, 0.99)).unwrap();
//! assert!(r.var > 0.0 && r.conditional_var >= r.var);
//! ```
//!
//! Merton default probability:
//! ```rust
//! use ferric_risk::credit::{FirmInputs, calculate_merton_pd};
//!
//! let r = calculate_merton_pd(&FirmInputs::new(100.0, 80.0, 0.3, 0.05, 1.0), 0.45).unwrap();
//! assert!((r.distance_to_default - 0.7605).abs() < 1e-4);
//! ```

pub mod api;
pub mod core;
pub mod credit;
pub mod math;
pub mod risk;
