//! Market risk namespace: VaR engines, portfolio aggregation and allocation layers.
//!
//! This module wires and re-exports:
//! - `var`: historical, parametric and Monte Carlo VaR/CVaR on a single return series,
//! - `portfolio`: variance-covariance portfolio VaR and incremental VaR,
//! - `attribution` + `budget`: Euler risk decomposition and risk-budget weights,
//! - `tail`: multi-level tail statistics and VaR backtesting,
//! - `stress`: PD/LGD stress scenarios on credit books and market shocks on portfolios.
//!
//! Domain logic lives in submodules; this file only defines the public import surface
//! (`ferric_risk::risk::*`).

pub mod attribution;
pub mod budget;
pub mod portfolio;
pub mod stress;
pub mod tail;
pub mod var;

pub use attribution::{
    AttributionMethod, RiskAttribution, RiskContribution, calculate_risk_attribution,
};
pub use budget::{
    BudgetOptions, BudgetStage, RiskBudgetResult, WeightConstraints, optimize_risk_budget,
};
pub use portfolio::{
    AssetClass, IncrementalVarResult, MarketPortfolio, MarketPosition, PortfolioVarResult,
    calculate_incremental_var, calculate_portfolio_var,
};
pub use stress::{
    MarketStressResult, MarketStressScenario, PositionPnl, StressScenario, StressTestResult,
    StressedPosition, run_market_stress_test, run_stress_test,
};
pub use tail::{TailLevel, TailRiskReport, VarBacktest, backtest_var, calculate_tail_risk_measures};
pub use var::{
    ReturnDistribution, VarMethod, VarParams, VarResult, calculate_var, cornish_fisher_var,
    historical_expected_shortfall, historical_var,
};
