//! Request dispatch over both engines.
//!
//! [`Engine`] owns an [`EngineConfig`] and turns a typed [`Request`] into a [`Response`], filling
//! omitted fields from configuration and enforcing the configured resource caps before any
//! numerical work starts.
//!
//! ```rust
//! use ferric_risk::api::{Engine, Request, Response};
//! use ferric_risk::core::EngineConfig;
//!
//! let engine = Engine::new(EngineConfig::default());
//! let request = Request::from_json_str(
//!     r#"{"operation": "merton_pd", "asset_value": 100.0, "debt_value": 80.0,
//!         "asset_volatility": 0.3, "risk_free_rate": 0.05, "time_to_maturity": 1.0}"#,
//! )
//! .unwrap();
//! match engine.dispatch(request).unwrap() {
//!     Response::MertonPd(r) => assert!(r.probability_of_default < 0.25),
//!     other => panic!("unexpected response {other:?}"),
//! }
//! ```

pub mod request;
pub mod response;

use tracing::debug;

pub use request::*;
pub use response::{Response, ScenarioResults};

use crate::core::config::EngineConfig;
use crate::core::error::{RiskError, RiskResult};
use crate::credit::{
    CreditMetricsSettings, CreditStressSettings, EstimationOptions, FirmInputs, KmvSettings,
    RatingModelType, TrainingData, TrainingOptions, calculate_credit_metrics_var,
    calculate_credit_spread, calculate_kmv_pd, calculate_merton_pd, calculate_portfolio_risk,
    estimate_asset_parameters, predict_credit_rating, run_credit_stress_test, train_rating_model,
};
use crate::risk::{
    AttributionMethod, BudgetOptions, ReturnDistribution, VarMethod, VarParams, backtest_var,
    calculate_incremental_var, calculate_risk_attribution, calculate_tail_risk_measures,
    calculate_var, optimize_risk_budget, run_market_stress_test, run_stress_test,
};

const DEFAULT_TAIL_LEVELS: [f64; 2] = [0.95, 0.99];

/// Stateless dispatcher bound to one configuration.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Wraps a configuration. Use [`EngineConfig::from_path`] or [`EngineConfig::validate`]
    /// to reject inconsistent configurations up front.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dispatch(&self, request: Request) -> RiskResult<Response> {
        let operation = request.operation();
        debug!(operation, "dispatching request");
        let response = match request {
            Request::CalculateVar(r) => Response::CalculateVar(self.var(r)?),
            Request::IncrementalVar(r) => Response::IncrementalVar(calculate_incremental_var(
                &r.portfolio,
                &r.new_position,
                self.confidence(r.confidence_level),
                self.horizon(r.time_horizon),
            )?),
            Request::RiskAttribution(r) => {
                let method = match r.method.as_deref() {
                    Some(m) => m.parse()?,
                    None => AttributionMethod::Asset,
                };
                Response::RiskAttribution(calculate_risk_attribution(
                    &r.portfolio,
                    method,
                    self.confidence(r.confidence_level),
                    self.horizon(r.time_horizon),
                    r.market_returns.as_deref(),
                )?)
            }
            Request::OptimizeRiskBudget(r) => {
                let defaults = BudgetOptions::from(self.config.optimizer);
                let options = BudgetOptions {
                    max_iterations: r.max_iterations.unwrap_or(defaults.max_iterations),
                    tolerance: r.tolerance.unwrap_or(defaults.tolerance),
                };
                Response::OptimizeRiskBudget(optimize_risk_budget(
                    &r.portfolio,
                    &r.risk_budget,
                    r.constraints.as_ref(),
                    &options,
                )?)
            }
            Request::TailRiskMeasures(r) => {
                let levels = r.confidence_levels.as_deref().unwrap_or(&DEFAULT_TAIL_LEVELS);
                Response::TailRiskMeasures(calculate_tail_risk_measures(&r.returns, levels)?)
            }
            Request::BacktestVar(r) => Response::BacktestVar(backtest_var(
                &r.returns,
                &r.var_forecasts,
                self.confidence(r.confidence_level),
            )?),
            Request::RiskStressTest(r) => {
                let scenarios = if r.scenarios.is_empty() {
                    self.config.stress.default_scenarios.as_slice()
                } else {
                    r.scenarios.as_slice()
                };
                let lgd = r.default_lgd.unwrap_or(self.config.credit.default_lgd);
                Response::RiskStressTest(ScenarioResults {
                    scenarios: run_stress_test(&r.portfolio, scenarios, lgd)?,
                })
            }
            Request::MarketStressTest(r) => Response::MarketStressTest(ScenarioResults {
                scenarios: run_market_stress_test(
                    &r.portfolio,
                    &r.scenarios,
                    self.confidence(r.confidence_level),
                    self.horizon(r.time_horizon),
                )?,
            }),
            Request::MertonPd(r) => {
                let inputs = FirmInputs::new(
                    r.asset_value,
                    r.debt_value,
                    r.asset_volatility,
                    r.risk_free_rate,
                    r.time_to_maturity,
                );
                Response::MertonPd(calculate_merton_pd(&inputs, self.lgd(r.loss_given_default))?)
            }
            Request::KmvPd(r) => {
                let inputs = FirmInputs::new(
                    r.asset_value,
                    r.debt_value,
                    r.asset_volatility,
                    r.risk_free_rate,
                    r.time_to_maturity,
                );
                let mut settings = KmvSettings::from(&self.config.credit);
                if let Some(threshold) = r.default_threshold {
                    settings = settings.with_threshold(threshold);
                }
                Response::KmvPd(calculate_kmv_pd(
                    &inputs,
                    self.lgd(r.loss_given_default),
                    &settings,
                )?)
            }
            Request::EstimateAssetParameters(r) => {
                let defaults = EstimationOptions::from(&self.config.estimation);
                let options = EstimationOptions {
                    tolerance: r.tolerance.unwrap_or(defaults.tolerance),
                    max_iterations: r.max_iterations.unwrap_or(defaults.max_iterations),
                };
                Response::EstimateAssetParameters(estimate_asset_parameters(
                    r.equity_value,
                    r.equity_volatility,
                    r.debt_value,
                    r.risk_free_rate,
                    r.time_to_maturity,
                    &options,
                )?)
            }
            Request::CreditSpread(r) => Response::CreditSpread(calculate_credit_spread(
                r.risk_free_rate,
                r.probability_of_default,
                self.lgd(r.loss_given_default),
                r.maturity,
            )?),
            Request::PortfolioCreditRisk(r) => {
                Response::PortfolioCreditRisk(calculate_portfolio_risk(
                    &r.portfolio,
                    self.lgd(r.default_lgd),
                    r.default_correlation
                        .unwrap_or(self.config.credit.default_correlation),
                )?)
            }
            Request::CreditMetricsVar(r) => {
                let cm = &self.config.credit_metrics;
                let trials = r.num_trials.unwrap_or(cm.num_trials);
                if trials == 0 || trials > cm.max_trials {
                    return Err(RiskError::invalid_parameter(
                        "num_trials",
                        format!("must be in [1, {}], got {trials}", cm.max_trials),
                    ));
                }
                let mut settings = CreditMetricsSettings::from(&self.config)
                    .with_trials(trials, r.seed.unwrap_or(cm.seed));
                if let Some(rho) = r.asset_correlation {
                    settings = settings.with_asset_correlation(rho);
                }
                if let Some(matrix) = r.transition_matrix {
                    settings.transition_matrix = matrix;
                }
                Response::CreditMetricsVar(calculate_credit_metrics_var(
                    &r.portfolio,
                    r.confidence_level.unwrap_or(cm.confidence_level),
                    &settings,
                )?)
            }
            Request::CreditStressTest(r) => {
                let mut settings = CreditStressSettings::from(&self.config);
                if let Some(c) = r.confidence_level {
                    settings.confidence_level = c;
                }
                Response::CreditStressTest(run_credit_stress_test(
                    &r.portfolio,
                    &r.scenarios,
                    &settings,
                )?)
            }
            Request::TrainRatingModel(r) => {
                let model_type = match r.model_type.as_deref() {
                    Some(m) => m.parse()?,
                    None => RatingModelType::Logistic,
                };
                let data = TrainingData {
                    records: r.records,
                    label_column: r.label_column,
                    feature_columns: r.feature_columns,
                };
                Response::TrainRatingModel(train_rating_model(
                    &data,
                    model_type,
                    &TrainingOptions::from(&self.config.estimation),
                )?)
            }
            Request::PredictCreditRating(r) => Response::PredictCreditRating(
                predict_credit_rating(&r.financial_data, &r.model, &self.config.credit.master_scale)?,
            ),
        };
        Ok(response)
    }

    fn var(&self, r: VarRequest) -> RiskResult<crate::risk::VarResult> {
        let v = &self.config.var;
        let method: VarMethod = r.method.parse()?;
        let distribution = match r.distribution.as_deref() {
            Some(d) => d.parse()?,
            None => ReturnDistribution::Normal,
        };
        let simulations = r.num_simulations.unwrap_or(v.default_num_simulations);
        if simulations > v.max_simulations {
            return Err(RiskError::invalid_parameter(
                "num_simulations",
                format!("must not exceed {}, got {simulations}", v.max_simulations),
            ));
        }
        let params = VarParams::new(method, self.confidence(r.confidence_level))
            .with_time_horizon(self.horizon(r.time_horizon))
            .with_simulations(simulations, r.seed.unwrap_or(v.default_seed))
            .with_distribution(distribution, r.degrees_of_freedom);
        calculate_var(&r.returns, &params)
    }

    fn confidence(&self, requested: Option<f64>) -> f64 {
        requested.unwrap_or(self.config.var.default_confidence_level)
    }

    fn horizon(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.config.var.default_time_horizon)
    }

    fn lgd(&self, requested: Option<f64>) -> f64 {
        requested.unwrap_or(self.config.credit.default_lgd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    #[test]
    fn unknown_method_is_rejected_at_the_boundary() {
        let request = Request::CalculateVar(VarRequest {
            returns: vec![0.01, -0.02, 0.015],
            method: "bootstrap".into(),
            confidence_level: None,
            time_horizon: None,
            num_simulations: None,
            distribution: None,
            degrees_of_freedom: None,
            seed: None,
        });
        assert!(matches!(
            engine().dispatch(request),
            Err(RiskError::InvalidMethod { .. })
        ));
    }

    #[test]
    fn simulation_cap_is_enforced() {
        let request = Request::CalculateVar(VarRequest {
            returns: vec![0.01, -0.02, 0.015, -0.005],
            method: "monte_carlo".into(),
            confidence_level: Some(0.95),
            time_horizon: None,
            num_simulations: Some(2_000_000),
            distribution: None,
            degrees_of_freedom: None,
            seed: None,
        });
        assert!(matches!(
            engine().dispatch(request),
            Err(RiskError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn credit_spread_uses_configured_lgd() {
        let response = engine()
            .dispatch(Request::CreditSpread(CreditSpreadRequest {
                risk_free_rate: 0.03,
                probability_of_default: 0.02,
                loss_given_default: None,
                maturity: 5.0,
            }))
            .unwrap();
        match response {
            Response::CreditSpread(r) => {
                assert!((r.expected_loss_rate - 0.02 * 0.45).abs() < 1e-15)
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn trial_cap_is_enforced() {
        let request = Request::CreditMetricsVar(CreditMetricsRequest {
            portfolio: crate::credit::CreditPortfolio::new(vec![
                crate::credit::CreditPosition::new("x", 1.0, 0.01),
            ]),
            confidence_level: None,
            num_trials: Some(5_000_000),
            seed: None,
            asset_correlation: None,
            transition_matrix: None,
        });
        assert!(matches!(
            engine().dispatch(request),
            Err(RiskError::InvalidParameter { .. })
        ));
    }
}
