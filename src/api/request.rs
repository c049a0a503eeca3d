//! Typed request payloads, one per operation.
//!
//! Optional fields fall back to [`EngineConfig`](crate::core::EngineConfig) values at dispatch.
//! Method and model names stay strings here and are parsed by the engine so unknown names surface
//! as [`RiskError::InvalidMethod`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{RiskError, RiskResult};
use crate::credit::portfolio::CreditPortfolio;
use crate::credit::rating_model::RatingModel;
use crate::credit::ratings::RatingTransitionMatrix;
use crate::risk::budget::WeightConstraints;
use crate::risk::portfolio::{MarketPortfolio, MarketPosition};
use crate::risk::stress::{MarketStressScenario, StressScenario};

/// Operation envelope: `{"operation": "<name>", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Request {
    CalculateVar(VarRequest),
    IncrementalVar(IncrementalVarRequest),
    RiskAttribution(AttributionRequest),
    OptimizeRiskBudget(RiskBudgetRequest),
    TailRiskMeasures(TailRiskRequest),
    BacktestVar(BacktestRequest),
    RiskStressTest(RiskStressRequest),
    MarketStressTest(MarketStressRequest),
    MertonPd(MertonRequest),
    KmvPd(KmvRequest),
    EstimateAssetParameters(AssetEstimationRequest),
    CreditSpread(CreditSpreadRequest),
    PortfolioCreditRisk(PortfolioCreditRequest),
    CreditMetricsVar(CreditMetricsRequest),
    CreditStressTest(CreditStressRequest),
    TrainRatingModel(TrainRatingModelRequest),
    PredictCreditRating(PredictRatingRequest),
}

impl Request {
    /// Parses a JSON request document. Malformed payloads are client errors.
    pub fn from_json_str(json: &str) -> RiskResult<Self> {
        serde_json::from_str(json).map_err(|e| RiskError::invalid_parameter("request", e.to_string()))
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::CalculateVar(_) => "calculate_var",
            Self::IncrementalVar(_) => "incremental_var",
            Self::RiskAttribution(_) => "risk_attribution",
            Self::OptimizeRiskBudget(_) => "optimize_risk_budget",
            Self::TailRiskMeasures(_) => "tail_risk_measures",
            Self::BacktestVar(_) => "backtest_var",
            Self::RiskStressTest(_) => "risk_stress_test",
            Self::MarketStressTest(_) => "market_stress_test",
            Self::MertonPd(_) => "merton_pd",
            Self::KmvPd(_) => "kmv_pd",
            Self::EstimateAssetParameters(_) => "estimate_asset_parameters",
            Self::CreditSpread(_) => "credit_spread",
            Self::PortfolioCreditRisk(_) => "portfolio_credit_risk",
            Self::CreditMetricsVar(_) => "credit_metrics_var",
            Self::CreditStressTest(_) => "credit_stress_test",
            Self::TrainRatingModel(_) => "train_rating_model",
            Self::PredictCreditRating(_) => "predict_credit_rating",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRequest {
    pub returns: Vec<f64>,
    /// `historical`, `parametric` or `monte_carlo`.
    pub method: String,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub time_horizon: Option<u32>,
    #[serde(default)]
    pub num_simulations: Option<usize>,
    /// `normal` or `t`.
    #[serde(default)]
    pub distribution: Option<String>,
    #[serde(default)]
    pub degrees_of_freedom: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalVarRequest {
    pub portfolio: MarketPortfolio,
    pub new_position: MarketPosition,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub time_horizon: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRequest {
    pub portfolio: MarketPortfolio,
    /// `asset`, `factor` or `systematic`; defaults to `asset`.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub time_horizon: Option<u32>,
    #[serde(default)]
    pub market_returns: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBudgetRequest {
    pub portfolio: MarketPortfolio,
    pub risk_budget: Vec<f64>,
    #[serde(default)]
    pub constraints: Option<WeightConstraints>,
    #[serde(default)]
    pub max_iterations: Option<usize>,
    #[serde(default)]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailRiskRequest {
    pub returns: Vec<f64>,
    /// Defaults to 0.95 and 0.99.
    #[serde(default)]
    pub confidence_levels: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub returns: Vec<f64>,
    pub var_forecasts: Vec<f64>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStressRequest {
    pub portfolio: CreditPortfolio,
    /// Empty runs the configured default scenarios.
    #[serde(default)]
    pub scenarios: Vec<StressScenario>,
    #[serde(default)]
    pub default_lgd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStressRequest {
    pub portfolio: MarketPortfolio,
    pub scenarios: Vec<MarketStressScenario>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub time_horizon: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MertonRequest {
    pub asset_value: f64,
    pub debt_value: f64,
    pub asset_volatility: f64,
    pub risk_free_rate: f64,
    pub time_to_maturity: f64,
    #[serde(default)]
    pub loss_given_default: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KmvRequest {
    pub asset_value: f64,
    pub debt_value: f64,
    pub asset_volatility: f64,
    pub risk_free_rate: f64,
    pub time_to_maturity: f64,
    #[serde(default)]
    pub loss_given_default: Option<f64>,
    /// Default point as a fraction of debt.
    #[serde(default)]
    pub default_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEstimationRequest {
    pub equity_value: f64,
    pub equity_volatility: f64,
    pub debt_value: f64,
    pub risk_free_rate: f64,
    pub time_to_maturity: f64,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditSpreadRequest {
    pub risk_free_rate: f64,
    pub probability_of_default: f64,
    #[serde(default)]
    pub loss_given_default: Option<f64>,
    pub maturity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioCreditRequest {
    pub portfolio: CreditPortfolio,
    #[serde(default)]
    pub default_correlation: Option<f64>,
    #[serde(default)]
    pub default_lgd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditMetricsRequest {
    pub portfolio: CreditPortfolio,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub num_trials: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub asset_correlation: Option<f64>,
    /// Replaces the configured matrix for this call.
    #[serde(default)]
    pub transition_matrix: Option<RatingTransitionMatrix>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditStressRequest {
    pub portfolio: CreditPortfolio,
    #[serde(default)]
    pub scenarios: Vec<StressScenario>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainRatingModelRequest {
    pub records: Vec<BTreeMap<String, f64>>,
    pub label_column: String,
    #[serde(default)]
    pub feature_columns: Option<Vec<String>>,
    /// `logistic` or `probit`; defaults to `logistic`.
    #[serde(default)]
    pub model_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRatingRequest {
    pub financial_data: BTreeMap<String, f64>,
    pub model: RatingModel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_tag_selects_the_variant() {
        let request = Request::from_json_str(
            r#"{"operation": "credit_spread", "risk_free_rate": 0.03,
                "probability_of_default": 0.02, "maturity": 5.0}"#,
        )
        .unwrap();
        assert_eq!(request.operation(), "credit_spread");
        match request {
            Request::CreditSpread(r) => {
                assert_eq!(r.loss_given_default, None);
                assert_eq!(r.maturity, 5.0);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn unknown_operation_is_a_client_error() {
        let err = Request::from_json_str(r#"{"operation": "price_swaption"}"#).unwrap_err();
        assert!(err.is_client_error());
    }
}
