//! Response payloads. Each serializes to a flat JSON object tagged with its `operation`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::credit::credit_metrics::CreditMetricsResult;
use crate::credit::estimation::AssetEstimate;
use crate::credit::kmv::KmvResult;
use crate::credit::merton::MertonResult;
use crate::credit::portfolio::PortfolioCreditRisk;
use crate::credit::rating_model::{RatingModel, RatingPrediction};
use crate::credit::spread::CreditSpreadResult;
use crate::credit::stress::CreditStressReport;
use crate::risk::attribution::RiskAttribution;
use crate::risk::budget::RiskBudgetResult;
use crate::risk::portfolio::IncrementalVarResult;
use crate::risk::stress::{MarketStressResult, StressTestResult};
use crate::risk::tail::{TailRiskReport, VarBacktest};
use crate::risk::var::VarResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Response {
    CalculateVar(VarResult),
    IncrementalVar(IncrementalVarResult),
    RiskAttribution(RiskAttribution),
    OptimizeRiskBudget(RiskBudgetResult),
    TailRiskMeasures(TailRiskReport),
    BacktestVar(VarBacktest),
    RiskStressTest(ScenarioResults<StressTestResult>),
    MarketStressTest(ScenarioResults<MarketStressResult>),
    MertonPd(MertonResult),
    KmvPd(KmvResult),
    EstimateAssetParameters(AssetEstimate),
    CreditSpread(CreditSpreadResult),
    PortfolioCreditRisk(PortfolioCreditRisk),
    CreditMetricsVar(CreditMetricsResult),
    CreditStressTest(CreditStressReport),
    TrainRatingModel(RatingModel),
    PredictCreditRating(RatingPrediction),
}

/// Per-scenario results keyed by scenario name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResults<T> {
    pub scenarios: BTreeMap<String, T>,
}

impl Response {
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}
