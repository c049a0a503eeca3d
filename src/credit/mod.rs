//! Credit-risk engine: structural default models, portfolio loss, rating migration and
//! rating models.
//!
//! - `merton`, `kmv`, `estimation`: single-firm structural PD and asset-parameter inversion,
//! - `spread`: reduced-form spread from PD and LGD,
//! - `portfolio`: expected and unexpected loss of a credit book,
//! - `credit_metrics`: simulated rating-migration credit VaR,
//! - `stress`: stressed loss metrics with ASRF credit VaR,
//! - `ratings` + `rating_model`: rating scales, transition matrices and logistic/probit PD models.

pub mod credit_metrics;
pub mod estimation;
pub mod kmv;
pub mod merton;
pub mod portfolio;
pub mod rating_model;
pub mod ratings;
pub mod spread;
pub mod stress;

pub use credit_metrics::{CreditMetricsResult, CreditMetricsSettings, calculate_credit_metrics_var};
pub use estimation::{AssetEstimate, EstimationOptions, estimate_asset_parameters};
pub use kmv::{KmvResult, KmvSettings, calculate_kmv_pd};
pub use merton::{FirmInputs, MertonResult, calculate_merton_pd};
pub use portfolio::{
    CreditPortfolio, CreditPosition, PortfolioCreditRisk, PositionCreditRisk,
    calculate_portfolio_risk,
};
pub use rating_model::{
    ModelMetrics, RatingModel, RatingModelType, RatingPrediction, TrainingData, TrainingOptions,
    predict_credit_rating, train_rating_model,
};
pub use ratings::{RatingGrade, RatingScale, RatingTransitionMatrix};
pub use spread::{CreditSpreadResult, calculate_credit_spread};
pub use stress::{
    CreditLossMetrics, CreditScenarioResult, CreditStressReport, CreditStressSettings,
    run_credit_stress_test,
};
