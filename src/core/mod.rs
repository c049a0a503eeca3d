//! Library-wide error taxonomy and engine configuration.

pub mod config;
pub mod error;

pub use config::{
    CreditConfig, CreditMetricsConfig, EngineConfig, EstimationConfig, OptimizerConfig,
    StressConfig, VarConfig,
};
pub use error::{RiskError, RiskResult};
