//! Binary default models for credit rating: logistic and probit regression.
//!
//! Training standardizes every feature, then maximizes the ridge-penalized log-likelihood by
//! Fisher scoring (iteratively reweighted least squares) with step halving. Both links share one
//! update: with `mu = F(eta)` and `phi = F'(eta)`,
//!
//! - score `u_i = (y_i - mu_i) phi_i / (mu_i (1 - mu_i))`,
//! - weight `w_i = phi_i^2 / (mu_i (1 - mu_i))`,
//! - step `(X' W X + lambda R)^-1 (X' u - lambda R beta)`, `R` leaving the intercept unpenalized.
//!
//! The fitted model is a plain serializable [`RatingModel`] descriptor owned by the caller;
//! prediction needs nothing else.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ratings::RatingScale;
use crate::core::config::EstimationConfig;
use crate::core::error::{RiskError, RiskResult};
use crate::math::{normal_cdf, normal_pdf};

const PROB_CLAMP: f64 = 1.0e-12;
const MIN_WEIGHT: f64 = 1.0e-12;
const MAX_HALVINGS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingModelType {
    Logistic,
    Probit,
}

impl RatingModelType {
    pub const EXPECTED: &'static str = "logistic, probit";

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logistic => "logistic",
            Self::Probit => "probit",
        }
    }

    /// `(F(eta), F'(eta))`.
    fn link(self, eta: f64) -> (f64, f64) {
        match self {
            Self::Logistic => {
                let mu = 1.0 / (1.0 + (-eta).exp());
                (mu, mu * (1.0 - mu))
            }
            Self::Probit => (normal_cdf(eta), normal_pdf(eta)),
        }
    }

    pub fn probability(self, score: f64) -> f64 {
        self.link(score).0
    }
}

impl fmt::Display for RatingModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RatingModelType {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "logistic" | "logit" => Ok(Self::Logistic),
            "probit" => Ok(Self::Probit),
            _ => Err(RiskError::InvalidMethod {
                method: s.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

/// Tabular training sample: one map of column to value per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingData {
    pub records: Vec<BTreeMap<String, f64>>,
    /// Column holding the 0/1 default indicator.
    pub label_column: String,
    /// Defaults to every non-label column of the first record.
    #[serde(default)]
    pub feature_columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingOptions {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub ridge: f64,
}

impl From<&EstimationConfig> for TrainingOptions {
    fn from(config: &EstimationConfig) -> Self {
        Self {
            tolerance: config.rating_model_tolerance,
            max_iterations: config.rating_model_max_iterations,
            ridge: config.rating_model_ridge,
        }
    }
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self::from(&EstimationConfig::default())
    }
}

/// In-sample fit quality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Share of records classified correctly at a 0.5 cut-off.
    pub accuracy: f64,
    pub log_loss: f64,
    pub brier_score: f64,
    /// Area under the ROC curve.
    pub auc: f64,
    pub default_rate: f64,
    pub observations: usize,
}

/// Trained model descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingModel {
    pub model_type: RatingModelType,
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_scales: Vec<f64>,
    pub intercept: f64,
    /// Coefficients on standardized features.
    pub coefficients: Vec<f64>,
    pub metrics: ModelMetrics,
    pub iterations: usize,
}

impl RatingModel {
    /// Structural checks on a descriptor received from outside.
    pub fn validate(&self) -> RiskResult<()> {
        let k = self.feature_names.len();
        if k == 0 {
            return Err(RiskError::InvalidModel("model has no features".into()));
        }
        if self.coefficients.len() != k
            || self.feature_means.len() != k
            || self.feature_scales.len() != k
        {
            return Err(RiskError::InvalidModel(format!(
                "{k} features but {} coefficients, {} means and {} scales",
                self.coefficients.len(),
                self.feature_means.len(),
                self.feature_scales.len()
            )));
        }
        let finite = self.intercept.is_finite()
            && self
                .coefficients
                .iter()
                .chain(&self.feature_means)
                .chain(&self.feature_scales)
                .all(|v| v.is_finite());
        if !finite {
            return Err(RiskError::InvalidModel("model holds non-finite values".into()));
        }
        if self.feature_scales.iter().any(|s| *s <= 0.0) {
            return Err(RiskError::InvalidModel("feature scales must be > 0".into()));
        }
        Ok(())
    }

    /// Linear predictor for one record; every model feature must be present.
    pub fn score(&self, record: &BTreeMap<String, f64>) -> RiskResult<f64> {
        let mut eta = self.intercept;
        for (j, name) in self.feature_names.iter().enumerate() {
            let x = record.get(name).copied().ok_or_else(|| {
                RiskError::invalid_parameter(name.clone(), "feature missing from financial data")
            })?;
            if !x.is_finite() {
                return Err(RiskError::invalid_parameter(name.clone(), "must be finite"));
            }
            eta += self.coefficients[j] * (x - self.feature_means[j]) / self.feature_scales[j];
        }
        Ok(eta)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingPrediction {
    pub probability_of_default: f64,
    pub score: f64,
    pub rating: String,
}

/// Fits a default model to labelled financial records.
pub fn train_rating_model(
    data: &TrainingData,
    model_type: RatingModelType,
    options: &TrainingOptions,
) -> RiskResult<RatingModel> {
    let features = feature_columns(data)?;
    let (x_raw, y) = design(data, &features)?;
    let n = y.len();
    let k = features.len();

    let (means, scales) = standardization(&x_raw, k);
    let x = DMatrix::from_fn(n, k + 1, |i, j| {
        if j == 0 {
            1.0
        } else {
            (x_raw[i][j - 1] - means[j - 1]) / scales[j - 1]
        }
    });

    let (beta, iterations) = fit(&x, &y, model_type, options)?;
    let probabilities: Vec<f64> = (&x * &beta)
        .iter()
        .map(|&eta| model_type.probability(eta))
        .collect();

    debug!(model = model_type.as_str(), iterations, features = k, observations = n, "rating model trained");

    Ok(RatingModel {
        model_type,
        feature_names: features,
        feature_means: means,
        feature_scales: scales,
        intercept: beta[0],
        coefficients: beta.iter().skip(1).copied().collect(),
        metrics: metrics(&probabilities, &y),
        iterations,
    })
}

/// Scores one set of financial ratios with a previously trained descriptor.
pub fn predict_credit_rating(
    financial_data: &BTreeMap<String, f64>,
    model: &RatingModel,
    master_scale: &RatingScale,
) -> RiskResult<RatingPrediction> {
    model.validate()?;
    let score = model.score(financial_data)?;
    let pd = model.model_type.probability(score);
    Ok(RatingPrediction {
        probability_of_default: pd,
        score,
        rating: master_scale.rating_for_pd(pd)?.to_string(),
    })
}

fn feature_columns(data: &TrainingData) -> RiskResult<Vec<String>> {
    let first = data
        .records
        .first()
        .ok_or_else(|| RiskError::InvalidTrainingData("no training records".into()))?;
    let features: Vec<String> = match &data.feature_columns {
        Some(cols) => cols.clone(),
        None => first
            .keys()
            .filter(|c| **c != data.label_column)
            .cloned()
            .collect(),
    };
    if features.is_empty() {
        return Err(RiskError::InvalidTrainingData("no feature columns".into()));
    }
    if features.iter().any(|c| *c == data.label_column) {
        return Err(RiskError::InvalidTrainingData(
            "label column cannot also be a feature".into(),
        ));
    }
    Ok(features)
}

fn design(data: &TrainingData, features: &[String]) -> RiskResult<(Vec<Vec<f64>>, Vec<f64>)> {
    let mut rows = Vec::with_capacity(data.records.len());
    let mut labels = Vec::with_capacity(data.records.len());
    for (i, record) in data.records.iter().enumerate() {
        let label = record.get(&data.label_column).copied().ok_or_else(|| {
            RiskError::InvalidTrainingData(format!(
                "record {i} lacks label column `{}`",
                data.label_column
            ))
        })?;
        if label != 0.0 && label != 1.0 {
            return Err(RiskError::InvalidTrainingData(format!(
                "record {i} has label {label}; labels must be 0 or 1"
            )));
        }
        let row = features
            .iter()
            .map(|c| match record.get(c) {
                Some(v) if v.is_finite() => Ok(*v),
                Some(_) => Err(RiskError::InvalidTrainingData(format!(
                    "record {i} has a non-finite `{c}`"
                ))),
                None => Err(RiskError::InvalidTrainingData(format!(
                    "record {i} lacks feature `{c}`"
                ))),
            })
            .collect::<RiskResult<Vec<f64>>>()?;
        rows.push(row);
        labels.push(label);
    }

    let defaults = labels.iter().filter(|&&y| y == 1.0).count();
    if defaults == 0 || defaults == labels.len() {
        return Err(RiskError::InvalidTrainingData(
            "training labels contain a single class".into(),
        ));
    }
    Ok((rows, labels))
}

/// Column means and sample standard deviations; constant columns get scale 1.
fn standardization(rows: &[Vec<f64>], k: usize) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len() as f64;
    let means: Vec<f64> = (0..k)
        .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n)
        .collect();
    let scales = (0..k)
        .map(|j| {
            let ss: f64 = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum();
            let sd = (ss / (n - 1.0).max(1.0)).sqrt();
            if sd > 0.0 { sd } else { 1.0 }
        })
        .collect();
    (means, scales)
}

fn penalized_log_likelihood(
    x: &DMatrix<f64>,
    y: &[f64],
    beta: &DVector<f64>,
    model_type: RatingModelType,
    ridge: f64,
) -> f64 {
    let eta = x * beta;
    let ll: f64 = eta
        .iter()
        .zip(y)
        .map(|(&e, &yi)| {
            let mu = model_type.probability(e).clamp(PROB_CLAMP, 1.0 - PROB_CLAMP);
            yi * mu.ln() + (1.0 - yi) * (1.0 - mu).ln()
        })
        .sum();
    let penalty: f64 = beta.iter().skip(1).map(|b| b * b).sum();
    ll - 0.5 * ridge * penalty
}

fn fit(
    x: &DMatrix<f64>,
    y: &[f64],
    model_type: RatingModelType,
    options: &TrainingOptions,
) -> RiskResult<(DVector<f64>, usize)> {
    let (n, p) = x.shape();
    let mut beta = DVector::zeros(p);
    let mut objective = penalized_log_likelihood(x, y, &beta, model_type, options.ridge);
    let mut residual = f64::INFINITY;

    for iteration in 1..=options.max_iterations {
        let eta = x * &beta;
        let mut score = DVector::zeros(n);
        let mut weights = DVector::zeros(n);
        for i in 0..n {
            let (mu, phi) = model_type.link(eta[i]);
            let mu = mu.clamp(PROB_CLAMP, 1.0 - PROB_CLAMP);
            let variance = mu * (1.0 - mu);
            score[i] = (y[i] - mu) * phi / variance;
            weights[i] = (phi * phi / variance).max(MIN_WEIGHT);
        }

        let mut penalty_grad = beta.clone() * options.ridge;
        penalty_grad[0] = 0.0;
        let gradient = x.transpose() * &score - penalty_grad;

        let weighted_x = DMatrix::from_fn(n, p, |i, j| x[(i, j)] * weights[i]);
        let mut information = x.transpose() * weighted_x;
        for j in 1..p {
            information[(j, j)] += options.ridge;
        }

        let step = match information.clone().cholesky() {
            Some(ch) => ch.solve(&gradient),
            None => information.lu().solve(&gradient).ok_or(
                RiskError::EstimationDidNotConverge {
                    iterations: iteration,
                    residual,
                },
            )?,
        };

        let mut t = 1.0;
        let mut candidate = &beta + &step;
        let mut candidate_objective =
            penalized_log_likelihood(x, y, &candidate, model_type, options.ridge);
        for _ in 0..MAX_HALVINGS {
            if candidate_objective >= objective - 1.0e-12 * objective.abs().max(1.0) {
                break;
            }
            t *= 0.5;
            candidate = &beta + &step * t;
            candidate_objective =
                penalized_log_likelihood(x, y, &candidate, model_type, options.ridge);
        }

        residual = (&step * t).amax();
        beta = candidate;
        objective = candidate_objective;

        if !residual.is_finite() {
            break;
        }
        if residual <= options.tolerance {
            return Ok((beta, iteration));
        }
    }

    Err(RiskError::EstimationDidNotConverge {
        iterations: options.max_iterations,
        residual,
    })
}

fn metrics(probabilities: &[f64], y: &[f64]) -> ModelMetrics {
    let n = y.len() as f64;
    let correct = probabilities
        .iter()
        .zip(y)
        .filter(|(p, yi)| (**p >= 0.5) == (**yi == 1.0))
        .count();
    let log_loss = -probabilities
        .iter()
        .zip(y)
        .map(|(p, yi)| {
            let p = p.clamp(1.0e-15, 1.0 - 1.0e-15);
            yi * p.ln() + (1.0 - yi) * (1.0 - p).ln()
        })
        .sum::<f64>()
        / n;
    let brier_score = probabilities
        .iter()
        .zip(y)
        .map(|(p, yi)| (p - yi).powi(2))
        .sum::<f64>()
        / n;

    ModelMetrics {
        accuracy: correct as f64 / n,
        log_loss,
        brier_score,
        auc: roc_auc(probabilities, y),
        default_rate: y.iter().sum::<f64>() / n,
        observations: y.len(),
    }
}

/// Mann-Whitney estimate of the ROC area with mid-ranks for ties.
fn roc_auc(scores: &[f64], y: &[f64]) -> f64 {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let mid_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = mid_rank;
        }
        i = j + 1;
    }

    let positives = y.iter().filter(|&&v| v == 1.0).count() as f64;
    let negatives = y.len() as f64 - positives;
    let positive_rank_sum: f64 = ranks
        .iter()
        .zip(y)
        .filter(|(_, yi)| **yi == 1.0)
        .map(|(r, _)| r)
        .sum();
    (positive_rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives)
}
