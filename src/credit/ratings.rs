//! Rating master scale and rating transition matrix.

use serde::{Deserialize, Serialize};

use crate::core::error::{RiskError, RiskResult};

const ROW_SUM_TOLERANCE: f64 = 1.0e-3;

/// Upper PD bound of one rating grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingGrade {
    pub rating: String,
    pub max_pd: f64,
}

/// Ordered PD buckets, best grade first. The last bucket must reach PD 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingScale {
    pub grades: Vec<RatingGrade>,
}

impl RatingScale {
    pub fn validate(&self) -> RiskResult<()> {
        let last = self
            .grades
            .last()
            .ok_or_else(|| RiskError::invalid_parameter("master_scale", "has no grades"))?;
        if last.max_pd < 1.0 {
            return Err(RiskError::invalid_parameter(
                "master_scale",
                "the worst grade must cover PD 1",
            ));
        }
        let mut previous = 0.0;
        for grade in &self.grades {
            if grade.rating.trim().is_empty() {
                return Err(RiskError::invalid_parameter(
                    "master_scale",
                    "grade names must not be empty",
                ));
            }
            if !(grade.max_pd.is_finite() && grade.max_pd > previous) {
                return Err(RiskError::invalid_parameter(
                    "master_scale",
                    format!("grade `{}` breaks the increasing PD order", grade.rating),
                ));
            }
            previous = grade.max_pd;
        }
        Ok(())
    }

    /// Best grade whose PD bound covers `pd`.
    pub fn rating_for_pd(&self, pd: f64) -> RiskResult<&str> {
        self.grades
            .iter()
            .find(|g| pd <= g.max_pd)
            .map(|g| g.rating.as_str())
            .ok_or_else(|| {
                RiskError::invalid_parameter("probability_of_default", format!("{pd} is off scale"))
            })
    }
}

/// Row-stochastic one-period migration matrix. States run best to worst; the last state is
/// the absorbing default state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingTransitionMatrix {
    pub states: Vec<String>,
    pub probabilities: Vec<Vec<f64>>,
}

impl RatingTransitionMatrix {
    pub fn validate(&self) -> RiskResult<()> {
        let n = self.states.len();
        if n < 2 {
            return Err(RiskError::invalid_parameter(
                "transition_matrix",
                "needs at least one rating and the default state",
            ));
        }
        if self.probabilities.len() != n || self.probabilities.iter().any(|r| r.len() != n) {
            return Err(RiskError::invalid_parameter(
                "transition_matrix",
                format!("probabilities must be {n} x {n}"),
            ));
        }
        for (state, row) in self.states.iter().zip(&self.probabilities) {
            if row.iter().any(|p| !(p.is_finite() && *p >= 0.0)) {
                return Err(RiskError::invalid_parameter(
                    "transition_matrix",
                    format!("row `{state}` has a negative or non-finite entry"),
                ));
            }
            let total: f64 = row.iter().sum();
            if (total - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(RiskError::invalid_parameter(
                    "transition_matrix",
                    format!("row `{state}` sums to {total}"),
                ));
            }
        }
        let d = n - 1;
        if (self.probabilities[d][d] - 1.0).abs() > ROW_SUM_TOLERANCE {
            return Err(RiskError::invalid_parameter(
                "transition_matrix",
                "the last state must be absorbing",
            ));
        }
        Ok(())
    }

    pub fn index_of(&self, rating: &str) -> Option<usize> {
        self.states.iter().position(|s| s == rating)
    }

    pub fn default_index(&self) -> usize {
        self.states.len().saturating_sub(1)
    }

    pub fn non_default_states(&self) -> impl Iterator<Item = &String> {
        self.states.iter().take(self.default_index())
    }

    /// Migration probabilities out of `from`, renormalised to sum to one.
    pub fn row(&self, from: usize) -> Vec<f64> {
        let row = &self.probabilities[from];
        let total: f64 = row.iter().sum();
        row.iter().map(|p| p / total).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineConfig;

    #[test]
    fn master_scale_maps_pd_to_first_covering_grade() {
        let scale = EngineConfig::default().credit.master_scale;
        assert_eq!(scale.rating_for_pd(0.0).unwrap(), "AAA");
        assert_eq!(scale.rating_for_pd(0.0002).unwrap(), "AAA");
        assert_eq!(scale.rating_for_pd(0.004).unwrap(), "BBB");
        assert_eq!(scale.rating_for_pd(0.5).unwrap(), "CCC");
    }

    #[test]
    fn scale_must_be_ordered_and_complete() {
        let scale = RatingScale {
            grades: vec![
                RatingGrade { rating: "A".into(), max_pd: 0.01 },
                RatingGrade { rating: "B".into(), max_pd: 0.5 },
            ],
        };
        assert!(scale.validate().is_err());
        let unordered = RatingScale {
            grades: vec![
                RatingGrade { rating: "A".into(), max_pd: 0.5 },
                RatingGrade { rating: "B".into(), max_pd: 0.1 },
                RatingGrade { rating: "C".into(), max_pd: 1.0 },
            ],
        };
        assert!(unordered.validate().is_err());
    }

    #[test]
    fn matrix_requires_absorbing_default() {
        let m = RatingTransitionMatrix {
            states: vec!["IG".into(), "D".into()],
            probabilities: vec![vec![0.98, 0.02], vec![0.1, 0.9]],
        };
        assert!(m.validate().is_err());
        let ok = RatingTransitionMatrix {
            states: vec!["IG".into(), "D".into()],
            probabilities: vec![vec![0.98, 0.02], vec![0.0, 1.0]],
        };
        ok.validate().unwrap();
        assert_eq!(ok.non_default_states().count(), 1);
        assert_eq!(ok.index_of("D"), Some(1));
    }
}
