//! The five-dimension rubric shared by deterministic scoring, judges and consensus.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{GraderError, GraderResult};

/// Lower bound of every rubric dimension.
pub const SCORE_MIN: f64 = 0.0;

/// Upper bound of every rubric dimension.
pub const SCORE_MAX: f64 = 10.0;

/// One axis of the rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Correctness,
    EdgeCases,
    Complexity,
    Style,
    Clarity,
}

impl Dimension {
    /// All dimensions in canonical order.
    pub const ALL: [Dimension; 5] = [
        Dimension::Correctness,
        Dimension::EdgeCases,
        Dimension::Complexity,
        Dimension::Style,
        Dimension::Clarity,
    ];

    /// Key used for this dimension in judge payloads.
    pub fn key(&self) -> &'static str {
        match self {
            Dimension::Correctness => "correctness",
            Dimension::EdgeCases => "edge_cases",
            Dimension::Complexity => "complexity",
            Dimension::Style => "style",
            Dimension::Clarity => "clarity",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Weights applied by [`RubricScores::overall_with`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RubricWeights {
    pub correctness: f64,
    pub edge_cases: f64,
    pub complexity: f64,
    pub style: f64,
    pub clarity: f64,
}

impl Default for RubricWeights {
    fn default() -> Self {
        Self {
            correctness: 0.35,
            edge_cases: 0.20,
            complexity: 0.15,
            style: 0.15,
            clarity: 0.15,
        }
    }
}

impl RubricWeights {
    pub fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Correctness => self.correctness,
            Dimension::EdgeCases => self.edge_cases,
            Dimension::Complexity => self.complexity,
            Dimension::Style => self.style,
            Dimension::Clarity => self.clarity,
        }
    }

    pub fn sum(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }

    /// Weights must be non-negative and sum to 1.0.
    pub fn validate(&self) -> GraderResult<()> {
        for dim in Dimension::ALL {
            let w = self.get(dim);
            if !w.is_finite() || w < 0.0 {
                return Err(GraderError::InvalidConfig(format!(
                    "weight for {dim} must be a non-negative number, got {w}"
                )));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(GraderError::InvalidConfig(format!(
                "rubric weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Scores for each rubric dimension, each in `[0, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RubricScores {
    pub correctness: f64,
    pub edge_cases: f64,
    pub complexity: f64,
    pub style: f64,
    pub clarity: f64,
}

impl Default for RubricScores {
    fn default() -> Self {
        Self::uniform(0.0)
    }
}

impl RubricScores {
    pub fn new(correctness: f64, edge_cases: f64, complexity: f64, style: f64, clarity: f64) -> Self {
        Self {
            correctness,
            edge_cases,
            complexity,
            style,
            clarity,
        }
    }

    /// Every dimension set to `value`.
    pub fn uniform(value: f64) -> Self {
        Self::new(value, value, value, value, value)
    }

    pub fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Correctness => self.correctness,
            Dimension::EdgeCases => self.edge_cases,
            Dimension::Complexity => self.complexity,
            Dimension::Style => self.style,
            Dimension::Clarity => self.clarity,
        }
    }

    pub fn set(&mut self, dim: Dimension, value: f64) {
        match dim {
            Dimension::Correctness => self.correctness = value,
            Dimension::EdgeCases => self.edge_cases = value,
            Dimension::Complexity => self.complexity = value,
            Dimension::Style => self.style = value,
            Dimension::Clarity => self.clarity = value,
        }
    }

    /// Build a rubric by evaluating `f` for each dimension.
    pub fn from_fn(mut f: impl FnMut(Dimension) -> f64) -> Self {
        let mut scores = Self::default();
        for dim in Dimension::ALL {
            scores.set(dim, f(dim));
        }
        scores
    }

    /// Clamp every dimension into `[0, 10]`.
    pub fn clamped(&self) -> Self {
        Self::from_fn(|d| clamp_score(self.get(d)))
    }

    /// Weighted sum under the default weights.
    pub fn overall(&self) -> f64 {
        self.overall_with(&RubricWeights::default())
    }

    /// Weighted sum rounded to four decimals.
    pub fn overall_with(&self, weights: &RubricWeights) -> f64 {
        let total: f64 = Dimension::ALL
            .iter()
            .map(|d| self.get(*d) * weights.get(*d))
            .sum();
        round_to(total, 4)
    }
}

/// Clamp into `[0, 10]`; non-finite input maps to the lower bound.
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return SCORE_MIN;
    }
    value.clamp(SCORE_MIN, SCORE_MAX)
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = RubricWeights::default();
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert!(w.validate().is_ok());
    }

    #[test]
    fn test_weights_rejected_when_sum_differs() {
        let w = RubricWeights {
            correctness: 0.5,
            ..RubricWeights::default()
        };
        let err = w.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let w = RubricWeights {
            correctness: -0.1,
            edge_cases: 0.65,
            ..RubricWeights::default()
        };
        assert!(w.validate().is_err());
    }

    #[test]
    fn test_overall_perfect_and_zero() {
        assert_eq!(RubricScores::uniform(10.0).overall(), 10.0);
        assert_eq!(RubricScores::uniform(0.0).overall(), 0.0);
    }

    #[test]
    fn test_overall_weighted_sum() {
        let s = RubricScores::new(10.0, 5.0, 0.0, 0.0, 0.0);
        assert!((s.overall() - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_overall_monotone_in_each_dimension() {
        let base = RubricScores::uniform(5.0);
        for dim in Dimension::ALL {
            let mut bumped = base;
            bumped.set(dim, 6.0);
            assert!(bumped.overall() >= base.overall(), "{dim} decreased overall");
        }
    }

    #[test]
    fn test_clamped() {
        let s = RubricScores::new(-1.0, 11.0, f64::NAN, 5.0, 10.0).clamped();
        assert_eq!(s, RubricScores::new(0.0, 10.0, 0.0, 5.0, 10.0));
    }

    #[test]
    fn test_dimension_keys() {
        let keys: Vec<&str> = Dimension::ALL.iter().map(|d| d.key()).collect();
        assert_eq!(
            keys,
            vec!["correctness", "edge_cases", "complexity", "style", "clarity"]
        );
        assert_eq!(Dimension::EdgeCases.to_string(), "edge_cases");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(1.23456, 4), 1.2346);
    }
}
