//! Judge opinions, their consensus, and audit flags raised against them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::rubric::{Dimension, RubricScores};

/// Why a judge produced no usable opinion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackCause {
    /// The role had no model identifiers configured.
    NoModelsConfigured,
    /// Every attempt against every model failed at the transport level.
    ProviderUnavailable,
    /// A model answered, but no JSON object could be recovered.
    InvalidJson,
    /// A model answered with JSON that lacked required keys.
    MissingKeys(Vec<String>),
}

impl fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackCause::NoModelsConfigured => write!(f, "no models configured"),
            FallbackCause::ProviderUnavailable => write!(f, "provider unavailable"),
            FallbackCause::InvalidJson => write!(f, "response was not valid JSON"),
            FallbackCause::MissingKeys(keys) => {
                write!(f, "response missing keys: {}", keys.join(", "))
            }
        }
    }
}

/// One judge's opinion of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeJudgment {
    pub judge_name: String,
    pub scores: RubricScores,
    pub reasoning: String,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub confidence: f64,
    pub model: String,
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_cause: Option<FallbackCause>,
}

impl JudgeJudgment {
    /// Deterministic stand-in used when no model produced a valid opinion.
    pub fn fallback(
        judge_name: impl Into<String>,
        deterministic: RubricScores,
        confidence: f64,
        cause: FallbackCause,
    ) -> Self {
        Self {
            judge_name: judge_name.into(),
            scores: deterministic,
            reasoning: format!("judge unavailable ({cause}); deterministic scores substituted"),
            issues: Vec::new(),
            suggestions: Vec::new(),
            confidence: confidence.clamp(0.0, 0.3),
            model: "none".to_string(),
            fallback: true,
            fallback_cause: Some(cause),
        }
    }
}

/// How the consensus rubric was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    WeightedAverage,
    MetaJudge,
    DeterministicFallback,
}

/// A dimension where judges disagreed by more than the configured threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disagreement {
    pub dimension: Dimension,
    pub min: f64,
    pub max: f64,
    pub spread: f64,
}

/// Merged opinion across all judges for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub scores: RubricScores,
    pub per_judge: BTreeMap<String, RubricScores>,
    pub disagreements: Vec<Disagreement>,
    pub confidence: f64,
    pub reasoning: String,
    pub method: ConsensusMethod,
}

/// Severity of an audit flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for FlagSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagSeverity::Low => write!(f, "low"),
            FlagSeverity::Medium => write!(f, "medium"),
            FlagSeverity::High => write!(f, "high"),
        }
    }
}

/// A consensus claim contradicted by deterministic evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallucinationFlag {
    pub dimension: Dimension,
    pub description: String,
    pub severity: FlagSeverity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_confidence_is_capped() {
        let j = JudgeJudgment::fallback(
            "code_reviewer",
            RubricScores::uniform(7.0),
            0.9,
            FallbackCause::ProviderUnavailable,
        );
        assert!(j.fallback);
        assert!(j.confidence <= 0.3);
        assert_eq!(j.scores, RubricScores::uniform(7.0));
        assert!(j.reasoning.contains("provider unavailable"));
    }

    #[test]
    fn test_fallback_cause_serde() {
        let cause = FallbackCause::MissingKeys(vec!["style".into()]);
        let json = serde_json::to_string(&cause).unwrap();
        assert_eq!(json, r#"{"missing_keys":["style"]}"#);
        let back: FallbackCause = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cause);
        assert_eq!(
            serde_json::to_string(&FallbackCause::InvalidJson).unwrap(),
            r#""invalid_json""#
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(FlagSeverity::High > FlagSeverity::Medium);
        assert!(FlagSeverity::Medium > FlagSeverity::Low);
        assert_eq!(FlagSeverity::High.to_string(), "high");
    }
}
