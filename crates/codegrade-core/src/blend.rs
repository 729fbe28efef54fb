//! Final score blending.

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::domain::{round_to, ConsensusResult, HallucinationFlag, RubricWeights};

/// Reason attached when consensus confidence is below the blending floor.
pub const LOW_CONFIDENCE_REASON: &str = "low consensus confidence; using deterministic score only";
/// Reason attached when no judge produced a genuine opinion.
pub const ALL_FALLBACK_REASON: &str = "all judges fell back; using deterministic score only";

/// Scores reported for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendOutcome {
    /// Overall score after blending, rounded to four places.
    pub final_score: f64,
    /// Consensus overall under the rubric weights.
    pub judge_adjusted_score: f64,
    /// Consensus confidence, or 1.0 for a deterministic-only outcome.
    pub confidence: f64,
    /// Judge share actually applied; zero when blending was skipped.
    pub judge_weight: f64,
    /// Why blending was skipped or the judge share reduced.
    pub fallback_reason: Option<String>,
}

impl BlendOutcome {
    /// Report the deterministic score alone.
    pub fn deterministic_only(deterministic: f64, reason: impl Into<String>) -> Self {
        Self {
            final_score: deterministic,
            judge_adjusted_score: deterministic,
            confidence: 1.0,
            judge_weight: 0.0,
            fallback_reason: Some(reason.into()),
        }
    }
}

/// Judge share after any hallucination penalty.
///
/// Any flag at all scales `judge_weight` by `hallucination_weight_reduction`;
/// the flag count does not compound.
pub fn effective_judge_weight(scoring: &ScoringConfig, flag_count: usize) -> f64 {
    if flag_count > 0 {
        scoring.judge_weight * scoring.hallucination_weight_reduction
    } else {
        scoring.judge_weight
    }
}

/// Blend deterministic and consensus overall scores.
///
/// Blending happens only when consensus confidence reaches
/// `min_consensus_confidence` and at least one judge was genuine.
pub fn blend(
    deterministic: f64,
    consensus: &ConsensusResult,
    all_fallback: bool,
    flags: &[HallucinationFlag],
    weights: &RubricWeights,
    scoring: &ScoringConfig,
) -> BlendOutcome {
    if all_fallback {
        return BlendOutcome::deterministic_only(deterministic, ALL_FALLBACK_REASON);
    }
    if consensus.confidence < scoring.min_consensus_confidence {
        return BlendOutcome::deterministic_only(deterministic, LOW_CONFIDENCE_REASON);
    }

    let consensus_overall = consensus.scores.overall_with(weights);
    let weight = effective_judge_weight(scoring, flags.len());
    let final_score = round_to(deterministic * (1.0 - weight) + consensus_overall * weight, 4);
    let fallback_reason = (!flags.is_empty()).then(|| {
        format!(
            "judge weight reduced from {:.2} to {:.2} due to {} hallucination flag(s)",
            scoring.judge_weight,
            weight,
            flags.len()
        )
    });

    BlendOutcome {
        final_score,
        judge_adjusted_score: consensus_overall,
        confidence: consensus.confidence,
        judge_weight: weight,
        fallback_reason,
    }
}
