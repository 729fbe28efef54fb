//! Merging judge opinions into one rubric.
//!
//! Weighted average by judge confidence, with fallback judges pinned to a
//! small weight. When every judge fell back the consensus is the
//! deterministic rubric itself. An optional meta-judge may replace the
//! average with a model-merged rubric; if it fails the average is used.

use std::collections::BTreeMap;

use crate::config::MetaJudgeConfig;
use crate::domain::{
    round_to, ConsensusMethod, ConsensusResult, Dimension, Disagreement, JudgeJudgment, RubricScores,
};
use crate::judge::{EvidenceContext, JudgeInvoker};

/// Weight given to a fallback judgment in the average.
pub const FALLBACK_JUDGE_WEIGHT: f64 = 0.1;

/// Consensus confidence when no judge produced a genuine opinion.
pub const LOW_CONSENSUS_CONFIDENCE: f64 = 0.2;

/// True when there is no genuine judge opinion to merge.
pub fn all_fallback(judgments: &[JudgeJudgment]) -> bool {
    judgments.iter().all(|j| j.fallback)
}

/// Each judge's raw rubric, keyed by judge name.
fn per_judge(judgments: &[JudgeJudgment]) -> BTreeMap<String, RubricScores> {
    judgments
        .iter()
        .map(|j| (j.judge_name.clone(), j.scores))
        .collect()
}

/// Dimensions where the spread of judge opinions exceeds `threshold`.
///
/// The comparison is strict, so a spread equal to `threshold` is agreement.
/// Fewer than two judgments never disagree.
pub fn find_disagreements(judgments: &[JudgeJudgment], threshold: f64) -> Vec<Disagreement> {
    if judgments.len() < 2 {
        return Vec::new();
    }
    Dimension::ALL
        .iter()
        .filter_map(|&dim| {
            let values = judgments.iter().map(|j| j.scores.get(dim));
            let min = values.clone().fold(f64::INFINITY, f64::min);
            let max = values.fold(f64::NEG_INFINITY, f64::max);
            let spread = max - min;
            (spread > threshold).then(|| Disagreement {
                dimension: dim,
                min,
                max,
                spread: round_to(spread, 2),
            })
        })
        .collect()
}

/// Mean confidence of the non-fallback judges.
///
/// Falls back to [`LOW_CONSENSUS_CONFIDENCE`] when every judge fell back.
pub fn genuine_confidence(judgments: &[JudgeJudgment]) -> f64 {
    let genuine: Vec<f64> = judgments
        .iter()
        .filter(|j| !j.fallback)
        .map(|j| j.confidence)
        .collect();
    if genuine.is_empty() {
        LOW_CONSENSUS_CONFIDENCE
    } else {
        genuine.iter().sum::<f64>() / genuine.len() as f64
    }
}

/// Deterministic stand-in when every judge fell back.
///
/// Scores are the deterministic rubric; confidence is the highest any
/// fallback judgment reported.
pub fn deterministic_consensus(
    judgments: &[JudgeJudgment],
    deterministic: &RubricScores,
    threshold: f64,
) -> ConsensusResult {
    let confidence = judgments
        .iter()
        .map(|j| j.confidence)
        .fold(0.0, f64::max);
    ConsensusResult {
        scores: *deterministic,
        per_judge: per_judge(judgments),
        disagreements: find_disagreements(judgments, threshold),
        confidence,
        reasoning: format!(
            "all {} judge(s) fell back; deterministic scores used",
            judgments.len()
        ),
        method: ConsensusMethod::DeterministicFallback,
    }
}

/// Confidence-weighted average across all judgments.
///
/// A dimension whose total weight is zero keeps the deterministic value.
pub fn weighted_consensus(
    judgments: &[JudgeJudgment],
    deterministic: &RubricScores,
    threshold: f64,
) -> ConsensusResult {
    let weight = |j: &JudgeJudgment| {
        if j.fallback {
            FALLBACK_JUDGE_WEIGHT
        } else {
            j.confidence.max(0.0)
        }
    };
    let scores = RubricScores::from_fn(|dim| {
        let total: f64 = judgments.iter().map(weight).sum();
        if total <= 0.0 {
            return deterministic.get(dim);
        }
        let sum: f64 = judgments.iter().map(|j| j.scores.get(dim) * weight(j)).sum();
        round_to(sum / total, 2)
    })
    .clamped();

    let fallbacks = judgments.iter().filter(|j| j.fallback).count();
    ConsensusResult {
        scores,
        per_judge: per_judge(judgments),
        disagreements: find_disagreements(judgments, threshold),
        confidence: genuine_confidence(judgments),
        reasoning: format!(
            "confidence-weighted average of {} judge(s), {} fallback",
            judgments.len(),
            fallbacks
        ),
        method: ConsensusMethod::WeightedAverage,
    }
}

/// Merge without a meta-judge.
///
/// Uses [`deterministic_consensus`] when no judge was genuine and
/// [`weighted_consensus`] otherwise.
pub fn merge(judgments: &[JudgeJudgment], deterministic: &RubricScores, threshold: f64) -> ConsensusResult {
    if all_fallback(judgments) {
        deterministic_consensus(judgments, deterministic, threshold)
    } else {
        weighted_consensus(judgments, deterministic, threshold)
    }
}

/// Merge, asking the meta-judge first when one is configured.
///
/// Only genuine judgments are shown to the meta-judge. When it is disabled,
/// has no models, or returns nothing usable, this is [`merge`].
pub async fn merge_with_meta(
    invoker: &JudgeInvoker,
    meta: &MetaJudgeConfig,
    ctx: &EvidenceContext<'_>,
    judgments: &[JudgeJudgment],
    threshold: f64,
) -> ConsensusResult {
    if !meta.enabled || meta.models.is_empty() || all_fallback(judgments) {
        return merge(judgments, ctx.deterministic, threshold);
    }
    let genuine: Vec<JudgeJudgment> = judgments.iter().filter(|j| !j.fallback).cloned().collect();
    match invoker.run_meta(&meta.models, ctx, &genuine).await {
        Some((model, parsed)) => {
            tracing::debug!(model = %model, confidence = parsed.confidence, "meta-judge merged opinions");
            let mut reasoning = parsed.reasoning;
            if !parsed.disagreements.is_empty() {
                reasoning = format!(
                    "{reasoning} (meta-judge noted disagreement on: {})",
                    parsed.disagreements.join(", ")
                );
            }
            ConsensusResult {
                scores: parsed.scores.clamped(),
                per_judge: per_judge(judgments),
                disagreements: find_disagreements(judgments, threshold),
                confidence: parsed.confidence,
                reasoning,
                method: ConsensusMethod::MetaJudge,
            }
        }
        None => merge(judgments, ctx.deterministic, threshold),
    }
}
