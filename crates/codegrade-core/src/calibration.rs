//! Grader calibration: run-to-run consistency and accuracy against gold
//! scores.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{round_to, Dimension, EvaluationResult, RubricScores};

/// Default per-dimension tolerance between two runs.
pub const CONSISTENCY_TOLERANCE: f64 = 0.5;
/// Deterministic overall scores must agree to within this.
pub const DETERMINISTIC_TOLERANCE: f64 = 0.01;
/// Prediction and gold within this count as an exact match.
pub const EXACT_MATCH_TOLERANCE: f64 = 0.5;

/// Scores a result reports per dimension: consensus when present.
pub fn reported_scores(result: &EvaluationResult) -> RubricScores {
    result
        .consensus
        .as_ref()
        .map(|c| c.scores)
        .unwrap_or(result.deterministic_scores)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDiff {
    pub dimension: Dimension,
    pub run1: f64,
    pub run2: f64,
    pub difference: f64,
    pub consistent: bool,
}

/// Comparison of two evaluations of the same submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub problem_id: String,
    pub submission_id: String,
    pub consistent: bool,
    pub tolerance: f64,
    pub dimension_differences: Vec<DimensionDiff>,
    pub deterministic_diff: f64,
    pub deterministic_consistent: bool,
    pub final_score_diff: f64,
}

/// Compare two gradings of the same submission.
///
/// Each rubric dimension must differ by at most `tolerance`. The
/// deterministic overall must stay within [`DETERMINISTIC_TOLERANCE`].
pub fn check_consistency(
    first: &EvaluationResult,
    second: &EvaluationResult,
    tolerance: f64,
) -> ConsistencyReport {
    let a = reported_scores(first);
    let b = reported_scores(second);
    let dimension_differences: Vec<DimensionDiff> = Dimension::ALL
        .iter()
        .map(|&dim| {
            let diff = (a.get(dim) - b.get(dim)).abs();
            DimensionDiff {
                dimension: dim,
                run1: a.get(dim),
                run2: b.get(dim),
                difference: round_to(diff, 2),
                consistent: diff <= tolerance,
            }
        })
        .collect();
    let deterministic_diff = (first.deterministic_score - second.deterministic_score).abs();

    ConsistencyReport {
        problem_id: first.problem_id.clone(),
        submission_id: first.submission_id.clone(),
        consistent: dimension_differences.iter().all(|d| d.consistent),
        tolerance,
        dimension_differences,
        deterministic_diff: round_to(deterministic_diff, 4),
        deterministic_consistent: deterministic_diff < DETERMINISTIC_TOLERANCE,
        final_score_diff: round_to((first.final_score - second.final_score).abs(), 4),
    }
}

/// Hand-assigned reference grade for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldScore {
    pub problem_id: String,
    pub submission_id: String,
    pub correctness: f64,
    pub edge_cases: f64,
    pub complexity: f64,
    pub style: f64,
    pub clarity: f64,
    pub overall: f64,
}

impl GoldScore {
    fn rubric(&self) -> RubricScores {
        RubricScores::new(self.correctness, self.edge_cases, self.complexity, self.style, self.clarity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    /// Dimension key, or `overall` for the final score.
    pub metric: String,
    pub mae: f64,
    pub exact_match_pct: f64,
    pub correlation: f64,
    pub n: usize,
}

fn accuracy(metric: &str, pairs: &[(f64, f64)]) -> AccuracyMetrics {
    let n = pairs.len();
    let nf = n as f64;
    let mae = pairs.iter().map(|(p, g)| (p - g).abs()).sum::<f64>() / nf;
    let exact = pairs
        .iter()
        .filter(|(p, g)| (p - g).abs() <= EXACT_MATCH_TOLERANCE)
        .count();

    let mean_p = pairs.iter().map(|(p, _)| p).sum::<f64>() / nf;
    let mean_g = pairs.iter().map(|(_, g)| g).sum::<f64>() / nf;
    let cov = pairs.iter().map(|(p, g)| (p - mean_p) * (g - mean_g)).sum::<f64>() / nf;
    let std_p = (pairs.iter().map(|(p, _)| (p - mean_p).powi(2)).sum::<f64>() / nf).sqrt();
    let std_g = (pairs.iter().map(|(_, g)| (g - mean_g).powi(2)).sum::<f64>() / nf).sqrt();
    let correlation = if std_p > 0.0 && std_g > 0.0 {
        cov / (std_p * std_g)
    } else {
        0.0
    };

    AccuracyMetrics {
        metric: metric.to_string(),
        mae: round_to(mae, 4),
        exact_match_pct: round_to(exact as f64 / nf * 100.0, 2),
        correlation: round_to(correlation, 4),
        n,
    }
}

/// Per-dimension and overall accuracy against gold scores.
///
/// Results without a gold entry are ignored. Empty when nothing matches.
pub fn grader_accuracy(results: &[EvaluationResult], gold: &[GoldScore]) -> Vec<AccuracyMetrics> {
    let lookup: HashMap<(&str, &str), &GoldScore> = gold
        .iter()
        .map(|g| ((g.problem_id.as_str(), g.submission_id.as_str()), g))
        .collect();
    let matched: Vec<(&EvaluationResult, &GoldScore)> = results
        .iter()
        .filter_map(|r| {
            lookup
                .get(&(r.problem_id.as_str(), r.submission_id.as_str()))
                .map(|g| (r, *g))
        })
        .collect();
    if matched.is_empty() {
        tracing::warn!("no evaluated submission has a gold score");
        return Vec::new();
    }

    let mut metrics: Vec<AccuracyMetrics> = Dimension::ALL
        .iter()
        .map(|&dim| {
            let pairs: Vec<(f64, f64)> = matched
                .iter()
                .map(|(r, g)| (reported_scores(r).get(dim), g.rubric().get(dim)))
                .collect();
            accuracy(dim.key(), &pairs)
        })
        .collect();
    let overall: Vec<(f64, f64)> = matched.iter().map(|(r, g)| (r.final_score, g.overall)).collect();
    metrics.push(accuracy("overall", &overall));
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionArtifact, TestSuiteResult};
    use chrono::Utc;
    use uuid::Uuid;

    fn result(submission: &str, scores: RubricScores, final_score: f64) -> EvaluationResult {
        EvaluationResult {
            evaluation_id: Uuid::new_v4(),
            evaluated_at: Utc::now(),
            problem_id: "p".into(),
            submission_id: submission.into(),
            submission_digest: String::new(),
            deterministic_score: scores.overall(),
            judge_adjusted_score: final_score,
            final_score,
            execution: ExecutionArtifact {
                test_results: TestSuiteResult::from_counts(1, 1, 0, 0, Vec::new(), 0.0),
                warnings: Vec::new(),
                runtime_error: None,
                wall_time: 0.0,
                sandbox_violation: false,
                timed_out: false,
                violations: Vec::new(),
            },
            deterministic_scores: scores,
            judgments: Vec::new(),
            consensus: None,
            hallucination_flags: Vec::new(),
            confidence: 1.0,
            fallback_reason: None,
        }
    }

    fn gold(submission: &str, value: f64) -> GoldScore {
        GoldScore {
            problem_id: "p".into(),
            submission_id: submission.into(),
            correctness: value,
            edge_cases: value,
            complexity: value,
            style: value,
            clarity: value,
            overall: value,
        }
    }

    #[test]
    fn test_identical_runs_are_consistent() {
        let a = result("s1", RubricScores::uniform(7.0), 7.0);
        let b = result("s1", RubricScores::uniform(7.0), 7.0);
        let report = check_consistency(&a, &b, CONSISTENCY_TOLERANCE);
        assert!(report.consistent);
        assert!(report.deterministic_consistent);
        assert_eq!(report.final_score_diff, 0.0);
    }

    #[test]
    fn test_dimension_drift_detected() {
        let a = result("s1", RubricScores::new(7.0, 7.0, 7.0, 7.0, 7.0), 7.0);
        let b = result("s1", RubricScores::new(7.0, 7.0, 7.0, 8.0, 7.0), 7.2);
        let report = check_consistency(&a, &b, CONSISTENCY_TOLERANCE);
        assert!(!report.consistent);
        let style = &report.dimension_differences[3];
        assert_eq!(style.dimension, Dimension::Style);
        assert_eq!(style.difference, 1.0);
        assert!(!report.deterministic_consistent);
        assert_eq!(report.final_score_diff, 0.2);
    }

    #[test]
    fn test_accuracy_perfect_correlation() {
        let results = vec![
            result("a", RubricScores::uniform(2.0), 2.0),
            result("b", RubricScores::uniform(6.0), 6.0),
            result("c", RubricScores::uniform(9.0), 9.0),
            result("unlabelled", RubricScores::uniform(1.0), 1.0),
        ];
        let gold = vec![gold("a", 3.0), gold("b", 7.0), gold("c", 10.0)];
        let metrics = grader_accuracy(&results, &gold);
        assert_eq!(metrics.len(), 6);
        let overall = metrics.last().unwrap();
        assert_eq!(overall.metric, "overall");
        assert_eq!(overall.n, 3);
        assert_eq!(overall.mae, 1.0);
        assert_eq!(overall.exact_match_pct, 0.0);
        assert_eq!(overall.correlation, 1.0);
    }

    #[test]
    fn test_accuracy_constant_predictions_have_zero_correlation() {
        let results = vec![
            result("a", RubricScores::uniform(5.0), 5.0),
            result("b", RubricScores::uniform(5.0), 5.0),
        ];
        let gold = vec![gold("a", 5.0), gold("b", 5.4)];
        let metrics = grader_accuracy(&results, &gold);
        assert_eq!(metrics[0].correlation, 0.0);
        assert_eq!(metrics[0].exact_match_pct, 100.0);
    }

    #[test]
    fn test_accuracy_without_matches_is_empty() {
        let results = vec![result("a", RubricScores::uniform(5.0), 5.0)];
        assert!(grader_accuracy(&results, &[gold("zzz", 1.0)]).is_empty());
    }
}
