use std::path::Path;

use anyhow::{Context, Result};

use crate::calibration::{AccuracyMetrics, ConsistencyReport};
use crate::domain::EvaluationResult;

/// Write results as a pretty JSON array.
pub fn write_results_json(path: &Path, results: &[EvaluationResult]) -> Result<()> {
    let content = serde_json::to_string_pretty(results).context("serialize evaluation results")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Read results written by [`write_results_json`].
pub fn read_results_json(path: &Path) -> Result<Vec<EvaluationResult>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("parse {:?}", path))
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Render the per-submission summary, plus calibration sections when given.
pub fn render_markdown_summary(
    results: &[EvaluationResult],
    accuracy: &[AccuracyMetrics],
    consistency: &[ConsistencyReport],
) -> String {
    let mut out = String::new();
    out.push_str("# Evaluation Summary\n\n");
    out.push_str(&format!("Submissions evaluated: {}\n\n", results.len()));

    if !results.is_empty() {
        out.push_str(
            "| Problem | Submission | Deterministic | Judge-adjusted | Final | Confidence | Flags | Fallback reason |\n",
        );
        out.push_str("|---|---|---|---|---|---|---|---|\n");
        for r in results {
            out.push_str(&format!(
                "| {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {} | {} |\n",
                cell(&r.problem_id),
                cell(&r.submission_id),
                r.deterministic_score,
                r.judge_adjusted_score,
                r.final_score,
                r.confidence,
                r.hallucination_flags.len(),
                cell(r.fallback_reason.as_deref().unwrap_or("-")),
            ));
        }
        out.push('\n');
    }

    let flagged: Vec<_> = results
        .iter()
        .filter(|r| !r.hallucination_flags.is_empty())
        .collect();
    if !flagged.is_empty() {
        out.push_str("## Hallucination Flags\n");
        for r in flagged {
            for f in &r.hallucination_flags {
                out.push_str(&format!(
                    "- `{}/{}` [{}] {}: {}\n",
                    r.problem_id, r.submission_id, f.severity, f.dimension, f.description
                ));
            }
        }
        out.push('\n');
    }

    if !accuracy.is_empty() {
        out.push_str("## Grader Accuracy\n");
        out.push_str("| Metric | MAE | Exact match % | Correlation | n |\n");
        out.push_str("|---|---|---|---|---|\n");
        for m in accuracy {
            out.push_str(&format!(
                "| {} | {:.4} | {:.2} | {:.4} | {} |\n",
                m.metric, m.mae, m.exact_match_pct, m.correlation, m.n
            ));
        }
        out.push('\n');
    }

    if !consistency.is_empty() {
        let all = consistency.iter().all(|c| c.consistent);
        out.push_str("## Consistency\n");
        out.push_str(&format!(
            "Overall consistency: {}\n\n",
            if all { "PASS" } else { "FAIL" }
        ));
        for c in consistency {
            out.push_str(&format!(
                "- `{}/{}`: {} (final diff {:.4})\n",
                c.problem_id,
                c.submission_id,
                if c.consistent { "consistent" } else { "inconsistent" },
                c.final_score_diff
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Dimension, ExecutionArtifact, FlagSeverity, HallucinationFlag, RubricScores, TestSuiteResult,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn result() -> EvaluationResult {
        EvaluationResult {
            evaluation_id: Uuid::new_v4(),
            evaluated_at: Utc::now(),
            problem_id: "two_sum".into(),
            submission_id: "alice".into(),
            submission_digest: "abc".into(),
            deterministic_score: 6.5,
            judge_adjusted_score: 8.0,
            final_score: 7.1,
            execution: ExecutionArtifact {
                test_results: TestSuiteResult::from_counts(4, 3, 1, 0, Vec::new(), 0.2),
                warnings: Vec::new(),
                runtime_error: None,
                wall_time: 0.3,
                sandbox_violation: false,
                timed_out: false,
                violations: Vec::new(),
            },
            deterministic_scores: RubricScores::new(7.5, 5.5, 9.0, 10.0, 8.0),
            judgments: Vec::new(),
            consensus: None,
            hallucination_flags: vec![HallucinationFlag {
                dimension: Dimension::Correctness,
                description: "correctness=9 but test pass rate=75%".into(),
                severity: FlagSeverity::High,
            }],
            confidence: 0.7,
            fallback_reason: Some("judge weight reduced | test".into()),
        }
    }

    #[test]
    fn test_markdown_table_row() {
        let md = render_markdown_summary(&[result()], &[], &[]);
        assert!(md.contains("| two_sum | alice | 6.50 | 8.00 | 7.10 | 0.70 | 1 | judge weight reduced \\| test |"));
        assert!(md.contains("[high] correctness"));
        assert!(!md.contains("## Grader Accuracy"));
    }

    #[test]
    fn test_results_json_written_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let original = vec![result()];
        write_results_json(&path, &original).unwrap();
        let loaded = read_results_json(&path).unwrap();
        assert_eq!(loaded[0].final_score, 7.1);
        assert_eq!(loaded[0].deterministic_scores, original[0].deterministic_scores);
        assert_eq!(loaded[0].evaluation_id, original[0].evaluation_id);
    }
}
