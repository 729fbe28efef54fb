//! Hallucination auditor.
//!
//! Compares consensus scores against what execution and static analysis
//! actually showed. Each rule raises at most one flag and rules fire
//! independently.

use crate::domain::{
    real_warning_count, Dimension, ExecutionArtifact, FlagSeverity, HallucinationFlag, RubricScores,
};

/// Largest tolerated gap between a deterministic and a consensus dimension.
pub const MAX_DIMENSION_DEVIATION: f64 = 3.0;

fn flag(dimension: Dimension, severity: FlagSeverity, description: String) -> HallucinationFlag {
    HallucinationFlag {
        dimension,
        description,
        severity,
    }
}

fn percent(rate: f64) -> String {
    format!("{:.0}%", rate * 100.0)
}

/// Audit `consensus` against deterministic evidence.
pub fn audit(
    consensus: &RubricScores,
    deterministic: &RubricScores,
    artifact: &ExecutionArtifact,
) -> Vec<HallucinationFlag> {
    let mut flags = Vec::new();
    let pass_rate = artifact.test_results.pass_rate;
    let warnings = real_warning_count(&artifact.warnings);

    if consensus.correctness > 7.0 && pass_rate < 0.7 {
        flags.push(flag(
            Dimension::Correctness,
            FlagSeverity::High,
            format!(
                "correctness={} but test pass rate={}",
                consensus.correctness,
                percent(pass_rate)
            ),
        ));
    }
    if consensus.correctness < 3.0 && pass_rate > 0.9 {
        flags.push(flag(
            Dimension::Correctness,
            FlagSeverity::High,
            format!(
                "correctness={} but test pass rate={}",
                consensus.correctness,
                percent(pass_rate)
            ),
        ));
    }
    if consensus.edge_cases > 8.0 && pass_rate < 0.8 {
        flags.push(flag(
            Dimension::EdgeCases,
            FlagSeverity::Medium,
            format!(
                "edge_cases={} but test pass rate={}",
                consensus.edge_cases,
                percent(pass_rate)
            ),
        ));
    }
    if consensus.style > 8.0 && warnings > 5 {
        flags.push(flag(
            Dimension::Style,
            FlagSeverity::Medium,
            format!("style={} but {} static warnings", consensus.style, warnings),
        ));
    }
    if artifact.timed_out && consensus.correctness > 3.0 {
        flags.push(flag(
            Dimension::Correctness,
            FlagSeverity::High,
            format!("correctness={} but execution timed out", consensus.correctness),
        ));
    }
    if artifact.sandbox_violation && consensus.correctness > 0.0 {
        flags.push(flag(
            Dimension::Correctness,
            FlagSeverity::High,
            format!(
                "correctness={} but submission failed the safety check",
                consensus.correctness
            ),
        ));
    }

    for dim in Dimension::ALL {
        let det = deterministic.get(dim);
        let cons = consensus.get(dim);
        let gap = (det - cons).abs();
        if gap > MAX_DIMENSION_DEVIATION {
            flags.push(flag(
                dim,
                FlagSeverity::Medium,
                format!("{dim}: deterministic={det} vs consensus={cons} (gap {gap:.1})"),
            ));
        }
    }

    if !flags.is_empty() {
        tracing::debug!(count = flags.len(), "hallucination flags raised");
    }
    flags
}
