//! Evidence payloads sent to judges.
//!
//! A payload carries the problem, the comment-stripped submission, the
//! reference solution, the deterministic scores, and the evidence specific
//! to one role. Judges are asked to ground their claims in it.

use std::fmt::Write as _;

use serde_json::json;

use super::roles::{JudgeRole, RESPONSE_CONTRACT};
use super::sanitize::strip_comments;
use crate::domain::{ProblemSpec, RubricScores, StaticWarning, TestSuiteResult};

/// Failed tests included for the test designer.
pub const MAX_FAILED_TESTS: usize = 5;
/// Characters kept from each failure message.
pub const MAX_FAILURE_MESSAGE_CHARS: usize = 200;
/// Warnings included for the code reviewer.
pub const MAX_WARNINGS: usize = 10;

/// Inputs shared by every role for one submission.
#[derive(Debug, Clone, Copy)]
pub struct EvidenceContext<'a> {
    pub problem: &'a ProblemSpec,
    pub submission: &'a str,
    pub deterministic: &'a RubricScores,
    pub suite: &'a TestSuiteResult,
    pub warnings: &'a [StaticWarning],
}

/// A rendered prompt: system instructions plus user payload.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgePrompt {
    pub system: String,
    pub user: String,
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn scores_json(scores: &RubricScores) -> String {
    serde_json::to_string_pretty(scores).unwrap_or_default()
}

fn role_evidence(role: JudgeRole, ctx: &EvidenceContext<'_>) -> String {
    let mut out = String::new();
    match role {
        JudgeRole::TestDesigner => {
            let _ = writeln!(
                out,
                "Test results: {}/{} passed, {} failed, {} errored (pass rate {:.0}%).",
                ctx.suite.passed,
                ctx.suite.total,
                ctx.suite.failed,
                ctx.suite.errored,
                ctx.suite.pass_rate * 100.0
            );
            let failures: Vec<_> = ctx
                .suite
                .failures()
                .take(MAX_FAILED_TESTS)
                .map(|t| {
                    json!({
                        "name": t.name,
                        "status": t.status.to_string(),
                        "message": truncate_chars(&t.message, MAX_FAILURE_MESSAGE_CHARS),
                    })
                })
                .collect();
            if failures.is_empty() {
                out.push_str("No failing tests.\n");
            } else {
                let _ = writeln!(
                    out,
                    "Failing tests:\n{}",
                    serde_json::to_string_pretty(&failures).unwrap_or_default()
                );
            }
        }
        JudgeRole::CodeReviewer => {
            let warnings: Vec<_> = ctx
                .warnings
                .iter()
                .filter(|w| !w.is_tool_error())
                .take(MAX_WARNINGS)
                .map(|w| json!({"rule": w.rule_id, "line": w.line, "message": w.message}))
                .collect();
            let _ = writeln!(
                out,
                "Static analysis warnings ({} shown):\n{}",
                warnings.len(),
                serde_json::to_string_pretty(&warnings).unwrap_or_default()
            );
            let _ = writeln!(
                out,
                "Deterministic style score: {}\nDeterministic clarity score: {}",
                ctx.deterministic.style, ctx.deterministic.clarity
            );
        }
        JudgeRole::ComplexityAnalyst => {
            let _ = writeln!(
                out,
                "Expected optimal complexity: {}\nDeterministic complexity score: {}",
                ctx.problem.expected_complexity, ctx.deterministic.complexity
            );
        }
    }
    out
}

/// Build the prompt for one specialist role.
pub fn build_role_prompt(role: JudgeRole, ctx: &EvidenceContext<'_>) -> JudgePrompt {
    let mut user = String::new();
    let _ = writeln!(user, "## Problem\n{}\n", ctx.problem.description.trim());
    let _ = writeln!(
        user,
        "## Submission (comments removed)\n```python\n{}\n```\n",
        strip_comments(ctx.submission).trim_end()
    );
    let _ = writeln!(
        user,
        "## Reference solution\n```python\n{}\n```\n",
        ctx.problem.reference_solution.trim_end()
    );
    let _ = writeln!(
        user,
        "## Deterministic scores\n{}\n",
        scores_json(ctx.deterministic)
    );
    let _ = writeln!(user, "## Evidence\n{}", role_evidence(role, ctx));
    user.push_str(RESPONSE_CONTRACT);

    JudgePrompt {
        system: role.instructions().to_string(),
        user,
    }
}

/// One specialist opinion as shown to the meta-judge.
#[derive(Debug, Clone, Copy)]
pub struct OpinionSummary<'a> {
    pub judge_name: &'a str,
    pub scores: &'a RubricScores,
    pub confidence: f64,
    pub reasoning: &'a str,
}

/// Build the meta-judge prompt over all specialist opinions.
pub fn build_meta_prompt(
    ctx: &EvidenceContext<'_>,
    opinions: &[OpinionSummary<'_>],
) -> JudgePrompt {
    let opinions_json: Vec<_> = opinions
        .iter()
        .map(|o| {
            json!({
                "judge": o.judge_name,
                "scores": o.scores,
                "confidence": o.confidence,
                "reasoning": truncate_chars(o.reasoning, 500),
            })
        })
        .collect();

    let mut user = String::new();
    let _ = writeln!(user, "## Problem\n{}\n", ctx.problem.description.trim());
    let _ = writeln!(
        user,
        "## Deterministic scores\n{}\n",
        scores_json(ctx.deterministic)
    );
    let _ = writeln!(
        user,
        "## Test pass rate\n{:.2}\n",
        ctx.suite.pass_rate
    );
    let _ = writeln!(
        user,
        "## Specialist opinions\n{}\n",
        serde_json::to_string_pretty(&opinions_json).unwrap_or_default()
    );
    user.push_str(RESPONSE_CONTRACT);
    user.push_str("\nAlso include \"disagreements\": [<dimension>].");

    JudgePrompt {
        system: super::roles::META_JUDGE_INSTRUCTIONS.to_string(),
        user,
    }
}
