//! Evaluation-scoped spans and lifecycle events.

use std::time::Instant;

use tracing::{info, Span};

use crate::domain::EvaluationResult;

/// RAII guard for one submission evaluation.
///
/// Creation logs `evaluation.started`; dropping logs `evaluation.finished`
/// with the elapsed milliseconds, whether or not the evaluation succeeded.
/// The span itself is attached to futures with [`tracing::Instrument`].
pub struct SpanGuard {
    problem_id: String,
    submission_id: String,
    started: Instant,
    span: Span,
}

impl SpanGuard {
    pub fn start(problem_id: &str, submission_id: &str) -> Self {
        let span = tracing::info_span!(
            "codegrade.evaluation",
            problem_id = %problem_id,
            submission_id = %submission_id
        );
        span.in_scope(|| {
            info!(event = "evaluation.started", problem_id = %problem_id, submission_id = %submission_id);
        });
        Self {
            problem_id: problem_id.to_string(),
            submission_id: submission_id.to_string(),
            started: Instant::now(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        self.span.in_scope(|| {
            info!(
                event = "evaluation.finished",
                problem_id = %self.problem_id,
                submission_id = %self.submission_id,
                elapsed_ms,
            );
        });
    }
}

/// Emit the scored outcome of one evaluation.
pub fn emit_evaluation_scored(result: &EvaluationResult) {
    info!(
        event = "evaluation.scored",
        problem_id = %result.problem_id,
        submission_id = %result.submission_id,
        deterministic = result.deterministic_score,
        final_score = result.final_score,
        confidence = result.confidence,
        flags = result.hallucination_flags.len(),
        fallback = result.fallback_reason.is_some(),
    );
}

/// Emit a batch member that could not be evaluated.
pub fn emit_evaluation_failed(problem_id: &str, submission_id: &str, error: &dyn std::fmt::Display) {
    tracing::error!(
        event = "evaluation.failed",
        problem_id = %problem_id,
        submission_id = %submission_id,
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_guard_measures_elapsed() {
        let guard = SpanGuard::start("p", "s");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(guard.elapsed_ms() >= 1);
    }
}
