//! End-to-end evaluation of one submission, and of many in parallel.
//!
//! Stages run in a fixed order: source facts, sandboxed tests, static
//! warnings, deterministic rubric, judges, consensus, audit, blend. Every
//! recoverable failure is folded into the result; `Err` means the
//! submission could not be evaluated at all (for example, the scratch
//! directory could not be written).

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

use crate::audit::audit;
use crate::blend::{blend, BlendOutcome};
use crate::config::EvaluatorConfig;
use crate::consensus::{all_fallback, merge_with_meta};
use crate::domain::{
    EvaluationResult, ExecutionArtifact, GraderError, GraderResult, ProblemSpec, Submission,
};
use crate::judge::{EvidenceContext, HuggingFaceProvider, JudgeInvoker, JudgeProvider, ModelCapabilityCache};
use crate::lint::{RuffAnalyzer, StaticAnalyzer};
use crate::metrics::METRICS;
use crate::obs::{emit_evaluation_failed, emit_evaluation_scored, SpanGuard};
use crate::rubric::{self, RubricInputs};
use crate::sandbox::{IsolatedRunner, PythonProcessRunner, TestExecutor};
use crate::source_model::{PythonSourceAnalyzer, SourceAnalyzer};

/// Fallback reasons recorded when no judge ran.
pub const JUDGES_DISABLED_REASON: &str = "judges disabled";
pub const NO_MODELS_REASON: &str = "no models configured";
pub const NO_PROVIDER_REASON: &str = "no judge provider available";

/// Orchestrates every grading stage for one configuration.
pub struct Evaluator {
    config: EvaluatorConfig,
    analyzer: Arc<dyn SourceAnalyzer>,
    executor: TestExecutor,
    linter: Arc<dyn StaticAnalyzer>,
    invoker: Option<JudgeInvoker>,
}

impl Evaluator {
    /// Assemble an evaluator from explicit collaborators, without judges.
    pub fn new(
        config: EvaluatorConfig,
        analyzer: Arc<dyn SourceAnalyzer>,
        runner: Arc<dyn IsolatedRunner>,
        linter: Arc<dyn StaticAnalyzer>,
    ) -> Self {
        let executor = TestExecutor::new(runner, config.sandbox.timeout())
            .with_stderr_excerpt(config.sandbox.stderr_excerpt_chars);
        Self {
            config,
            analyzer,
            executor,
            linter,
            invoker: None,
        }
    }

    /// Attach a judge provider.
    pub fn with_provider(mut self, provider: Arc<dyn JudgeProvider>) -> Self {
        let invoker = JudgeInvoker::new(provider, &self.config.judges)
            .with_fallback_confidence(self.config.scoring.fallback_confidence);
        self.invoker = Some(invoker);
        self
    }

    /// Build the production stack: tree-sitter, a Python subprocess runner,
    /// ruff, and a Hugging Face provider when an API key is available.
    pub fn from_config(config: EvaluatorConfig) -> GraderResult<Self> {
        config.validate()?;
        let analyzer = Arc::new(PythonSourceAnalyzer::new()?);
        let runner = Arc::new(PythonProcessRunner::new(config.sandbox.python.clone()));
        let linter = Arc::new(RuffAnalyzer::new(&config.linter));

        let provider = if config.judges.enabled && config.judges.has_models() {
            match config.judges.api_key_from_env() {
                Some(key) => {
                    let cache = Arc::new(ModelCapabilityCache::new());
                    let provider = HuggingFaceProvider::new(&config.judges, key, cache)
                        .map_err(|e| GraderError::Provider(e.to_string()))?;
                    Some(Arc::new(provider) as Arc<dyn JudgeProvider>)
                }
                None => {
                    tracing::warn!(
                        vars = ?config.judges.api_key_env,
                        "no judge API key found; grading deterministically"
                    );
                    None
                }
            }
        } else {
            None
        };

        let evaluator = Self::new(config, analyzer, runner, linter);
        Ok(match provider {
            Some(p) => evaluator.with_provider(p),
            None => evaluator,
        })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Grade one submission.
    pub async fn evaluate(
        &self,
        problem: &ProblemSpec,
        submission: &Submission,
    ) -> GraderResult<EvaluationResult> {
        let guard = SpanGuard::start(&problem.problem_id, &submission.submission_id);
        self.run_stages(problem, submission)
            .instrument(guard.span())
            .await
    }

    async fn run_stages(
        &self,
        problem: &ProblemSpec,
        submission: &Submission,
    ) -> GraderResult<EvaluationResult> {
        let source = submission.source.as_str();

        let facts = self.analyzer.analyze(source);
        let report = self
            .executor
            .run_tests(&facts, source, &problem.test_suite, &problem.entry_point)
            .await?;
        let warnings = self.linter.collect(source).await;

        let excerpt: String = report
            .raw
            .stderr
            .chars()
            .take(self.config.sandbox.stderr_excerpt_chars)
            .collect();
        let artifact = ExecutionArtifact {
            test_results: report.suite,
            warnings,
            runtime_error: (!excerpt.trim().is_empty()).then_some(excerpt),
            wall_time: report.raw.wall_time,
            sandbox_violation: report.raw.sandbox_violation,
            timed_out: report.raw.timed_out,
            violations: report.raw.violations,
        };

        let deterministic_scores = rubric::score(&RubricInputs {
            source,
            facts: &facts,
            suite: &artifact.test_results,
            warnings: &artifact.warnings,
            expected_complexity: &problem.expected_complexity,
        });
        let deterministic_score = deterministic_scores.overall_with(&self.config.weights);

        let judges = &self.config.judges;
        let skip_reason = if !judges.enabled {
            Some(JUDGES_DISABLED_REASON)
        } else if !judges.has_models() {
            Some(NO_MODELS_REASON)
        } else if self.invoker.is_none() {
            Some(NO_PROVIDER_REASON)
        } else {
            None
        };

        let mut judgments = Vec::new();
        let mut consensus = None;
        let mut flags = Vec::new();
        let outcome = match (skip_reason, &self.invoker) {
            (None, Some(invoker)) => {
                let ctx = EvidenceContext {
                    problem,
                    submission: source,
                    deterministic: &deterministic_scores,
                    suite: &artifact.test_results,
                    warnings: &artifact.warnings,
                };
                judgments = invoker.run_panel(&judges.roles, &ctx).await;
                let threshold = self.config.scoring.disagreement_threshold;
                let merged = merge_with_meta(invoker, &judges.meta_judge, &ctx, &judgments, threshold).await;
                flags = audit(&merged.scores, &deterministic_scores, &artifact);
                let outcome = blend(
                    deterministic_score,
                    &merged,
                    all_fallback(&judgments),
                    &flags,
                    &self.config.weights,
                    &self.config.scoring,
                );
                consensus = Some(merged);
                outcome
            }
            (reason, _) => {
                let reason = reason.unwrap_or(NO_PROVIDER_REASON);
                tracing::debug!(reason, "skipping judges");
                BlendOutcome::deterministic_only(deterministic_score, reason)
            }
        };

        METRICS.inc_evaluations();
        if artifact.sandbox_violation {
            METRICS.inc_sandbox_violations();
        }
        if artifact.timed_out {
            METRICS.inc_timeouts();
        }
        METRICS.add_judge_fallbacks(judgments.iter().filter(|j| j.fallback).count() as u64);
        METRICS.add_hallucination_flags(flags.len() as u64);

        let result = EvaluationResult {
            evaluation_id: Uuid::new_v4(),
            evaluated_at: Utc::now(),
            problem_id: problem.problem_id.clone(),
            submission_id: submission.submission_id.clone(),
            submission_digest: submission.digest(),
            deterministic_score,
            judge_adjusted_score: outcome.judge_adjusted_score,
            final_score: outcome.final_score,
            execution: artifact,
            deterministic_scores,
            judgments,
            consensus,
            hallucination_flags: flags,
            confidence: outcome.confidence,
            fallback_reason: outcome.fallback_reason,
        };
        emit_evaluation_scored(&result);
        Ok(result)
    }

    /// Grade many submissions concurrently, bounded by `batch.max_concurrent`.
    ///
    /// Results keep input order. A submission whose evaluation fails is
    /// logged and left out; the rest still complete.
    pub async fn evaluate_batch(
        self: &Arc<Self>,
        jobs: Vec<(Arc<ProblemSpec>, Submission)>,
    ) -> Vec<EvaluationResult> {
        let sem = Arc::new(Semaphore::new(self.config.batch.max_concurrent.max(1)));
        let mut tasks = Vec::with_capacity(jobs.len());

        for (problem, submission) in jobs {
            let evaluator = Arc::clone(self);
            let sem = Arc::clone(&sem);
            let ids = (problem.problem_id.clone(), submission.submission_id.clone());
            let task = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                evaluator.evaluate(&problem, &submission).await
            });
            tasks.push((ids, task));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for ((problem_id, submission_id), task) in tasks {
            match task.await {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => emit_evaluation_failed(&problem_id, &submission_id, &e),
                Err(join_err) => emit_evaluation_failed(&problem_id, &submission_id, &join_err),
            }
        }
        results
    }
}
