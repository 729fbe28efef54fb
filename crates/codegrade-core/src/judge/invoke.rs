//! Role invocation with per-attempt timeouts, exponential backoff and
//! model fallback.
//!
//! A role walks its model list in order. Transport failures are retried on
//! the same model up to the policy's attempt limit; a response that cannot be
//! parsed moves straight to the next model. When every model is exhausted the
//! role reports a fallback judgment carrying the deterministic scores.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::error::{JudgeError, JudgeResult};
use super::evidence::{build_meta_prompt, build_role_prompt, EvidenceContext, JudgePrompt, OpinionSummary};
use super::parse::{parse_judge_response, ParseOutcome, ParsedJudgment};
use super::provider::{CompletionRequest, JudgeProvider};
use super::roles::JudgeRole;
use crate::config::{JudgeConfig, RetryPolicy, RoleConfig};
use crate::domain::{FallbackCause, JudgeJudgment};

/// Call `provider` for one model, retrying transport failures.
///
/// Each attempt is bounded by `policy.attempt_timeout_ms`; between attempts
/// the wait is `backoff_base_ms * 2^(attempt-1)`.
pub async fn complete_with_retry(
    provider: &dyn JudgeProvider,
    model: &str,
    request: &CompletionRequest,
    policy: &RetryPolicy,
) -> JudgeResult<String> {
    let max_attempts = policy.max_attempts.max(1);
    let timeout = Duration::from_millis(policy.attempt_timeout_ms);
    let mut last_err = JudgeError::Timeout {
        timeout_ms: policy.attempt_timeout_ms,
    };

    for attempt in 1..=max_attempts {
        match tokio::time::timeout(timeout, provider.complete(model, request)).await {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(err)) => {
                tracing::warn!(model, attempt, error = %err, "judge call failed");
                last_err = err;
            }
            Err(_elapsed) => {
                tracing::warn!(model, attempt, timeout_ms = policy.attempt_timeout_ms, "judge call timed out");
                last_err = JudgeError::Timeout {
                    timeout_ms: policy.attempt_timeout_ms,
                };
            }
        }
        if attempt < max_attempts {
            let delay = Duration::from_millis(
                policy
                    .backoff_base_ms
                    .saturating_mul(2u64.saturating_pow(attempt - 1)),
            );
            tokio::time::sleep(delay).await;
        }
    }
    Err(last_err)
}

/// Result of walking a model list.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    Parsed { model: String, judgment: ParsedJudgment },
    Exhausted(FallbackCause),
}

/// Drives judge roles and the meta-judge against one provider.
pub struct JudgeInvoker {
    provider: Arc<dyn JudgeProvider>,
    retry: RetryPolicy,
    max_tokens: u32,
    temperature: f64,
    fallback_confidence: f64,
}

impl JudgeInvoker {
    pub fn new(provider: Arc<dyn JudgeProvider>, config: &JudgeConfig) -> Self {
        Self {
            provider,
            retry: config.retry.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            fallback_confidence: 0.3,
        }
    }

    pub fn with_fallback_confidence(mut self, confidence: f64) -> Self {
        self.fallback_confidence = confidence;
        self
    }

    fn request(&self, prompt: &JudgePrompt) -> CompletionRequest {
        CompletionRequest {
            system: prompt.system.clone(),
            user: prompt.user.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Try each model in order until one returns a valid judgment.
    pub async fn first_valid(&self, models: &[String], prompt: &JudgePrompt) -> ModelOutcome {
        if models.is_empty() {
            return ModelOutcome::Exhausted(FallbackCause::NoModelsConfigured);
        }
        let request = self.request(prompt);
        let mut cause = FallbackCause::ProviderUnavailable;
        for model in models {
            let text = match complete_with_retry(self.provider.as_ref(), model, &request, &self.retry).await {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(model = %model, error = %err, "model exhausted retries");
                    cause = FallbackCause::ProviderUnavailable;
                    continue;
                }
            };
            match parse_judge_response(&text) {
                ParseOutcome::Valid(judgment) => {
                    return ModelOutcome::Parsed {
                        model: model.clone(),
                        judgment,
                    }
                }
                ParseOutcome::NotJson => {
                    tracing::warn!(model = %model, "judge response was not JSON");
                    cause = FallbackCause::InvalidJson;
                }
                ParseOutcome::MissingKeys(keys) => {
                    tracing::warn!(model = %model, missing = ?keys, "judge response missing keys");
                    cause = FallbackCause::MissingKeys(keys);
                }
            }
        }
        ModelOutcome::Exhausted(cause)
    }

    /// Run one specialist role.
    pub async fn run_role(
        &self,
        role: JudgeRole,
        models: &[String],
        ctx: &EvidenceContext<'_>,
    ) -> JudgeJudgment {
        let prompt = build_role_prompt(role, ctx);
        match self.first_valid(models, &prompt).await {
            ModelOutcome::Parsed { model, judgment } => {
                tracing::debug!(role = %role, model = %model, confidence = judgment.confidence, "judge responded");
                JudgeJudgment {
                    judge_name: role.as_str().to_string(),
                    scores: judgment.scores,
                    reasoning: judgment.reasoning,
                    issues: judgment.issues,
                    suggestions: judgment.suggestions,
                    confidence: judgment.confidence,
                    model,
                    fallback: false,
                    fallback_cause: None,
                }
            }
            ModelOutcome::Exhausted(cause) => {
                tracing::warn!(role = %role, cause = %cause, "judge fell back to deterministic scores");
                JudgeJudgment::fallback(
                    role.as_str(),
                    *ctx.deterministic,
                    self.fallback_confidence,
                    cause,
                )
            }
        }
    }

    /// Run every configured role concurrently, in configuration order.
    pub async fn run_panel(&self, roles: &[RoleConfig], ctx: &EvidenceContext<'_>) -> Vec<JudgeJudgment> {
        join_all(
            roles
                .iter()
                .map(|rc| self.run_role(rc.role, &rc.models, ctx)),
        )
        .await
    }

    /// Ask the meta-judge to merge specialist opinions.
    ///
    /// Returns `None` when no meta-judge model produced a valid response.
    pub async fn run_meta(
        &self,
        models: &[String],
        ctx: &EvidenceContext<'_>,
        judgments: &[JudgeJudgment],
    ) -> Option<(String, ParsedJudgment)> {
        let opinions: Vec<OpinionSummary<'_>> = judgments
            .iter()
            .map(|j| OpinionSummary {
                judge_name: &j.judge_name,
                scores: &j.scores,
                confidence: j.confidence,
                reasoning: &j.reasoning,
            })
            .collect();
        let prompt = build_meta_prompt(ctx, &opinions);
        match self.first_valid(models, &prompt).await {
            ModelOutcome::Parsed { model, judgment } => Some((model, judgment)),
            ModelOutcome::Exhausted(cause) => {
                tracing::warn!(cause = %cause, "meta-judge unavailable");
                None
            }
        }
    }
}
