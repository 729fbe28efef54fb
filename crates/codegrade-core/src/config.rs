//! Evaluator configuration.
//!
//! Every field has a default so a partial TOML document (or none at all)
//! yields a usable configuration. Call [`EvaluatorConfig::validate`] after
//! loading; the evaluator refuses to start with out-of-range values.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{GraderError, GraderResult, RubricWeights};
use crate::judge::JudgeRole;

/// Default priority-ordered judge models.
pub const DEFAULT_JUDGE_MODELS: [&str; 2] = [
    "Qwen/Qwen2.5-Coder-7B-Instruct",
    "Qwen/Qwen2.5-Coder-1.5B-Instruct",
];

/// Environment variables consulted, in order, for the provider API key.
pub const DEFAULT_API_KEY_VARS: [&str; 3] = ["HF_TOKEN", "HF_API_KEY", "HUGGINGFACE_API_KEY"];

/// Top-level configuration consumed by the evaluator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub sandbox: SandboxConfig,
    pub linter: LinterConfig,
    pub weights: RubricWeights,
    pub judges: JudgeConfig,
    pub scoring: ScoringConfig,
    pub batch: BatchConfig,
}

impl EvaluatorConfig {
    pub fn validate(&self) -> GraderResult<()> {
        self.weights.validate()?;
        self.sandbox.validate()?;
        self.judges.validate()?;
        self.scoring.validate()?;
        if self.batch.max_concurrent == 0 {
            return Err(invalid("batch.max_concurrent must be at least 1"));
        }
        if self.linter.timeout_secs <= 0.0 {
            return Err(invalid("linter.timeout_secs must be positive"));
        }
        Ok(())
    }
}

/// Sandboxed test execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter used to run the worker.
    pub python: String,
    /// Hard wall-clock limit for one worker run (seconds).
    pub timeout_secs: f64,
    /// Characters of worker stderr kept when its output cannot be parsed.
    pub stderr_excerpt_chars: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            timeout_secs: 3.0,
            stderr_excerpt_chars: 500,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    fn validate(&self) -> GraderResult<()> {
        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            return Err(invalid("sandbox.timeout_secs must be positive"));
        }
        if self.python.trim().is_empty() {
            return Err(invalid("sandbox.python must not be empty"));
        }
        Ok(())
    }
}

/// External linter invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinterConfig {
    pub command: String,
    /// Rule families passed to `--select`.
    pub select: Vec<String>,
    pub timeout_secs: f64,
}

impl Default for LinterConfig {
    fn default() -> Self {
        Self {
            command: "ruff".to_string(),
            select: ["E", "W", "F", "C", "N", "B"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: 10.0,
        }
    }
}

/// Retry policy applied per model by the judge invocation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per model, including the first.
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff_base_ms * 2^(n-1)`.
    pub backoff_base_ms: u64,
    /// Wall-clock limit for one provider call.
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            attempt_timeout_ms: 60_000,
        }
    }
}

/// A specialist role and its priority-ordered models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub role: JudgeRole,
    pub models: Vec<String>,
}

/// Optional meta-judge merge pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaJudgeConfig {
    pub enabled: bool,
    pub models: Vec<String>,
}

impl Default for MetaJudgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            models: default_models(),
        }
    }
}

/// External judge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub enabled: bool,
    pub roles: Vec<RoleConfig>,
    pub retry: RetryPolicy,
    pub max_tokens: u32,
    pub temperature: f64,
    pub meta_judge: MetaJudgeConfig,
    /// Base URL for inference requests.
    pub inference_url: String,
    /// Base URL for model metadata lookups.
    pub metadata_url: String,
    pub api_key_env: Vec<String>,
    /// Timeout for one HTTP request (seconds).
    pub request_timeout_secs: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            roles: JudgeRole::ALL
                .iter()
                .map(|role| RoleConfig {
                    role: *role,
                    models: default_models(),
                })
                .collect(),
            retry: RetryPolicy::default(),
            max_tokens: 2048,
            temperature: 0.1,
            meta_judge: MetaJudgeConfig::default(),
            inference_url: "https://router.huggingface.co".to_string(),
            metadata_url: "https://huggingface.co/api/models".to_string(),
            api_key_env: DEFAULT_API_KEY_VARS.iter().map(|s| s.to_string()).collect(),
            request_timeout_secs: 60,
        }
    }
}

impl JudgeConfig {
    /// True when at least one role has a model to call.
    pub fn has_models(&self) -> bool {
        self.roles.iter().any(|r| !r.models.is_empty())
    }

    /// First non-empty API key among the configured environment variables.
    pub fn api_key_from_env(&self) -> Option<String> {
        self.api_key_env
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    }

    fn validate(&self) -> GraderResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("judges.retry.max_attempts must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("judges.temperature must be within [0, 2]"));
        }
        Ok(())
    }
}

/// Blending and audit thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Share of the final score taken from consensus when blending.
    pub judge_weight: f64,
    /// Multiplier applied to `judge_weight` when any hallucination flag fired.
    pub hallucination_weight_reduction: f64,
    /// Consensus confidence required before blending.
    pub min_consensus_confidence: f64,
    /// Max-minus-min spread above which judges disagree on a dimension.
    pub disagreement_threshold: f64,
    /// Confidence assigned to fallback judgments.
    pub fallback_confidence: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            judge_weight: 0.4,
            hallucination_weight_reduction: 0.5,
            min_consensus_confidence: 0.4,
            disagreement_threshold: 2.0,
            fallback_confidence: 0.3,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> GraderResult<()> {
        let unit = |name: &str, v: f64| -> GraderResult<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(invalid(&format!("scoring.{name} must be within [0, 1], got {v}")))
            }
        };
        unit("judge_weight", self.judge_weight)?;
        unit("hallucination_weight_reduction", self.hallucination_weight_reduction)?;
        unit("min_consensus_confidence", self.min_consensus_confidence)?;
        if !(0.0..=0.3).contains(&self.fallback_confidence) {
            return Err(invalid("scoring.fallback_confidence must be within [0, 0.3]"));
        }
        if !(self.disagreement_threshold.is_finite() && self.disagreement_threshold >= 0.0) {
            return Err(invalid("scoring.disagreement_threshold must be non-negative"));
        }
        Ok(())
    }
}

/// Parallelism across submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

fn default_models() -> Vec<String> {
    DEFAULT_JUDGE_MODELS.iter().map(|s| s.to_string()).collect()
}

fn invalid(msg: &str) -> GraderError {
    GraderError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = EvaluatorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.sandbox.timeout_secs, 3.0);
        assert_eq!(cfg.scoring.judge_weight, 0.4);
        assert_eq!(cfg.judges.roles.len(), 3);
        assert!(cfg.judges.has_models());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: EvaluatorConfig = toml::from_str(
            r#"
            [sandbox]
            timeout_secs = 5.0

            [scoring]
            judge_weight = 0.25
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sandbox.timeout_secs, 5.0);
        assert_eq!(cfg.sandbox.python, "python3");
        assert_eq!(cfg.scoring.judge_weight, 0.25);
        assert_eq!(cfg.scoring.disagreement_threshold, 2.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_roles_from_toml() {
        let cfg: EvaluatorConfig = toml::from_str(
            r#"
            [[judges.roles]]
            role = "code_reviewer"
            models = ["org/model-a"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.judges.roles.len(), 1);
        assert_eq!(cfg.judges.roles[0].role, JudgeRole::CodeReviewer);
    }

    #[test]
    fn test_rejects_out_of_range_judge_weight() {
        let mut cfg = EvaluatorConfig::default();
        cfg.scoring.judge_weight = 1.5;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("judge_weight"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut cfg = EvaluatorConfig::default();
        cfg.sandbox.timeout_secs = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let mut cfg = EvaluatorConfig::default();
        cfg.judges.retry.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_empty_roles_have_no_models() {
        let mut cfg = EvaluatorConfig::default();
        cfg.judges.roles.iter_mut().for_each(|r| r.models.clear());
        assert!(!cfg.judges.has_models());
    }
}
