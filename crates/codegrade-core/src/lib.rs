//! codegrade core library.
//!
//! Grades a code submission from two independent signals, deterministic
//! execution and static analysis on one side and external judge opinions on
//! the other, then reconciles them into one score with an explanation of
//! how much the judges were trusted.

pub mod audit;
pub mod blend;
pub mod calibration;
pub mod config;
pub mod consensus;
pub mod domain;
pub mod judge;
pub mod lint;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod reporting;
pub mod rubric;
pub mod safety;
pub mod sandbox;
pub mod source_model;
pub mod telemetry;

pub use domain::{
    ConsensusMethod, ConsensusResult, Dimension, EvaluationResult, ExecutionArtifact, FallbackCause,
    FlagSeverity, GraderError, GraderResult, HallucinationFlag, JudgeJudgment, ProblemSpec,
    RubricScores, RubricWeights, StaticWarning, Submission, TestSuiteResult,
};

pub use config::{
    BatchConfig, EvaluatorConfig, JudgeConfig, LinterConfig, MetaJudgeConfig, RetryPolicy,
    RoleConfig, SandboxConfig, ScoringConfig,
};

pub use audit::audit;
pub use blend::{blend, BlendOutcome};
pub use calibration::{check_consistency, grader_accuracy, AccuracyMetrics, ConsistencyReport, GoldScore};
pub use consensus::merge;
pub use judge::{HuggingFaceProvider, JudgeProvider, JudgeRole, ModelCapabilityCache};
pub use lint::{RuffAnalyzer, StaticAnalyzer};
pub use metrics::METRICS;
pub use pipeline::Evaluator;
pub use reporting::{read_results_json, render_markdown_summary, write_results_json};
pub use safety::check_code_safety;
pub use sandbox::{IsolatedRunner, PythonProcessRunner, RawRunResult, RunRequest, TestExecutor};
pub use source_model::{PythonSourceAnalyzer, SourceAnalyzer, SourceFacts};
pub use telemetry::init_tracing;

/// Crate version, for reports and user agents.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
