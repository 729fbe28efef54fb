//! Domain models for codegrade.
//!
//! Canonical definitions for the entities one evaluation produces:
//! - `TestSuiteResult` / `StaticWarning` / `ExecutionArtifact`: execution evidence
//! - `RubricScores`: the five-dimension score vector
//! - `JudgeJudgment` / `ConsensusResult` / `HallucinationFlag`: judge-side records
//! - `EvaluationResult`: the terminal aggregate handed to reporting

pub mod error;
pub mod evaluation;
pub mod execution;
pub mod judgment;
pub mod rubric;

pub use error::{GraderError, GraderResult};
pub use evaluation::{
    EvaluationResult, ProblemSpec, Submission, DEFAULT_ENTRY_POINT, DEFAULT_EXPECTED_COMPLEXITY,
};
pub use execution::{
    real_warning_count, ExecutionArtifact, StaticWarning, TestCaseResult, TestStatus,
    TestSuiteResult, WarningSeverity, TOOL_ERROR_RULE,
};
pub use judgment::{
    ConsensusMethod, ConsensusResult, Disagreement, FallbackCause, FlagSeverity,
    HallucinationFlag, JudgeJudgment,
};
pub use rubric::{clamp_score, round_to, Dimension, RubricScores, RubricWeights};
