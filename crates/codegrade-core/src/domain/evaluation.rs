//! Problem and submission inputs, and the terminal evaluation record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::execution::ExecutionArtifact;
use super::judgment::{ConsensusResult, HallucinationFlag, JudgeJudgment};
use super::rubric::RubricScores;

/// Default name of the function under test.
pub const DEFAULT_ENTRY_POINT: &str = "solution";

/// Default expected complexity class.
pub const DEFAULT_EXPECTED_COMPLEXITY: &str = "O(n)";

/// A reference problem that submissions are graded against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemSpec {
    pub problem_id: String,
    pub description: String,
    pub reference_solution: String,
    pub test_suite: String,
    pub entry_point: String,
    pub expected_complexity: String,
}

impl ProblemSpec {
    pub fn new(
        problem_id: impl Into<String>,
        description: impl Into<String>,
        reference_solution: impl Into<String>,
        test_suite: impl Into<String>,
    ) -> Self {
        Self {
            problem_id: problem_id.into(),
            description: description.into(),
            reference_solution: reference_solution.into(),
            test_suite: test_suite.into(),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            expected_complexity: DEFAULT_EXPECTED_COMPLEXITY.to_string(),
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_expected_complexity(mut self, complexity: impl Into<String>) -> Self {
        self.expected_complexity = complexity.into();
        self
    }
}

/// One candidate solution to a problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: String,
    pub source: String,
}

impl Submission {
    pub fn new(submission_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            submission_id: submission_id.into(),
            source: source.into(),
        }
    }

    /// SHA-256 hex digest of the source text.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Terminal aggregate for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub evaluation_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub problem_id: String,
    pub submission_id: String,
    pub submission_digest: String,
    pub deterministic_score: f64,
    pub judge_adjusted_score: f64,
    pub final_score: f64,
    pub execution: ExecutionArtifact,
    pub deterministic_scores: RubricScores,
    pub judgments: Vec<JudgeJudgment>,
    pub consensus: Option<ConsensusResult>,
    pub hallucination_flags: Vec<HallucinationFlag>,
    pub confidence: f64,
    pub fallback_reason: Option<String>,
}
