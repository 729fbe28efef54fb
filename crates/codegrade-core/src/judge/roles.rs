//! Specialist judge roles and their instructions.

use serde::{Deserialize, Serialize};

/// The specialist archetypes that review a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeRole {
    /// Judges test adequacy and edge-case handling from the failures.
    TestDesigner,
    /// Judges style and readability from the linter findings.
    CodeReviewer,
    /// Judges algorithmic efficiency against the expected complexity.
    ComplexityAnalyst,
}

impl JudgeRole {
    pub const ALL: [JudgeRole; 3] = [
        JudgeRole::TestDesigner,
        JudgeRole::CodeReviewer,
        JudgeRole::ComplexityAnalyst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JudgeRole::TestDesigner => "test_designer",
            JudgeRole::CodeReviewer => "code_reviewer",
            JudgeRole::ComplexityAnalyst => "complexity_analyst",
        }
    }

    /// Role-specific system instructions.
    pub fn instructions(&self) -> &'static str {
        match self {
            JudgeRole::TestDesigner => {
                "You are a test designer grading a code submission. Focus on correctness \
                 and edge-case handling. Base every claim on the test results provided; \
                 do not contradict them."
            }
            JudgeRole::CodeReviewer => {
                "You are a senior code reviewer grading a code submission. Focus on style, \
                 naming and readability. Base every claim on the static analysis findings \
                 provided; do not invent warnings."
            }
            JudgeRole::ComplexityAnalyst => {
                "You are an algorithms expert grading a code submission. Focus on time and \
                 space complexity relative to the expected optimal class. Compare against \
                 the reference solution."
            }
        }
    }
}

impl std::fmt::Display for JudgeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Response contract appended to every judge prompt.
pub const RESPONSE_CONTRACT: &str = "Respond with a single JSON object and nothing else:\n\
{\"scores\": {\"correctness\": <0-10>, \"edge_cases\": <0-10>, \"complexity\": <0-10>, \
\"style\": <0-10>, \"clarity\": <0-10>}, \"issues\": [<string>], \"suggestions\": [<string>], \
\"reasoning\": <string>, \"confidence\": <0-1>}";

/// Instructions for the meta-judge merge pass.
pub const META_JUDGE_INSTRUCTIONS: &str = "You are the lead grader. Read the specialist \
opinions and the deterministic scores below and produce one merged rubric. Where a specialist \
contradicts the deterministic evidence, trust the evidence. List dimensions where specialists \
disagree under \"disagreements\".";
