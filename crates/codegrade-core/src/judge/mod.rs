//! Judge invocation layer.
//!
//! Three specialist roles (test designer, code reviewer, complexity analyst)
//! receive role-specific evidence and answer with a JSON rubric. Calls go
//! through a [`JudgeProvider`]; [`JudgeInvoker`] adds retries, per-attempt
//! timeouts and model fallback, and never fails: an exhausted role yields a
//! fallback [`JudgeJudgment`](crate::domain::JudgeJudgment).

pub mod error;
pub mod evidence;
pub mod invoke;
pub mod parse;
pub mod provider;
pub mod roles;
pub mod sanitize;

pub use error::{JudgeError, JudgeResult};
pub use evidence::{build_meta_prompt, build_role_prompt, EvidenceContext, JudgePrompt, OpinionSummary};
pub use invoke::{complete_with_retry, JudgeInvoker, ModelOutcome};
pub use parse::{extract_json_object, parse_judge_response, validate_judgment, ParseOutcome, ParsedJudgment};
pub use provider::{
    capability_from_metadata, CompletionRequest, HuggingFaceProvider, JudgeProvider, ModelCapability,
    ModelCapabilityCache,
};
pub use roles::JudgeRole;
pub use sanitize::strip_comments;
