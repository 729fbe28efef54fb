//! Error types for judge providers.

/// Errors produced while talking to an external judge model.
///
/// These never leave the judge layer: a role that exhausts its models
/// reports a fallback judgment instead.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("no API key available for judge provider")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model {model} does not support {task}")]
    UnsupportedTask { model: String, task: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("provider call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        JudgeError::Http(err.to_string())
    }
}

/// Result type for judge provider operations.
pub type JudgeResult<T> = std::result::Result<T, JudgeError>;
