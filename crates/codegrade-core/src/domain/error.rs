//! Domain-level error taxonomy for codegrade.
//!
//! Component failures that the pipeline recovers from (syntax errors,
//! sandbox violations, timeouts, unavailable judges or linters) are encoded
//! as data on the result records and never appear here. These variants are
//! reserved for faults that abort a single submission's evaluation.

/// codegrade domain errors.
#[derive(Debug, thiserror::Error)]
pub enum GraderError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("source parser unavailable: {0}")]
    Parser(String),

    #[error("worker spawn failed: {0}")]
    Spawn(String),

    #[error("judge provider setup failed: {0}")]
    Provider(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for codegrade domain operations.
pub type GraderResult<T> = std::result::Result<T, GraderError>;
