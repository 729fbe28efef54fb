//! Sandbox: time-bounded, out-of-process execution of submissions.
//!
//! # Modules
//!
//! - [`worker`]: the Python worker program and its sentinel-delimited output parser
//! - [`runner`]: `IsolatedRunner` trait + `PythonProcessRunner`
//! - [`executor`]: `TestExecutor::run_tests()` (safety pre-check, run, normalize)

pub mod executor;
pub mod runner;
pub mod worker;

pub use executor::{ExecutionReport, TestExecutor};
pub use runner::{IsolatedRunner, PythonProcessRunner, RawRunResult, RunRequest};
pub use worker::{parse_worker_output, RESULT_SENTINEL, WORKER_SCRIPT};
