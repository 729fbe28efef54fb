//! Execution evidence: test outcomes, linter warnings and the per-run artifact.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rule id of the sentinel warning emitted when the linter could not run.
pub const TOOL_ERROR_RULE: &str = "TOOL_ERROR";

/// Outcome of a single test case as reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pass,
    Fail,
    Error,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub name: String,
    pub passed: bool,
    pub status: TestStatus,
    pub message: String,
    /// Seconds; the worker reports timing per suite, so this is 0 unless known.
    pub elapsed: f64,
}

impl TestCaseResult {
    pub fn new(name: impl Into<String>, status: TestStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: status == TestStatus::Pass,
            status,
            message: message.into(),
            elapsed: 0.0,
        }
    }
}

/// Aggregate outcome of a test suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub errored: u32,
    pub tests: Vec<TestCaseResult>,
    pub pass_rate: f64,
    pub elapsed: f64,
}

impl TestSuiteResult {
    /// Build a suite result, widening `total` if the counts exceed it.
    pub fn from_counts(
        total: u32,
        passed: u32,
        failed: u32,
        errored: u32,
        tests: Vec<TestCaseResult>,
        elapsed: f64,
    ) -> Self {
        let total = total.max(passed.saturating_add(failed).saturating_add(errored));
        let pass_rate = if total == 0 {
            0.0
        } else {
            f64::from(passed) / f64::from(total)
        };
        Self {
            total,
            passed,
            failed,
            errored,
            tests,
            pass_rate,
            elapsed,
        }
    }

    /// A single failing synthetic test.
    pub fn synthetic_failure(name: &str, message: impl Into<String>) -> Self {
        Self::from_counts(
            1,
            0,
            1,
            0,
            vec![TestCaseResult::new(name, TestStatus::Fail, message)],
            0.0,
        )
    }

    /// A single errored synthetic test.
    pub fn synthetic_error(name: &str, message: impl Into<String>) -> Self {
        Self::from_counts(
            1,
            0,
            0,
            1,
            vec![TestCaseResult::new(name, TestStatus::Error, message)],
            0.0,
        )
    }

    /// Tests that did not pass, in reported order.
    pub fn failures(&self) -> impl Iterator<Item = &TestCaseResult> {
        self.tests.iter().filter(|t| !t.passed)
    }
}

/// Severity reported for a static warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}

/// One normalized linter diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticWarning {
    pub rule_id: String,
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub severity: WarningSeverity,
}

impl StaticWarning {
    /// Sentinel recorded when the linter is missing or failed.
    pub fn tool_unavailable(message: impl Into<String>) -> Self {
        Self {
            rule_id: TOOL_ERROR_RULE.to_string(),
            message: message.into(),
            line: 0,
            column: 0,
            severity: WarningSeverity::Info,
        }
    }

    pub fn is_tool_error(&self) -> bool {
        self.rule_id == TOOL_ERROR_RULE
    }
}

/// Count warnings that came from the linter itself, ignoring sentinels.
pub fn real_warning_count(warnings: &[StaticWarning]) -> usize {
    warnings.iter().filter(|w| !w.is_tool_error()).count()
}

/// Everything observed while executing and linting one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionArtifact {
    pub test_results: TestSuiteResult,
    pub warnings: Vec<StaticWarning>,
    pub runtime_error: Option<String>,
    /// Wall-clock seconds spent in the sandbox, including spawn overhead.
    pub wall_time: f64,
    pub sandbox_violation: bool,
    pub timed_out: bool,
    #[serde(default)]
    pub violations: Vec<String>,
}
