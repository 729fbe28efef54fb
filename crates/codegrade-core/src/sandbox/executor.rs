//! Test execution: safety pre-check, isolated run, result normalization.

use std::sync::Arc;
use std::time::Duration;

use super::runner::{IsolatedRunner, RawRunResult, RunRequest};
use super::worker::parse_worker_output;
use crate::domain::{GraderError, GraderResult, TestSuiteResult};
use crate::safety::check_code_safety;
use crate::source_model::SourceFacts;

/// Normalized suite result plus the raw record it came from.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub suite: TestSuiteResult,
    pub raw: RawRunResult,
}

/// Runs a submission's tests and always yields a suite result.
pub struct TestExecutor {
    runner: Arc<dyn IsolatedRunner>,
    timeout: Duration,
    stderr_excerpt_chars: usize,
}

impl TestExecutor {
    pub fn new(runner: Arc<dyn IsolatedRunner>, timeout: Duration) -> Self {
        Self {
            runner,
            timeout,
            stderr_excerpt_chars: 500,
        }
    }

    pub fn with_stderr_excerpt(mut self, chars: usize) -> Self {
        self.stderr_excerpt_chars = chars;
        self
    }

    /// Execute `tests` against `submission`.
    ///
    /// Violations, timeouts, crashes and unparseable output all become a
    /// one-test synthetic suite. Only I/O faults while preparing the run
    /// are returned as errors.
    pub async fn run_tests(
        &self,
        facts: &SourceFacts,
        submission: &str,
        tests: &str,
        entry_point: &str,
    ) -> GraderResult<ExecutionReport> {
        let violations = check_code_safety(facts);
        if !violations.is_empty() {
            tracing::warn!(count = violations.len(), "sandbox pre-check rejected submission");
            let raw = RawRunResult {
                stderr: format!("Sandbox violations: {}", violations.join("; ")),
                sandbox_violation: true,
                violations: violations.clone(),
                ..RawRunResult::default()
            };
            let suite = TestSuiteResult::synthetic_error(
                "sandbox_check",
                format!("Sandbox violation: {violations:?}"),
            );
            return Ok(ExecutionReport { suite, raw });
        }

        let request = RunRequest {
            entry_point,
            submission,
            tests,
            timeout: self.timeout,
        };
        let raw = match self.runner.run(&request).await {
            Ok(raw) => raw,
            Err(GraderError::Spawn(reason)) => {
                tracing::error!(%reason, "sandbox worker could not be started");
                RawRunResult {
                    stderr: reason,
                    ..RawRunResult::default()
                }
            }
            Err(e) => return Err(e),
        };

        let suite = self.normalize(&raw);
        tracing::debug!(
            total = suite.total,
            passed = suite.passed,
            timed_out = raw.timed_out,
            "sandbox run complete"
        );
        Ok(ExecutionReport { suite, raw })
    }

    fn normalize(&self, raw: &RawRunResult) -> TestSuiteResult {
        if raw.timed_out {
            return TestSuiteResult::synthetic_failure(
                "execution",
                format!("Timeout after {}s", self.timeout.as_secs_f64()),
            );
        }
        if let Some(suite) = parse_worker_output(&raw.stdout) {
            return suite;
        }
        let excerpt: String = raw.stderr.chars().take(self.stderr_excerpt_chars).collect();
        let excerpt = if excerpt.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            excerpt
        };
        TestSuiteResult::synthetic_error(
            "execution",
            format!("Failed to parse results. stderr: {excerpt}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TestStatus;
    use crate::sandbox::worker::RESULT_SENTINEL;
    use crate::source_model::{PythonSourceAnalyzer, SourceAnalyzer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedRunner {
        result: RawRunResult,
        calls: AtomicU32,
    }

    impl ScriptedRunner {
        fn new(result: RawRunResult) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl IsolatedRunner for ScriptedRunner {
        async fn run(&self, _request: &RunRequest<'_>) -> GraderResult<RawRunResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl IsolatedRunner for FailingRunner {
        async fn run(&self, _request: &RunRequest<'_>) -> GraderResult<RawRunResult> {
            Err(GraderError::Spawn("python3: not found".into()))
        }
    }

    fn facts(src: &str) -> SourceFacts {
        PythonSourceAnalyzer::new().unwrap().analyze(src)
    }

    #[tokio::test]
    async fn test_violation_short_circuits() {
        let runner = ScriptedRunner::new(RawRunResult::default());
        let exec = TestExecutor::new(runner.clone(), Duration::from_secs(3));
        let src = "import os\n";
        let report = exec.run_tests(&facts(src), src, "", "solution").await.unwrap();
        assert!(report.raw.sandbox_violation);
        assert_eq!(report.suite.total, 1);
        assert_eq!(report.suite.errored, 1);
        assert_eq!(report.suite.tests[0].name, "sandbox_check");
        assert!(report.suite.tests[0].message.contains("Blocked import: os"));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_becomes_failing_execution_test() {
        let runner = ScriptedRunner::new(RawRunResult {
            timed_out: true,
            ..RawRunResult::default()
        });
        let exec = TestExecutor::new(runner, Duration::from_secs(3));
        let src = "def solution():\n    pass\n";
        let report = exec.run_tests(&facts(src), src, "", "solution").await.unwrap();
        assert!(report.raw.timed_out);
        assert_eq!(report.suite.total, 1);
        assert_eq!(report.suite.failed, 1);
        assert_eq!(report.suite.tests[0].status, TestStatus::Fail);
        assert_eq!(report.suite.tests[0].message, "Timeout after 3s");
    }

    #[tokio::test]
    async fn test_unparseable_output_uses_stderr_excerpt() {
        let runner = ScriptedRunner::new(RawRunResult {
            stdout: "garbage".into(),
            stderr: "x".repeat(800),
            return_code: Some(1),
            ..RawRunResult::default()
        });
        let exec = TestExecutor::new(runner, Duration::from_secs(3)).with_stderr_excerpt(500);
        let src = "def solution():\n    pass\n";
        let report = exec.run_tests(&facts(src), src, "", "solution").await.unwrap();
        let msg = &report.suite.tests[0].message;
        assert!(msg.starts_with("Failed to parse results. stderr: "));
        assert_eq!(msg.matches('x').count(), 500);
        assert_eq!(report.suite.errored, 1);
    }

    #[tokio::test]
    async fn test_empty_stderr_reports_unknown_error() {
        let runner = ScriptedRunner::new(RawRunResult::default());
        let exec = TestExecutor::new(runner, Duration::from_secs(3));
        let src = "def solution():\n    pass\n";
        let report = exec.run_tests(&facts(src), src, "", "solution").await.unwrap();
        assert!(report.suite.tests[0].message.ends_with("Unknown error"));
    }

    #[tokio::test]
    async fn test_spawn_failure_degrades() {
        let exec = TestExecutor::new(Arc::new(FailingRunner), Duration::from_secs(3));
        let src = "def solution():\n    pass\n";
        let report = exec.run_tests(&facts(src), src, "", "solution").await.unwrap();
        assert_eq!(report.suite.total, 1);
        assert!(report.suite.tests[0].message.contains("not found"));
    }

    #[tokio::test]
    async fn test_exit_code_ignored_when_json_present() {
        let runner = ScriptedRunner::new(RawRunResult {
            stdout: format!(
                "{RESULT_SENTINEL}\n{{\"total\":1,\"passed\":1,\"failed\":0,\"errors\":0}}\n"
            ),
            return_code: Some(3),
            ..RawRunResult::default()
        });
        let exec = TestExecutor::new(runner, Duration::from_secs(3));
        let src = "def solution():\n    pass\n";
        let report = exec.run_tests(&facts(src), src, "", "solution").await.unwrap();
        assert_eq!(report.suite.pass_rate, 1.0);
    }
}
