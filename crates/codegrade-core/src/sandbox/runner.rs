//! Isolated runner: one OS process per execution, hard wall-clock limit.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::worker::{SUBMISSION_FILE, TESTS_FILE, WORKER_FILE, WORKER_SCRIPT};
use crate::domain::{GraderError, GraderResult};

/// Inputs for one isolated run.
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub entry_point: &'a str,
    pub submission: &'a str,
    pub tests: &'a str,
    pub timeout: Duration,
}

/// What came back from the worker, untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRunResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed or terminated by a signal.
    pub return_code: Option<i32>,
    pub timed_out: bool,
    pub sandbox_violation: bool,
    pub violations: Vec<String>,
    /// Seconds between spawn and exit (or kill).
    pub wall_time: f64,
}

/// Runs submission and tests out of process.
#[async_trait]
pub trait IsolatedRunner: Send + Sync {
    /// Execute the tests once.
    ///
    /// Timeouts are reported through `RawRunResult::timed_out`. `Err` is
    /// reserved for failures to set up or spawn the worker.
    async fn run(&self, request: &RunRequest<'_>) -> GraderResult<RawRunResult>;
}

/// Runs the Python worker with `tokio::process`.
#[derive(Debug, Clone)]
pub struct PythonProcessRunner {
    python: String,
}

impl PythonProcessRunner {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl Default for PythonProcessRunner {
    fn default() -> Self {
        Self::new("python3")
    }
}

async fn materialize(dir: &Path, request: &RunRequest<'_>) -> GraderResult<()> {
    tokio::fs::write(dir.join(SUBMISSION_FILE), request.submission).await?;
    tokio::fs::write(dir.join(TESTS_FILE), request.tests).await?;
    tokio::fs::write(dir.join(WORKER_FILE), WORKER_SCRIPT).await?;
    Ok(())
}

#[async_trait]
impl IsolatedRunner for PythonProcessRunner {
    async fn run(&self, request: &RunRequest<'_>) -> GraderResult<RawRunResult> {
        let scratch = tempfile::tempdir()?;
        materialize(scratch.path(), request).await?;

        let start = Instant::now();
        let child = Command::new(&self.python)
            .arg(WORKER_FILE)
            .arg(SUBMISSION_FILE)
            .arg(TESTS_FILE)
            .arg(request.entry_point)
            .current_dir(scratch.path())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GraderError::Spawn(format!("{}: {e}", self.python)))?;

        // Dropping the future on timeout drops the child, which kills it.
        match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                Ok(RawRunResult {
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    return_code: output.status.code(),
                    wall_time: start.elapsed().as_secs_f64(),
                    ..RawRunResult::default()
                })
            }
            Err(_elapsed) => {
                tracing::warn!(
                    timeout_secs = request.timeout.as_secs_f64(),
                    "sandbox worker exceeded wall-clock limit; killed"
                );
                Ok(RawRunResult {
                    stderr: format!(
                        "Execution timed out after {}s",
                        request.timeout.as_secs_f64()
                    ),
                    timed_out: true,
                    wall_time: request.timeout.as_secs_f64(),
                    ..RawRunResult::default()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TestStatus;
    use crate::sandbox::worker::parse_worker_output;

    /// Skipped only when `CODEGRADE_SKIP_PYTHON_TESTS` is set.
    fn python_tests_enabled() -> bool {
        if std::env::var_os("CODEGRADE_SKIP_PYTHON_TESTS").is_some() {
            return false;
        }
        let found = std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        assert!(
            found,
            "python3 is required for sandbox tests; set CODEGRADE_SKIP_PYTHON_TESTS=1 to skip"
        );
        true
    }

    fn request<'a>(submission: &'a str, tests: &'a str, secs: f64) -> RunRequest<'a> {
        RunRequest {
            entry_point: "solution",
            submission,
            tests,
            timeout: Duration::from_secs_f64(secs),
        }
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_error() {
        let runner = PythonProcessRunner::new("definitely-not-a-python-binary");
        let err = runner
            .run(&request("x = 1", "", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, GraderError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_runs_worker_and_emits_sentinel() {
        if !python_tests_enabled() {
            return;
        }
        let submission = "def solution(a, b):\n    return a + b\n";
        let tests = "\
class TestAdd(unittest.TestCase):
    def test_ok(self):
        self.assertEqual(solution(1, 2), 3)

    def test_bad(self):
        self.assertEqual(solution(1, 1), 3)
";
        let raw = PythonProcessRunner::default()
            .run(&request(submission, tests, 10.0))
            .await
            .unwrap();
        assert!(!raw.timed_out);
        let suite = parse_worker_output(&raw.stdout).unwrap();
        assert_eq!(suite.total, 2);
        assert_eq!(suite.passed, 1);
        assert_eq!(suite.failed, 1);
        let bad = suite
            .tests
            .iter()
            .find(|t| t.name.ends_with("TestAdd.test_bad"))
            .unwrap();
        assert_eq!(bad.status, TestStatus::Fail);
        assert!(bad.message.contains("AssertionError"));
    }

    #[tokio::test]
    async fn test_failing_subtests_roll_up_into_one_test() {
        if !python_tests_enabled() {
            return;
        }
        let submission = "def solution(x):\n    return x\n";
        let tests = "\
class TestSub(unittest.TestCase):
    def test_many(self):
        for i in range(3):
            with self.subTest(i=i):
                self.assertEqual(solution(i), -1)

    def test_fine(self):
        self.assertEqual(solution(2), 2)
";
        let raw = PythonProcessRunner::default()
            .run(&request(submission, tests, 10.0))
            .await
            .unwrap();
        let suite = parse_worker_output(&raw.stdout).unwrap();
        assert_eq!(suite.total, 2);
        assert_eq!(suite.passed, 1);
        assert_eq!(suite.failed, 1);
        assert_eq!(suite.pass_rate, 0.5);
        let many = suite
            .tests
            .iter()
            .find(|t| t.name.ends_with("test_many"))
            .unwrap();
        assert_eq!(many.status, TestStatus::Fail);
    }

    #[tokio::test]
    async fn test_submission_load_error_has_no_sentinel() {
        if !python_tests_enabled() {
            return;
        }
        let submission = "from math import does_not_exist\n";
        let raw = PythonProcessRunner::default()
            .run(&request(submission, "", 10.0))
            .await
            .unwrap();
        assert!(parse_worker_output(&raw.stdout).is_none());
        assert!(raw.stderr.contains("ImportError"));
        assert_ne!(raw.return_code, Some(0));
    }

    #[tokio::test]
    async fn test_timeout_kills_worker() {
        if !python_tests_enabled() {
            return;
        }
        let submission = "import time\ntime.sleep(30)\n";
        let raw = PythonProcessRunner::default()
            .run(&request(submission, "", 0.5))
            .await
            .unwrap();
        assert!(raw.timed_out);
        assert!(raw.return_code.is_none());
    }
}
