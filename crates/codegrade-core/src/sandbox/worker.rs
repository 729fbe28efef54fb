//! The out-of-process test worker and the parser for its output.
//!
//! The worker writes exactly one sentinel line to stdout followed by one line
//! of JSON. Anything the submission prints is redirected to stderr. The
//! parent trusts only that JSON block; exit codes and stderr are diagnostics.

use serde::Deserialize;

use crate::domain::{TestCaseResult, TestStatus, TestSuiteResult};

/// Line that precedes the JSON result block on stdout.
pub const RESULT_SENTINEL: &str = "===JSON_RESULT===";

/// File names used inside the worker's scratch directory.
pub const SUBMISSION_FILE: &str = "solution.py";
pub const TESTS_FILE: &str = "test_solution.py";
pub const WORKER_FILE: &str = "grade_worker.py";

/// Python program run as the worker.
///
/// argv: `<submission path> <tests path> <entry point>`.
pub const WORKER_SCRIPT: &str = r#"import io
import json
import sys
import time
import unittest

SENTINEL = "===JSON_RESULT==="
MAX_MESSAGE = 2000
RANK = {"PASS": 0, "FAIL": 1, "ERROR": 2}


def _flatten(suite):
    for item in suite:
        if isinstance(item, unittest.TestSuite):
            yield from _flatten(item)
        else:
            yield item


class Recorder(unittest.TestResult):
    """One outcome per test id. Subtest outcomes roll up into their parent."""

    def __init__(self):
        super().__init__()
        self.outcomes = {}

    def _record(self, test, status, message=""):
        key = test.id()
        previous = self.outcomes.get(key)
        if previous is None or RANK[status] > RANK[previous[0]]:
            self.outcomes[key] = (status, message[-MAX_MESSAGE:])

    def addSuccess(self, test):
        super().addSuccess(test)
        self._record(test, "PASS")

    def addFailure(self, test, err):
        super().addFailure(test, err)
        self._record(test, "FAIL", self._exc_info_to_string(err, test))

    def addError(self, test, err):
        super().addError(test, err)
        self._record(test, "ERROR", self._exc_info_to_string(err, test))

    def addSubTest(self, test, subtest, err):
        super().addSubTest(test, subtest, err)
        if err is None:
            return
        status = "FAIL" if issubclass(err[0], test.failureException) else "ERROR"
        self._record(test, status, self._exc_info_to_string(err, test))

    def addSkip(self, test, reason):
        super().addSkip(test, reason)
        self._record(test, "PASS")

    def addExpectedFailure(self, test, err):
        super().addExpectedFailure(test, err)
        self._record(test, "PASS")

    def addUnexpectedSuccess(self, test):
        super().addUnexpectedSuccess(test)
        self._record(test, "FAIL", "unexpected success")


def main():
    submission_path, tests_path, entry_point = sys.argv[1], sys.argv[2], sys.argv[3]
    with open(submission_path, encoding="utf-8") as fh:
        submission_src = fh.read()
    with open(tests_path, encoding="utf-8") as fh:
        tests_src = fh.read()

    result_channel = sys.stdout
    sys.stdout = sys.stderr

    submission_ns = {"__name__": "submission"}
    exec(compile(submission_src, "solution.py", "exec"), submission_ns)
    public = {k: v for k, v in submission_ns.items() if not k.startswith("_")}

    test_ns = {"__name__": "__test_runner__", "unittest": unittest}
    test_ns.update(public)
    if entry_point in submission_ns:
        test_ns[entry_point] = submission_ns[entry_point]
    exec(compile(tests_src, "test_solution.py", "exec"), test_ns)

    loader = unittest.TestLoader()
    suite = unittest.TestSuite()
    seen = set()
    for obj in list(test_ns.values()):
        if not (isinstance(obj, type) and issubclass(obj, unittest.TestCase)):
            continue
        if obj is unittest.TestCase or obj in seen:
            continue
        seen.add(obj)
        for name, value in public.items():
            if not hasattr(obj, name):
                setattr(obj, name, staticmethod(value) if callable(value) else value)
        suite.addTests(loader.loadTestsFromTestCase(obj))

    # The suite drops its tests while running; collect ids first.
    planned = list(dict.fromkeys(test.id() for test in _flatten(suite)))

    recorder = Recorder()
    started = time.time()
    suite.run(recorder)
    elapsed = time.time() - started

    details = []
    for name in planned:
        status, message = recorder.outcomes.pop(name, ("ERROR", "test did not run"))
        details.append({"name": name, "status": status, "message": message})
    for name, (status, message) in recorder.outcomes.items():
        details.append({"name": name, "status": status, "message": message})

    report = {
        "total": len(details),
        "passed": sum(1 for d in details if d["status"] == "PASS"),
        "failed": sum(1 for d in details if d["status"] == "FAIL"),
        "errors": sum(1 for d in details if d["status"] == "ERROR"),
        "elapsed": round(elapsed, 4),
        "details": details,
    }
    result_channel.write(SENTINEL + "\n" + json.dumps(report) + "\n")
    result_channel.flush()


if __name__ == "__main__":
    main()
"#;

#[derive(Debug, Deserialize)]
struct WorkerReport {
    total: i64,
    passed: i64,
    failed: i64,
    errors: i64,
    #[serde(default)]
    elapsed: f64,
    #[serde(default)]
    details: Vec<WorkerDetail>,
}

#[derive(Debug, Deserialize)]
struct WorkerDetail {
    name: String,
    status: String,
    #[serde(default)]
    message: String,
}

/// Parse the sentinel-delimited block from worker stdout.
///
/// Returns `None` when the sentinel is missing or the JSON that follows it
/// is malformed. The last sentinel wins.
pub fn parse_worker_output(stdout: &str) -> Option<TestSuiteResult> {
    let lines: Vec<&str> = stdout.lines().collect();
    let idx = lines.iter().rposition(|l| l.trim() == RESULT_SENTINEL)?;
    let payload = lines[idx + 1..].iter().find(|l| !l.trim().is_empty())?;
    let report: WorkerReport = serde_json::from_str(payload.trim()).ok()?;

    let tests: Vec<TestCaseResult> = report
        .details
        .into_iter()
        .map(|d| {
            let status = match d.status.as_str() {
                "PASS" => TestStatus::Pass,
                "FAIL" => TestStatus::Fail,
                _ => TestStatus::Error,
            };
            TestCaseResult::new(d.name, status, d.message)
        })
        .collect();

    // Per-test records are authoritative; header counts only stand in when
    // the worker sent none.
    let (total, passed, failed, errored) = if tests.is_empty() {
        (
            count(report.total),
            count(report.passed),
            count(report.failed),
            count(report.errors),
        )
    } else {
        let with = |status: TestStatus| count(tests.iter().filter(|t| t.status == status).count() as i64);
        (
            count(tests.len() as i64),
            with(TestStatus::Pass),
            with(TestStatus::Fail),
            with(TestStatus::Error),
        )
    };

    Some(TestSuiteResult::from_counts(
        total,
        passed,
        failed,
        errored,
        tests,
        report.elapsed,
    ))
}

fn count(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_block_after_noise() {
        let stdout = format!(
            "debug print\n{RESULT_SENTINEL}\n{}\n",
            r#"{"total":3,"passed":2,"failed":1,"errors":0,"elapsed":0.01,"details":[{"name":"t.A.test_a","status":"PASS","message":""},{"name":"t.A.test_b","status":"PASS","message":""},{"name":"t.A.test_c","status":"FAIL","message":"AssertionError"}]}"#
        );
        let suite = parse_worker_output(&stdout).unwrap();
        assert_eq!(suite.total, 3);
        assert_eq!(suite.passed, 2);
        assert_eq!(suite.failed, 1);
        assert_eq!(suite.tests.len(), 3);
        assert_eq!(suite.tests[2].status, TestStatus::Fail);
        assert!(!suite.tests[2].passed);
        assert!((suite.pass_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_sentinel() {
        assert!(parse_worker_output("{\"total\":1}").is_none());
        assert!(parse_worker_output("").is_none());
    }

    #[test]
    fn test_malformed_json_after_sentinel() {
        let stdout = format!("{RESULT_SENTINEL}\n{{not json\n");
        assert!(parse_worker_output(&stdout).is_none());
    }

    #[test]
    fn test_last_sentinel_wins() {
        let stdout = format!(
            "{RESULT_SENTINEL}\n{{\"total\":9,\"passed\":9,\"failed\":0,\"errors\":0}}\n{RESULT_SENTINEL}\n{{\"total\":2,\"passed\":1,\"failed\":0,\"errors\":1}}\n"
        );
        let suite = parse_worker_output(&stdout).unwrap();
        assert_eq!(suite.total, 2);
        assert_eq!(suite.errored, 1);
    }

    #[test]
    fn test_counts_follow_details_not_header() {
        let stdout = format!(
            "{RESULT_SENTINEL}\n{}",
            r#"{"total":2,"passed":-1,"failed":3,"errors":0,"details":[{"name":"t.A.test_sub","status":"FAIL","message":"i=0"},{"name":"t.A.test_ok","status":"PASS"}]}"#
        );
        let suite = parse_worker_output(&stdout).unwrap();
        assert_eq!(suite.total, 2);
        assert_eq!(suite.passed, 1);
        assert_eq!(suite.failed, 1);
        assert_eq!(suite.pass_rate, 0.5);
    }

    #[test]
    fn test_negative_header_without_details_clamps() {
        let stdout = format!(
            "{RESULT_SENTINEL}\n{}",
            r#"{"total":1,"passed":-2,"failed":1,"errors":0}"#
        );
        let suite = parse_worker_output(&stdout).unwrap();
        assert_eq!(suite.passed, 0);
        assert_eq!(suite.pass_rate, 0.0);
    }

    #[test]
    fn test_worker_collects_tests_before_running() {
        let planned = WORKER_SCRIPT.find("planned = list(").unwrap();
        let run = WORKER_SCRIPT.find("suite.run(recorder)").unwrap();
        assert!(planned < run);
        assert!(WORKER_SCRIPT.contains("def addSubTest"));
    }

    #[test]
    fn test_unknown_status_is_error() {
        let stdout = format!(
            "{RESULT_SENTINEL}\n{}",
            r#"{"total":1,"passed":0,"failed":0,"errors":1,"details":[{"name":"x","status":"WEIRD"}]}"#
        );
        let suite = parse_worker_output(&stdout).unwrap();
        assert_eq!(suite.tests[0].status, TestStatus::Error);
    }
}
