//! Static warning collection through an external linter.
//!
//! The linter is optional infrastructure: when it is missing, times out or
//! produces output we cannot read, the collector returns a single
//! `TOOL_ERROR` sentinel warning instead of failing the evaluation.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::config::LinterConfig;
use crate::domain::{StaticWarning, WarningSeverity};

/// Ways a linter run can fail. Each one becomes a `TOOL_ERROR` warning.
#[derive(Debug, thiserror::Error)]
pub enum LintError {
    #[error("scratch file setup failed: {0}")]
    Scratch(#[from] std::io::Error),

    #[error("{command} unavailable: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed while running: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("{command} exited with {code:?}: {stderr}")]
    ExitStatus {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unreadable linter output: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for linter runs.
pub type LintResult<T> = std::result::Result<T, LintError>;

/// Produces static warnings for a submission.
#[async_trait]
pub trait StaticAnalyzer: Send + Sync {
    async fn collect(&self, source: &str) -> Vec<StaticWarning>;
}

/// Runs `ruff check --output-format json`.
#[derive(Debug, Clone)]
pub struct RuffAnalyzer {
    command: String,
    select: Vec<String>,
    timeout: Duration,
}

impl RuffAnalyzer {
    pub fn new(config: &LinterConfig) -> Self {
        Self {
            command: config.command.clone(),
            select: config.select.clone(),
            timeout: Duration::from_secs_f64(config.timeout_secs),
        }
    }

    /// One linter invocation on `source`.
    pub async fn run(&self, source: &str) -> LintResult<Vec<StaticWarning>> {
        let scratch = tempfile::tempdir()?;
        let path = scratch.path().join("submission.py");
        tokio::fs::write(&path, source).await?;

        let child = Command::new(&self.command)
            .arg("check")
            .arg("--output-format")
            .arg("json")
            .arg("--select")
            .arg(self.select.join(","))
            .arg("--no-cache")
            .arg(&path)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LintError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| LintError::Timeout {
                command: self.command.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| LintError::Wait {
                command: self.command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            // 0 = clean, 1 = violations found; anything else is a tool failure.
            return match output.status.code() {
                Some(0) | Some(1) => Ok(Vec::new()),
                code => Err(LintError::ExitStatus {
                    command: self.command.clone(),
                    code,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                }),
            };
        }
        Ok(parse_ruff_json(&stdout)?)
    }
}

#[async_trait]
impl StaticAnalyzer for RuffAnalyzer {
    async fn collect(&self, source: &str) -> Vec<StaticWarning> {
        match self.run(source).await {
            Ok(warnings) => {
                tracing::debug!(count = warnings.len(), "static analysis complete");
                warnings
            }
            Err(err) => {
                tracing::warn!(error = %err, "static analyzer unavailable");
                vec![StaticWarning::tool_unavailable(err.to_string())]
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RuffDiagnostic {
    code: Option<String>,
    #[serde(default)]
    message: String,
    location: Option<RuffLocation>,
}

#[derive(Debug, Deserialize)]
struct RuffLocation {
    #[serde(default)]
    row: u32,
    #[serde(default)]
    column: u32,
}

/// Parse ruff's JSON array into normalized warnings.
pub fn parse_ruff_json(stdout: &str) -> Result<Vec<StaticWarning>, serde_json::Error> {
    let diagnostics: Vec<RuffDiagnostic> = serde_json::from_str(stdout.trim())?;
    Ok(diagnostics
        .into_iter()
        .map(|d| {
            let rule_id = d.code.unwrap_or_else(|| "syntax-error".to_string());
            let (line, column) = d.location.map(|l| (l.row, l.column)).unwrap_or((0, 0));
            StaticWarning {
                severity: severity_for(&rule_id),
                rule_id,
                message: d.message,
                line,
                column,
            }
        })
        .collect())
}

/// Pyflakes findings and E9xx (syntax/IO) are errors, other families warnings.
fn severity_for(rule_id: &str) -> WarningSeverity {
    if rule_id.starts_with('F') || rule_id.starts_with("E9") || rule_id == "syntax-error" {
        WarningSeverity::Error
    } else if rule_id.starts_with(&['E', 'W', 'B', 'C', 'N'][..]) {
        WarningSeverity::Warning
    } else {
        WarningSeverity::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ruff_output() {
        let json = r#"[
            {"code":"F401","message":"`os` imported but unused","location":{"row":1,"column":8},"filename":"x.py"},
            {"code":"E501","message":"Line too long (120 > 88)","location":{"row":4,"column":89}},
            {"code":null,"message":"SyntaxError: Expected ')'","location":{"row":2,"column":1}}
        ]"#;
        let warnings = parse_ruff_json(json).unwrap();
        assert_eq!(warnings.len(), 3);
        assert_eq!(warnings[0].rule_id, "F401");
        assert_eq!(warnings[0].severity, WarningSeverity::Error);
        assert_eq!(warnings[0].line, 1);
        assert_eq!(warnings[1].severity, WarningSeverity::Warning);
        assert_eq!(warnings[1].column, 89);
        assert_eq!(warnings[2].rule_id, "syntax-error");
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(parse_ruff_json("[]").unwrap().is_empty());
        assert!(parse_ruff_json("not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_tool_yields_sentinel() {
        let analyzer = RuffAnalyzer::new(&LinterConfig {
            command: "definitely-not-ruff".to_string(),
            ..LinterConfig::default()
        });
        let warnings = analyzer.collect("x = 1\n").await;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].is_tool_error());
        assert_eq!(warnings[0].severity, WarningSeverity::Info);
        assert!(warnings[0].message.contains("definitely-not-ruff unavailable"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_spawn_error() {
        let analyzer = RuffAnalyzer::new(&LinterConfig {
            command: "definitely-not-ruff".to_string(),
            ..LinterConfig::default()
        });
        let err = analyzer.run("x = 1\n").await.unwrap_err();
        assert!(matches!(err, LintError::Spawn { .. }));
    }

    #[test]
    fn test_decode_error_converts() {
        fn decode(stdout: &str) -> LintResult<Vec<StaticWarning>> {
            Ok(parse_ruff_json(stdout)?)
        }
        let err = decode("{not json").unwrap_err();
        assert!(matches!(err, LintError::Decode(_)));
        assert!(err.to_string().starts_with("unreadable linter output"));
    }
}
