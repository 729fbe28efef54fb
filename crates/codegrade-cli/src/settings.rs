//! Configuration file loading.

use std::path::Path;

use anyhow::{Context, Result};
use codegrade_core::EvaluatorConfig;

/// Load and validate a TOML configuration; defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<EvaluatorConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
            toml::from_str::<EvaluatorConfig>(&text).with_context(|| format!("parse config {:?}", path))?
        }
        None => EvaluatorConfig::default(),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_gives_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config, EvaluatorConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codegrade.toml");
        std::fs::write(
            &path,
            "[sandbox]\ntimeout_secs = 5.0\n\n[scoring]\njudge_weight = 0.25\n\n[batch]\nmax_concurrent = 8\n",
        )
        .unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.sandbox.timeout_secs, 5.0);
        assert_eq!(config.scoring.judge_weight, 0.25);
        assert_eq!(config.batch.max_concurrent, 8);
        assert_eq!(config.linter.command, "ruff");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[scoring]\njudge_weight = 1.5\n").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("judge_weight"));
    }
}
