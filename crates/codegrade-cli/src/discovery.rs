//! Problem and submission discovery.
//!
//! Layout, one directory per problem:
//!
//! ```text
//! problems/<id>/description.md
//! problems/<id>/reference.py
//! problems/<id>/tests.py
//! problems/<id>/problem.toml        (optional)
//! problems/<id>/submissions/*.py
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use codegrade_core::domain::{DEFAULT_ENTRY_POINT, DEFAULT_EXPECTED_COMPLEXITY};
use codegrade_core::{ProblemSpec, Submission};
use serde::Deserialize;

/// A problem together with the submissions to grade against it.
#[derive(Debug, Clone)]
pub struct ProblemBundle {
    pub problem: ProblemSpec,
    pub submissions: Vec<Submission>,
}

#[derive(Debug, Default, Deserialize)]
struct ProblemManifest {
    entry_point: Option<String>,
    expected_complexity: Option<String>,
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))
}

/// Load one problem directory. Returns `None` if a required file is missing.
pub fn load_problem(dir: &Path) -> Result<Option<ProblemBundle>> {
    let Some(problem_id) = dir.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    let required = ["description.md", "reference.py", "tests.py"];
    if let Some(missing) = required.iter().find(|f| !dir.join(f).is_file()) {
        tracing::warn!(problem_id, missing = *missing, "skipping incomplete problem directory");
        return Ok(None);
    }

    let manifest_path = dir.join("problem.toml");
    let manifest: ProblemManifest = if manifest_path.is_file() {
        toml::from_str(&read(&manifest_path)?).with_context(|| format!("parse {:?}", manifest_path))?
    } else {
        ProblemManifest::default()
    };

    let problem = ProblemSpec::new(
        problem_id,
        read(&dir.join("description.md"))?,
        read(&dir.join("reference.py"))?,
        read(&dir.join("tests.py"))?,
    )
    .with_entry_point(manifest.entry_point.unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string()))
    .with_expected_complexity(
        manifest
            .expected_complexity
            .unwrap_or_else(|| DEFAULT_EXPECTED_COMPLEXITY.to_string()),
    );

    let mut submissions = Vec::new();
    let submissions_dir = dir.join("submissions");
    if submissions_dir.is_dir() {
        for entry in std::fs::read_dir(&submissions_dir).with_context(|| format!("list {:?}", submissions_dir))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("py") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            submissions.push(Submission::new(stem, read(&path)?));
        }
    }
    submissions.sort_by(|a, b| a.submission_id.cmp(&b.submission_id));

    Ok(Some(ProblemBundle {
        problem,
        submissions,
    }))
}

/// Load every problem under `root`, sorted by id; `only` restricts to one.
pub fn discover_problems(root: &Path, only: Option<&str>) -> Result<Vec<ProblemBundle>> {
    if !root.is_dir() {
        bail!("problems directory {:?} does not exist", root);
    }
    let mut dirs: Vec<_> = std::fs::read_dir(root)
        .with_context(|| format!("list {:?}", root))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .filter(|p| match only {
            Some(id) => p.file_name().and_then(|n| n.to_str()) == Some(id),
            None => true,
        })
        .collect();
    dirs.sort();

    let mut bundles = Vec::new();
    for dir in dirs {
        if let Some(bundle) = load_problem(&dir)? {
            bundles.push(bundle);
        }
    }
    if let Some(id) = only {
        if bundles.is_empty() {
            bail!("problem {id:?} not found under {:?}", root);
        }
    }
    Ok(bundles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_problem(root: &Path, id: &str, manifest: Option<&str>, submissions: &[&str]) {
        let dir = root.join(id);
        std::fs::create_dir_all(dir.join("submissions")).unwrap();
        std::fs::write(dir.join("description.md"), "Add two numbers.").unwrap();
        std::fs::write(dir.join("reference.py"), "def solution(a, b):\n    return a + b\n").unwrap();
        std::fs::write(dir.join("tests.py"), "class T(unittest.TestCase):\n    pass\n").unwrap();
        if let Some(m) = manifest {
            std::fs::write(dir.join("problem.toml"), m).unwrap();
        }
        for name in submissions {
            std::fs::write(dir.join("submissions").join(name), "x = 1\n").unwrap();
        }
    }

    #[test]
    fn test_discovers_sorted_problems_and_submissions() {
        let root = tempfile::tempdir().unwrap();
        write_problem(root.path(), "b_second", None, &["zed.py", "amy.py", "notes.txt"]);
        write_problem(root.path(), "a_first", Some("entry_point = \"add\"\nexpected_complexity = \"O(1)\"\n"), &[]);

        let bundles = discover_problems(root.path(), None).unwrap();
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].problem.problem_id, "a_first");
        assert_eq!(bundles[0].problem.entry_point, "add");
        assert_eq!(bundles[0].problem.expected_complexity, "O(1)");
        assert_eq!(bundles[1].problem.entry_point, "solution");
        assert_eq!(bundles[1].problem.expected_complexity, "O(n)");
        let ids: Vec<_> = bundles[1].submissions.iter().map(|s| s.submission_id.as_str()).collect();
        assert_eq!(ids, vec!["amy", "zed"]);
    }

    #[test]
    fn test_incomplete_problem_skipped() {
        let root = tempfile::tempdir().unwrap();
        write_problem(root.path(), "good", None, &["s.py"]);
        std::fs::create_dir_all(root.path().join("broken")).unwrap();
        let bundles = discover_problems(root.path(), None).unwrap();
        assert_eq!(bundles.len(), 1);
    }

    #[test]
    fn test_filter_by_id() {
        let root = tempfile::tempdir().unwrap();
        write_problem(root.path(), "one", None, &[]);
        write_problem(root.path(), "two", None, &[]);
        let bundles = discover_problems(root.path(), Some("two")).unwrap();
        assert_eq!(bundles.len(), 1);
        assert!(discover_problems(root.path(), Some("three")).is_err());
    }

    #[test]
    fn test_missing_root_is_error() {
        assert!(discover_problems(Path::new("/definitely/not/here"), None).is_err());
    }
}
