//! codegrade - evidence-grounded grading of code submissions.
//!
//! ## Commands
//!
//! - `evaluate`: grade every submission and write `results.json` + `summary.md`
//! - `consistency`: grade each submission twice and compare the runs
//! - `accuracy`: grade, then compare against hand-assigned gold scores

mod discovery;
mod settings;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use codegrade_core::calibration::CONSISTENCY_TOLERANCE;
use codegrade_core::{
    check_consistency, grader_accuracy, render_markdown_summary, write_results_json,
    EvaluationResult, Evaluator, EvaluatorConfig, GoldScore, ProblemSpec, Submission, METRICS,
};

use discovery::{discover_problems, ProblemBundle};

#[derive(Parser)]
#[command(name = "codegrade")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Grade code submissions from execution evidence and judge consensus", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "CODEGRADE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade submissions and write a report
    Evaluate {
        /// Root of the problems tree
        #[arg(long, default_value = "problems")]
        problems: PathBuf,

        /// Grade only this problem
        #[arg(long)]
        problem: Option<String>,

        /// Grade only this submission (file stem) of `--problem`
        #[arg(long, requires = "problem")]
        submission: Option<String>,

        /// Output directory for results.json and summary.md
        #[arg(long, default_value = "results")]
        out: PathBuf,

        /// Skip external judges and report deterministic scores
        #[arg(long)]
        no_judges: bool,
    },

    /// Grade each submission twice and check the runs agree
    Consistency {
        #[arg(long, default_value = "problems")]
        problems: PathBuf,

        #[arg(long)]
        problem: Option<String>,

        #[arg(long, requires = "problem")]
        submission: Option<String>,

        /// Per-dimension tolerance between runs
        #[arg(long, default_value_t = CONSISTENCY_TOLERANCE)]
        tolerance: f64,
    },

    /// Compare grades against gold scores
    Accuracy {
        #[arg(long, default_value = "problems")]
        problems: PathBuf,

        /// JSON array of gold scores
        #[arg(long)]
        gold: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    codegrade_core::init_tracing(cli.json, level);

    let config = settings::load_config(cli.config.as_deref())?;

    let outcome = match cli.command {
        Commands::Evaluate {
            problems,
            problem,
            submission,
            out,
            no_judges,
        } => {
            let filter = Filter::new(problem.as_deref(), submission.as_deref());
            cmd_evaluate(config, &problems, filter, &out, no_judges).await
        }
        Commands::Consistency {
            problems,
            problem,
            submission,
            tolerance,
        } => {
            let filter = Filter::new(problem.as_deref(), submission.as_deref());
            cmd_consistency(config, &problems, filter, tolerance).await
        }
        Commands::Accuracy { problems, gold } => cmd_accuracy(config, &problems, &gold).await,
    };

    METRICS.flush();
    outcome
}

/// Which problems and submissions a command grades.
#[derive(Debug, Clone, Copy, Default)]
struct Filter<'a> {
    problem: Option<&'a str>,
    submission: Option<&'a str>,
}

impl<'a> Filter<'a> {
    fn new(problem: Option<&'a str>, submission: Option<&'a str>) -> Self {
        Self {
            problem,
            submission,
        }
    }

    fn load(&self, root: &Path) -> Result<Vec<ProblemBundle>> {
        let mut bundles = discover_problems(root, self.problem)?;
        if let Some(id) = self.submission {
            select_submission(&mut bundles, id)?;
        }
        Ok(bundles)
    }
}

/// Keep only submission `id`; fails when no bundle has it.
fn select_submission(bundles: &mut [ProblemBundle], id: &str) -> Result<()> {
    for bundle in bundles.iter_mut() {
        bundle.submissions.retain(|s| s.submission_id == id);
    }
    if bundles.iter().all(|b| b.submissions.is_empty()) {
        let problems: Vec<&str> = bundles.iter().map(|b| b.problem.problem_id.as_str()).collect();
        bail!("submission {id:?} not found for {}", problems.join(", "));
    }
    Ok(())
}

fn jobs(bundles: &[ProblemBundle]) -> Vec<(Arc<ProblemSpec>, Submission)> {
    bundles
        .iter()
        .flat_map(|b| {
            let problem = Arc::new(b.problem.clone());
            b.submissions
                .iter()
                .map(move |s| (Arc::clone(&problem), s.clone()))
        })
        .collect()
}

async fn grade(evaluator: &Arc<Evaluator>, bundles: &[ProblemBundle]) -> Vec<EvaluationResult> {
    let jobs = jobs(bundles);
    info!(submissions = jobs.len(), problems = bundles.len(), "grading");
    evaluator.evaluate_batch(jobs).await
}

fn build_evaluator(mut config: EvaluatorConfig, no_judges: bool) -> Result<Arc<Evaluator>> {
    if no_judges {
        config.judges.enabled = false;
    }
    let evaluator = Evaluator::from_config(config).context("build evaluator")?;
    Ok(Arc::new(evaluator))
}

async fn cmd_evaluate(
    config: EvaluatorConfig,
    problems: &Path,
    filter: Filter<'_>,
    out: &Path,
    no_judges: bool,
) -> Result<()> {
    let bundles = filter.load(problems)?;
    let evaluator = build_evaluator(config, no_judges)?;
    let results = grade(&evaluator, &bundles).await;

    std::fs::create_dir_all(out).with_context(|| format!("create {:?}", out))?;
    write_results_json(&out.join("results.json"), &results)?;
    let summary = render_markdown_summary(&results, &[], &[]);
    std::fs::write(out.join("summary.md"), &summary)
        .with_context(|| format!("write {:?}", out.join("summary.md")))?;

    println!("{summary}");
    println!("Results written to {}", out.display());
    Ok(())
}

async fn cmd_consistency(
    config: EvaluatorConfig,
    problems: &Path,
    filter: Filter<'_>,
    tolerance: f64,
) -> Result<()> {
    let bundles = filter.load(problems)?;
    let evaluator = build_evaluator(config, false)?;
    let first = grade(&evaluator, &bundles).await;
    let second = grade(&evaluator, &bundles).await;

    let mut by_id: HashMap<(String, String), EvaluationResult> = second
        .into_iter()
        .map(|r| ((r.problem_id.clone(), r.submission_id.clone()), r))
        .collect();
    let reports: Vec<_> = first
        .iter()
        .filter_map(|a| {
            by_id
                .remove(&(a.problem_id.clone(), a.submission_id.clone()))
                .map(|b| check_consistency(a, &b, tolerance))
        })
        .collect();

    let consistent = reports.iter().filter(|r| r.consistent).count();
    println!("{}", render_markdown_summary(&first, &[], &reports));
    println!("Consistency: {consistent}/{} submissions consistent", reports.len());
    Ok(())
}

async fn cmd_accuracy(config: EvaluatorConfig, problems: &Path, gold_path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(gold_path).with_context(|| format!("read {:?}", gold_path))?;
    let gold: Vec<GoldScore> =
        serde_json::from_str(&text).with_context(|| format!("parse {:?}", gold_path))?;

    let bundles = discover_problems(problems, None)?;
    let evaluator = build_evaluator(config, false)?;
    let results = grade(&evaluator, &bundles).await;
    let metrics = grader_accuracy(&results, &gold);
    if metrics.is_empty() {
        println!("No evaluated submission matched a gold score.");
        return Ok(());
    }
    println!("{}", render_markdown_summary(&results, &metrics, &[]));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_evaluate_flags() {
        let cli = Cli::try_parse_from([
            "codegrade", "--json", "evaluate", "--problems", "p", "--problem", "two_sum", "--no-judges",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Evaluate {
                problems,
                problem,
                submission,
                out,
                no_judges,
            } => {
                assert!(submission.is_none());
                assert_eq!(problems, PathBuf::from("p"));
                assert_eq!(problem.as_deref(), Some("two_sum"));
                assert_eq!(out, PathBuf::from("results"));
                assert!(no_judges);
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_submission_filter_requires_problem() {
        assert!(Cli::try_parse_from(["codegrade", "evaluate", "--submission", "s1"]).is_err());
        let cli = Cli::try_parse_from([
            "codegrade", "consistency", "--problem", "two_sum", "--submission", "s1",
        ])
        .unwrap();
        match cli.command {
            Commands::Consistency {
                problem, submission, ..
            } => {
                assert_eq!(problem.as_deref(), Some("two_sum"));
                assert_eq!(submission.as_deref(), Some("s1"));
            }
            _ => panic!("expected consistency"),
        }
    }

    #[test]
    fn test_select_submission_keeps_only_match() {
        let mut bundles = vec![ProblemBundle {
            problem: ProblemSpec::new("p", "", "", ""),
            submissions: vec![Submission::new("s1", ""), Submission::new("s2", "")],
        }];
        select_submission(&mut bundles, "s2").unwrap();
        assert_eq!(bundles[0].submissions.len(), 1);
        assert_eq!(bundles[0].submissions[0].submission_id, "s2");

        let err = select_submission(&mut bundles, "nope").unwrap_err();
        assert!(err.to_string().contains("\"nope\" not found for p"));
    }

    #[test]
    fn test_accuracy_requires_gold() {
        assert!(Cli::try_parse_from(["codegrade", "accuracy"]).is_err());
    }

    #[test]
    fn test_jobs_flatten_in_order() {
        let bundle = |id: &str, subs: &[&str]| ProblemBundle {
            problem: ProblemSpec::new(id, "", "", ""),
            submissions: subs.iter().map(|s| Submission::new(*s, "")).collect(),
        };
        let bundles = vec![bundle("a", &["s1", "s2"]), bundle("b", &["s3"])];
        let flat: Vec<_> = jobs(&bundles)
            .into_iter()
            .map(|(p, s)| format!("{}/{}", p.problem_id, s.submission_id))
            .collect();
        assert_eq!(flat, vec!["a/s1", "a/s2", "b/s3"]);
    }

    #[tokio::test]
    async fn test_evaluate_without_judges_writes_reports() {
        let root = tempfile::tempdir().unwrap();
        let problem_dir = root.path().join("problems").join("add");
        std::fs::create_dir_all(problem_dir.join("submissions")).unwrap();
        std::fs::write(problem_dir.join("description.md"), "Add.").unwrap();
        std::fs::write(problem_dir.join("reference.py"), "def solution(a, b):\n    return a + b\n").unwrap();
        std::fs::write(problem_dir.join("tests.py"), "").unwrap();
        std::fs::write(
            problem_dir.join("submissions").join("bad.py"),
            "import subprocess\n",
        )
        .unwrap();
        let out = root.path().join("out");

        let mut config = EvaluatorConfig::default();
        config.linter.command = "definitely-not-a-linter".into();
        cmd_evaluate(config, &root.path().join("problems"), Filter::default(), &out, true)
            .await
            .unwrap();

        let results = codegrade_core::read_results_json(&out.join("results.json")).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].execution.sandbox_violation);
        assert_eq!(results[0].fallback_reason.as_deref(), Some("judges disabled"));
        let summary = std::fs::read_to_string(out.join("summary.md")).unwrap();
        assert!(summary.contains("| add | bad |"));
    }
}
