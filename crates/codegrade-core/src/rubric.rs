//! Deterministic rubric engine.
//!
//! A pure function of source text, its [`SourceFacts`], the test outcome,
//! the static warnings and the expected complexity label. Every value is
//! rounded to two decimals. Unparseable source never errors; each structural
//! heuristic falls back to a fixed penalty instead.

use crate::domain::{real_warning_count, round_to, RubricScores, StaticWarning, TestSuiteResult};
use crate::source_model::SourceFacts;

/// Single-character names that are conventional and not penalized.
pub const ACCEPTED_SHORT_NAMES: &[&str] = &[
    "i", "j", "k", "n", "x", "y", "v", "e", "f", "s", "t", "q", "_",
];

/// Source substrings taken as evidence of memoization.
pub const MEMO_MARKERS: &[&str] = &["memo", "cache", "lru_cache", "@cache"];

const LONG_LINE_CHARS: usize = 100;

/// Optimal complexity class a problem expects, as far as scoring cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityClass {
    /// Linear or better, including `O(n log n)` and graph-linear `O(V+E)`.
    Linear,
    Quadratic,
    /// Anything else; loop nesting is not penalized.
    Other,
}

impl ComplexityClass {
    pub fn from_label(label: &str) -> Self {
        let norm: String = label
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '*')
            .flat_map(char::to_lowercase)
            .collect();
        const LINEAR: &[&str] = &[
            "o(1)", "o(logn)", "o(n)", "o(nlogn)", "o(v+e)", "o(e+v)", "o(n+m)", "o(m+n)",
        ];
        const QUADRATIC: &[&str] = &["o(n^2)", "o(n2)", "o(n²)", "o(nm)", "o(n·m)"];
        if QUADRATIC.iter().any(|q| norm.contains(q)) {
            ComplexityClass::Quadratic
        } else if LINEAR.iter().any(|l| norm.contains(l)) {
            ComplexityClass::Linear
        } else {
            ComplexityClass::Other
        }
    }
}

/// Everything the engine reads.
#[derive(Debug, Clone, Copy)]
pub struct RubricInputs<'a> {
    pub source: &'a str,
    pub facts: &'a SourceFacts,
    pub suite: &'a TestSuiteResult,
    pub warnings: &'a [StaticWarning],
    pub expected_complexity: &'a str,
}

/// Compute all five deterministic scores.
pub fn score(inputs: &RubricInputs<'_>) -> RubricScores {
    RubricScores {
        correctness: correctness(inputs.suite),
        edge_cases: edge_cases(inputs.suite),
        complexity: complexity(inputs.source, inputs.facts, inputs.expected_complexity),
        style: style(inputs.source, inputs.facts, inputs.warnings),
        clarity: clarity(inputs.source, inputs.facts),
    }
}

/// Test pass rate on a 0 to 10 scale.
pub fn correctness(suite: &TestSuiteResult) -> f64 {
    round_to(suite.pass_rate * 10.0, 2)
}

/// Piecewise curve over the pass rate that rewards a full pass most.
///
/// Zero when no test ran.
pub fn edge_cases(suite: &TestSuiteResult) -> f64 {
    if suite.total == 0 {
        return 0.0;
    }
    let pr = suite.pass_rate;
    let raw = if pr >= 1.0 {
        10.0
    } else if pr >= 0.8 {
        7.0 + (pr - 0.8) * 15.0
    } else if pr >= 0.5 {
        4.0 + (pr - 0.5) * 10.0
    } else {
        pr * 8.0
    };
    round_to(raw, 2)
}

/// Loop nesting measured against the problem's expected complexity.
///
/// Unparseable source gets a flat 3.0.
pub fn complexity(source: &str, facts: &SourceFacts, expected: &str) -> f64 {
    if !facts.is_parseable() {
        return 3.0;
    }
    let class = ComplexityClass::from_label(expected);
    let depth = facts.max_loop_depth;
    let mut score: f64 = match class {
        ComplexityClass::Linear => match depth {
            0 => 10.0,
            1 => 9.0,
            2 => 5.0,
            _ => 2.0,
        },
        ComplexityClass::Quadratic => match depth {
            0 | 1 => 10.0,
            2 => 8.0,
            _ => 4.0,
        },
        ComplexityClass::Other => 10.0,
    };
    let memoized = MEMO_MARKERS.iter().any(|m| source.contains(m));
    if class == ComplexityClass::Linear && facts.has_recursion() && !memoized {
        score = score.min(6.0);
    }
    round_to(score, 2)
}

/// Base style score from warnings per line.
pub fn warning_density_score(warning_count: usize, code_lines: usize) -> f64 {
    if code_lines == 0 {
        return 5.0;
    }
    let density = warning_count as f64 / code_lines as f64;
    if density == 0.0 {
        10.0
    } else if density < 0.05 {
        9.0
    } else if density < 0.1 {
        8.0
    } else if density < 0.2 {
        6.0
    } else if density < 0.3 {
        4.0
    } else if density < 0.5 {
        2.0
    } else {
        1.0
    }
}

fn code_lines(source: &str) -> Vec<&str> {
    source.trim().split('\n').collect()
}

/// Lint density minus deductions for short names and long lines.
pub fn style(source: &str, facts: &SourceFacts, warnings: &[StaticWarning]) -> f64 {
    let lines = code_lines(source);
    let base = warning_density_score(real_warning_count(warnings), lines.len());

    let mut deductions = 0.0;
    if facts.is_parseable() {
        let short = facts
            .identifiers
            .iter()
            .filter(|name| name.chars().count() == 1 && !ACCEPTED_SHORT_NAMES.contains(&name.as_str()))
            .count();
        deductions += 0.3 * short as f64;
    } else {
        deductions += 2.0;
    }

    let long_lines = lines
        .iter()
        .filter(|l| l.chars().count() > LONG_LINE_CHARS)
        .count();
    if long_lines > 0 {
        deductions += (long_lines as f64 * 0.3).min(2.0);
    }

    round_to((base - deductions).clamp(0.0, 10.0), 2)
}

/// Size and naming heuristics starting from 8.0.
pub fn clarity(source: &str, facts: &SourceFacts) -> f64 {
    let lines = code_lines(source);
    let mut score: f64 = 8.0;

    if lines.len() > 50 {
        score -= 2.0;
    } else if lines.len() > 30 {
        score -= 1.0;
    }

    if facts.is_parseable() {
        let total = facts.functions.len();
        let short = facts
            .functions
            .iter()
            .filter(|f| f.name.chars().count() <= 2)
            .count();
        if total > 0 && short * 2 > total {
            score -= 2.0;
        }
    } else {
        score -= 3.0;
    }

    if source.contains("\"\"\"") || source.contains("'''") {
        score += 1.0;
    }
    let comment_lines = lines
        .iter()
        .filter(|l| l.trim_start().starts_with('#'))
        .count();
    if comment_lines > 0 && lines.len() > 10 {
        score += 0.5;
    }

    round_to(score.clamp(0.0, 10.0), 2)
}
