//! Recovery and validation of judge responses.
//!
//! Models wrap their JSON in prose or code fences often enough that the
//! extractor tries three strategies in order: the whole text, the first
//! fenced block, then the first balanced `{...}` that parses. The validator
//! then distinguishes "no JSON", "JSON missing required keys" and "valid".

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::domain::{round_to, Dimension, RubricScores};

/// Value substituted for a score that is present but not numeric.
pub const MALFORMED_SCORE: f64 = 5.0;

/// Confidence assumed when a response omits it.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// A judge response that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedJudgment {
    pub scores: RubricScores,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub reasoning: String,
    pub confidence: f64,
    /// Only meta-judge responses carry this.
    pub disagreements: Vec<String>,
}

/// Result of validating one response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    NotJson,
    MissingKeys(Vec<String>),
    Valid(ParsedJudgment),
}

fn fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// Recover the first JSON object from free-form model output.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }
    if let Some(caps) = fence_re().and_then(|re| re.captures(trimmed)) {
        if let Some(body) = caps.get(1) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body.as_str()) {
                return Some(map);
            }
        }
    }
    first_balanced_object(trimmed)
}

/// Scan for `{`, track depth outside JSON strings, and try each closed span.
fn first_balanced_object(text: &str) -> Option<Map<String, Value>> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (i, &b) in bytes.iter().enumerate().skip(open) {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        if let Ok(Value::Object(map)) = serde_json::from_str(&text[open..=i]) {
                            return Some(map);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
        start = open + 1;
    }
    None
}

/// Coerce a score value; numeric strings are accepted.
fn score_value(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => round_to(v.clamp(0.0, 10.0), 2),
        _ => MALFORMED_SCORE,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Validate a recovered object against the judge response contract.
pub fn validate_judgment(obj: &Map<String, Value>) -> ParseOutcome {
    let Some(Value::Object(scores)) = obj.get("scores") else {
        return ParseOutcome::MissingKeys(vec!["scores".to_string()]);
    };
    let missing: Vec<String> = Dimension::ALL
        .iter()
        .filter(|d| !scores.contains_key(d.key()))
        .map(|d| format!("scores.{}", d.key()))
        .collect();
    if !missing.is_empty() {
        return ParseOutcome::MissingKeys(missing);
    }

    let rubric = RubricScores::from_fn(|d| scores.get(d.key()).map(score_value).unwrap_or(MALFORMED_SCORE));
    let confidence = match obj.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(DEFAULT_CONFIDENCE),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_CONFIDENCE),
        _ => DEFAULT_CONFIDENCE,
    };
    let confidence = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        DEFAULT_CONFIDENCE
    };
    let reasoning = match obj.get("reasoning") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    ParseOutcome::Valid(ParsedJudgment {
        scores: rubric,
        issues: string_list(obj.get("issues")),
        suggestions: string_list(obj.get("suggestions")),
        reasoning,
        confidence,
        disagreements: string_list(obj.get("disagreements")),
    })
}

/// Extract and validate in one step.
pub fn parse_judge_response(text: &str) -> ParseOutcome {
    match extract_json_object(text) {
        Some(obj) => validate_judgment(&obj),
        None => ParseOutcome::NotJson,
    }
}
