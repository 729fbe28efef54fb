//! Pre-flight safety scan of submitted source.
//!
//! This is a cooperative check, not a security boundary. It rejects the
//! obvious ways a submission might reach the filesystem, spawn processes or
//! evaluate code dynamically. The method-name heuristic matches regardless
//! of receiver type, so it both over- and under-blocks; a determined
//! adversary can get past it. Real isolation has to come from the host.

use crate::source_model::{CallTarget, SourceFacts};

/// Modules a submission may import.
pub const SAFE_IMPORTS: &[&str] = &[
    "math",
    "collections",
    "itertools",
    "functools",
    "heapq",
    "bisect",
    "string",
    "re",
    "typing",
    "dataclasses",
    "enum",
    "copy",
    "operator",
    "statistics",
];

/// Built-ins that evaluate code or touch the outside world.
pub const BLOCKED_BUILTINS: &[&str] = &[
    "exec",
    "eval",
    "compile",
    "__import__",
    "open",
    "input",
    "breakpoint",
    "exit",
    "quit",
];

/// Method names treated as process spawning whatever the receiver.
pub const BLOCKED_METHODS: &[&str] = &["system", "popen", "exec", "spawn"];

/// Return every violation found in `facts`, in source order per category.
///
/// An unparseable submission yields exactly one violation: the syntax error.
/// An empty list means the submission may be executed.
pub fn check_code_safety(facts: &SourceFacts) -> Vec<String> {
    if let Some(err) = &facts.syntax_error {
        return vec![err.clone()];
    }

    let mut violations = Vec::new();
    for import in &facts.imports {
        if SAFE_IMPORTS.contains(&import.top_level()) {
            continue;
        }
        if import.from_import {
            violations.push(format!("Blocked import from: {}", import.module));
        } else {
            violations.push(format!("Blocked import: {}", import.module));
        }
    }

    for call in &facts.calls {
        match &call.target {
            CallTarget::Name(name) if BLOCKED_BUILTINS.contains(&name.as_str()) => {
                violations.push(format!("Blocked builtin call: {name}"));
            }
            CallTarget::Method(name) if BLOCKED_METHODS.contains(&name.as_str()) => {
                violations.push(format!("Blocked method call: {name}"));
            }
            _ => {}
        }
    }

    violations
}
