//! Structural view of submitted source.
//!
//! The safety checker and rubric engine never touch a syntax tree directly.
//! They consume [`SourceFacts`], produced by a [`SourceAnalyzer`]. The shipped
//! analyzer parses Python with tree-sitter; another front end can be plugged
//! in without touching the scoring code.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser};

use crate::domain::{GraderError, GraderResult};

/// An `import` or `from ... import` statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFact {
    /// Dotted module path as written, without leading relative dots.
    pub module: String,
    /// True for `from X import y`.
    pub from_import: bool,
    pub line: usize,
}

impl ImportFact {
    /// First component of the dotted path.
    pub fn top_level(&self) -> &str {
        self.module.split('.').next().unwrap_or_default()
    }
}

/// What a call expression invokes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum CallTarget {
    /// `name(...)`
    Name(String),
    /// `receiver.name(...)`, receiver unknown.
    Method(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFact {
    pub target: CallTarget,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFact {
    pub name: String,
    pub line: usize,
}

/// Everything the scoring heuristics need to know about a source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFacts {
    /// Set when the source failed to parse; all other fields are then empty.
    pub syntax_error: Option<String>,
    pub imports: Vec<ImportFact>,
    pub calls: Vec<CallFact>,
    pub functions: Vec<FunctionFact>,
    /// Deepest nesting of `for`/`while` statements.
    pub max_loop_depth: usize,
    /// Functions that call themselves from their own body.
    pub recursive_functions: BTreeSet<String>,
    /// Every variable reference, one entry per occurrence.
    pub identifiers: Vec<String>,
}

impl SourceFacts {
    pub fn is_parseable(&self) -> bool {
        self.syntax_error.is_none()
    }

    pub fn has_recursion(&self) -> bool {
        !self.recursive_functions.is_empty()
    }

    fn unparseable(message: String) -> Self {
        Self {
            syntax_error: Some(message),
            ..Self::default()
        }
    }
}

/// Front end that turns source text into [`SourceFacts`].
pub trait SourceAnalyzer: Send + Sync {
    fn analyze(&self, source: &str) -> SourceFacts;
}

/// Tree-sitter backed analyzer for Python source.
#[derive(Debug, Clone)]
pub struct PythonSourceAnalyzer {
    language: tree_sitter::Language,
}

impl PythonSourceAnalyzer {
    /// Load the grammar; fails only if the grammar and runtime ABI mismatch.
    pub fn new() -> GraderResult<Self> {
        let language = tree_sitter_python::language();
        Parser::new()
            .set_language(language)
            .map_err(|e| GraderError::Parser(e.to_string()))?;
        Ok(Self { language })
    }
}

impl SourceAnalyzer for PythonSourceAnalyzer {
    fn analyze(&self, source: &str) -> SourceFacts {
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(self.language) {
            return SourceFacts::unparseable(format!("SyntaxError: parser unavailable: {e}"));
        }
        let Some(tree) = parser.parse(source, None) else {
            return SourceFacts::unparseable("SyntaxError: parse aborted".to_string());
        };
        let root = tree.root_node();
        if root.has_error() {
            return SourceFacts::unparseable(describe_syntax_error(root));
        }

        let mut walker = FactWalker {
            src: source.as_bytes(),
            facts: SourceFacts::default(),
            function_stack: Vec::new(),
        };
        walker.visit(root, None, 0);
        walker.facts
    }
}

/// Locate the first ERROR or MISSING node and describe it.
fn describe_syntax_error(root: Node<'_>) -> String {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            let what = if node.is_missing() {
                format!("missing '{}'", node.kind())
            } else {
                "invalid syntax".to_string()
            };
            return format!(
                "SyntaxError: {what} (line {}, column {})",
                pos.row + 1,
                pos.column + 1
            );
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    "SyntaxError: invalid syntax".to_string()
}

struct FactWalker<'a> {
    src: &'a [u8],
    facts: SourceFacts,
    /// Names of the enclosing function definitions, innermost last.
    function_stack: Vec<String>,
}

impl<'a> FactWalker<'a> {
    fn text(&self, node: Node<'_>) -> String {
        node.utf8_text(self.src).unwrap_or_default().to_string()
    }

    fn visit(&mut self, node: Node<'_>, field: Option<&str>, loop_depth: usize) {
        let line = node.start_position().row + 1;
        let mut child_depth = loop_depth;
        let mut entered_function = false;

        match node.kind() {
            "import_statement" => self.record_plain_import(node, line),
            "import_from_statement" => {
                if let Some(module) = node.child_by_field_name("module_name") {
                    let name = self.text(module);
                    let name = name.trim_start_matches('.');
                    if !name.is_empty() {
                        self.facts.imports.push(ImportFact {
                            module: name.to_string(),
                            from_import: true,
                            line,
                        });
                    }
                }
            }
            "future_import_statement" => self.facts.imports.push(ImportFact {
                module: "__future__".to_string(),
                from_import: true,
                line,
            }),
            "call" => self.record_call(node, line),
            "exec_statement" => self.facts.calls.push(CallFact {
                target: CallTarget::Name("exec".to_string()),
                line,
            }),
            "function_definition" => {
                if let Some(name) = node.child_by_field_name("name") {
                    let name = self.text(name);
                    self.facts.functions.push(FunctionFact {
                        name: name.clone(),
                        line,
                    });
                    self.function_stack.push(name);
                    entered_function = true;
                }
            }
            "for_statement" | "while_statement" => {
                child_depth = loop_depth + 1;
                self.facts.max_loop_depth = self.facts.max_loop_depth.max(child_depth);
            }
            "identifier" => {
                if self.is_name_reference(node, field) {
                    let name = self.text(node);
                    self.facts.identifiers.push(name);
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                let child_field = cursor.field_name();
                self.visit(child, child_field, child_depth);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }

        if entered_function {
            self.function_stack.pop();
        }
    }

    fn record_plain_import(&mut self, node: Node<'_>, line: usize) {
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            let module = match child.kind() {
                "aliased_import" => child
                    .child_by_field_name("name")
                    .map(|n| self.text(n))
                    .unwrap_or_default(),
                _ => self.text(child),
            };
            if !module.is_empty() {
                self.facts.imports.push(ImportFact {
                    module,
                    from_import: false,
                    line,
                });
            }
        }
    }

    fn record_call(&mut self, node: Node<'_>, line: usize) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let target = match function.kind() {
            "identifier" => CallTarget::Name(self.text(function)),
            "attribute" => match function.child_by_field_name("attribute") {
                Some(attr) => CallTarget::Method(self.text(attr)),
                None => return,
            },
            _ => return,
        };
        if let CallTarget::Name(name) = &target {
            if self.function_stack.last() == Some(name) {
                self.facts.recursive_functions.insert(name.clone());
            }
        }
        self.facts.calls.push(CallFact { target, line });
    }

    /// True when an identifier is a variable reference rather than a
    /// definition name, attribute, parameter, keyword or import path.
    fn is_name_reference(&self, node: Node<'_>, field: Option<&str>) -> bool {
        let Some(parent) = node.parent() else {
            return true;
        };
        match parent.kind() {
            "function_definition" | "class_definition" => field != Some("name"),
            "attribute" => field != Some("attribute"),
            "keyword_argument" => field != Some("name"),
            "default_parameter" | "typed_default_parameter" => field != Some("name"),
            "parameters" | "lambda_parameters" | "typed_parameter" => false,
            "list_splat_pattern" | "dictionary_splat_pattern" => !matches!(
                parent.parent().map(|g| g.kind()),
                Some("parameters" | "lambda_parameters" | "typed_parameter")
            ),
            "dotted_name" | "aliased_import" | "global_statement" | "nonlocal_statement" => false,
            _ => true,
        }
    }
}
