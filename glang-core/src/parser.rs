//! Parser façade: tokenize, build, optionally validate.

use crate::ast::{Node, TreeBuilder, DEFAULT_MAX_DEPTH};
use crate::error::Diagnostic;
use crate::registry::ExtensionRegistry;
use crate::token::tokenize;
use crate::validator::{Validator, EMPTY_INPUT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parser options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Validate the tree against the primitive table.
    pub validate: bool,
    /// Report unbalanced tags as errors instead of repairing them.
    pub strict: bool,
    /// Nested elements allowed before the parse fails. At least 1; smaller
    /// values are treated as 1.
    pub max_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            validate: true,
            strict: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Outcome of a parse. `tree` is `None` whenever `errors` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseResult {
    pub tree: Option<Node>,
    pub errors: Vec<Diagnostic>,
}

impl ParseResult {
    fn ok(tree: Node) -> Self {
        Self {
            tree: Some(tree),
            errors: Vec::new(),
        }
    }

    fn failed(errors: Vec<Diagnostic>) -> Self {
        Self { tree: None, errors }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && self.tree.is_some()
    }

    pub fn into_result(self) -> Result<Node, Vec<Diagnostic>> {
        match self.tree {
            Some(tree) if self.errors.is_empty() => Ok(tree),
            _ => Err(self.errors),
        }
    }
}

/// Parses G-Lang documents.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    options: ParserOptions,
    validator: Validator,
}

impl Parser {
    /// Creates a parser with a private registry holding only built-ins.
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            validator: Validator::new(),
        }
    }

    /// Creates a parser that validates against a shared registry.
    pub fn with_registry(options: ParserOptions, registry: Arc<ExtensionRegistry>) -> Self {
        Self {
            options,
            validator: Validator::with_registry(registry),
        }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Parses a document. Never panics on malformed input; every failure is
    /// returned as a diagnostic.
    pub fn parse(&self, input: &str) -> ParseResult {
        if input.is_empty() {
            return ParseResult::failed(vec![Diagnostic::new(EMPTY_INPUT)]);
        }

        let tokens = tokenize(input);
        let output = match TreeBuilder::new()
            .with_max_depth(self.options.max_depth)
            .build(&tokens)
        {
            Ok(output) => output,
            Err(e) => {
                return ParseResult::failed(vec![Diagnostic::at_position(
                    e.to_string(),
                    e.position(),
                )])
            }
        };

        if self.options.strict && !output.issues.is_empty() {
            return ParseResult::failed(
                output.issues.iter().map(|issue| issue.to_diagnostic()).collect(),
            );
        }

        if self.options.validate {
            let result = self.validator.validate(&output.root);
            if !result.valid {
                return ParseResult::failed(result.errors);
            }
        }

        ParseResult::ok(output.root)
    }

    /// Async wrapper over [`Parser::parse`] with identical semantics.
    pub async fn parse_async(&self, input: &str) -> ParseResult {
        self.parse(input)
    }
}
