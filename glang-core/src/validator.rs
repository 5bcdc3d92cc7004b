//! Schema-driven validation of document trees.

use crate::ast::{Node, TreeBuilder, DOCUMENT};
use crate::error::Diagnostic;
use crate::primitive::{PrimitiveSchema, ValueType};
use crate::registry::ExtensionRegistry;
use crate::token::tokenize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Message reported for empty input.
pub const EMPTY_INPUT: &str = "Input must be a non-empty string";

/// Outcome of validating a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<Diagnostic>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<Diagnostic>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validates trees against the primitive table of an [`ExtensionRegistry`].
#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<ExtensionRegistry>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// Creates a validator over a private registry holding only built-ins.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ExtensionRegistry::new()))
    }

    pub fn with_registry(registry: Arc<ExtensionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// Adds or replaces the schema for `kind`. The latest registration wins.
    pub fn register_primitive(&self, kind: &str, schema: PrimitiveSchema) {
        self.registry.register_primitive(kind, schema);
    }

    /// Validates a tree. Every problem is collected; nothing short-circuits.
    pub fn validate(&self, root: &Node) -> ValidationResult {
        // One snapshot per run, so a concurrent registration cannot change
        // the rules halfway through a tree.
        let schemas = self.registry.get_all_primitives();
        let mut walk = Walk {
            schemas: &schemas,
            errors: Vec::new(),
        };

        if root.kind != DOCUMENT {
            walk.errors
                .push(Diagnostic::at_path("Root must be a document node", ""));
        }

        for (i, child) in root.children.iter().enumerate() {
            walk.node(child, &format!("children[{}]", i));
        }

        ValidationResult::from_errors(walk.errors)
    }

    /// Builds a tree from `input` without validation, then validates it.
    pub fn validate_str(&self, input: &str) -> ValidationResult {
        if input.is_empty() {
            return ValidationResult::from_errors(vec![Diagnostic::new(EMPTY_INPUT)]);
        }
        match TreeBuilder::new().build(&tokenize(input)) {
            Ok(output) => self.validate(&output.root),
            Err(e) => {
                ValidationResult::from_errors(vec![Diagnostic::at_position(
                    e.to_string(),
                    e.position(),
                )])
            }
        }
    }
}

struct Walk<'a> {
    schemas: &'a BTreeMap<String, Arc<PrimitiveSchema>>,
    errors: Vec<Diagnostic>,
}

impl Walk<'_> {
    fn node(&mut self, node: &Node, path: &str) {
        if node.is_text() {
            return;
        }

        let schemas = self.schemas;
        match schemas.get(&node.kind) {
            Some(schema) => self.attributes(node, schema, path),
            None if node.is_custom() => {}
            None => self.errors.push(Diagnostic::at_path(
                format!("Unknown primitive: {}", node.kind),
                path,
            )),
        }

        for (i, child) in node.children.iter().enumerate() {
            self.node(child, &format!("{}.{}[{}]", path, node.kind, i));
        }
    }

    fn attributes(&mut self, node: &Node, schema: &PrimitiveSchema, path: &str) {
        for (name, value) in &node.attributes {
            let attr_path = format!("{}.{}.@{}", path, node.kind, name);
            match schema.attribute_spec(name) {
                None => self.errors.push(Diagnostic::at_path(
                    format!("Unknown attribute: {}", name),
                    attr_path,
                )),
                Some(spec) if !spec.accepts(value) => {
                    let expected = match spec.value_type {
                        ValueType::Boolean => "boolean",
                        _ => "number",
                    };
                    self.errors.push(Diagnostic::at_path(
                        format!("Attribute {} must be {}", name, expected),
                        attr_path,
                    ));
                }
                Some(_) => {}
            }
        }

        for required in schema.required_attributes() {
            if !node.attributes.contains_key(required) {
                self.errors.push(Diagnostic::at_path(
                    format!("Required attribute missing: {}", required),
                    format!("{}.{}", path, node.kind),
                ));
            }
        }
    }
}
