//! Document tree types and the stack-based tree builder.

use crate::error::Diagnostic;
use crate::token::{Token, TokenKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Kind of the root node.
pub const DOCUMENT: &str = "document";

/// Kind of text leaf nodes.
pub const TEXT: &str = "text";

/// Default nesting limit for element trees.
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// A node in the document tree.
///
/// Trees are never mutated after a parse; parsing again yields a new tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// `"document"`, `"text"`, or an element kind such as `"tool"`.
    pub kind: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,

    /// Literal payload, only set on text nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Byte offset into the source document.
    pub position: usize,
}

impl Node {
    pub fn document() -> Self {
        Self::element(DOCUMENT, 0)
    }

    pub fn element(kind: impl Into<String>, position: usize) -> Self {
        Self {
            kind: kind.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            text: None,
            position,
        }
    }

    pub fn text(value: impl Into<String>, position: usize) -> Self {
        Self {
            kind: TEXT.to_string(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            text: Some(value.into()),
            position,
        }
    }

    pub fn is_document(&self) -> bool {
        self.kind == DOCUMENT
    }

    pub fn is_text(&self) -> bool {
        self.kind == TEXT
    }

    /// True for custom elements (kinds containing a hyphen).
    pub fn is_custom(&self) -> bool {
        self.kind.contains('-')
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Returns all descendants of the given kind, in document order.
    pub fn find_all<'a>(&'a self, kind: &str) -> Vec<&'a Node> {
        let mut found = Vec::new();
        for child in &self.children {
            child.collect_kind(kind, &mut found);
        }
        found
    }

    fn collect_kind<'a>(&'a self, kind: &str, found: &mut Vec<&'a Node>) {
        if self.kind == kind {
            found.push(self);
        }
        for child in &self.children {
            child.collect_kind(kind, found);
        }
    }

    /// Concatenates the text of all descendant text nodes, space separated.
    pub fn text_content(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts.join(" ")
    }

    fn collect_text<'a>(&'a self, parts: &mut Vec<&'a str>) {
        if let Some(text) = &self.text {
            parts.push(text);
        }
        for child in &self.children {
            child.collect_text(parts);
        }
    }
}

/// A nesting problem the builder absorbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureIssue {
    /// `</found>` closed the open element `<expected>`.
    MismatchedClose {
        expected: String,
        found: String,
        position: usize,
    },
    /// A closing tag with no open element.
    UnexpectedClose { found: String, position: usize },
    /// An element still open at end of input.
    Unclosed { kind: String, position: usize },
}

impl StructureIssue {
    pub fn position(&self) -> usize {
        match self {
            StructureIssue::MismatchedClose { position, .. }
            | StructureIssue::UnexpectedClose { position, .. }
            | StructureIssue::Unclosed { position, .. } => *position,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::at_position(self.to_string(), self.position())
    }
}

impl fmt::Display for StructureIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureIssue::MismatchedClose {
                expected, found, ..
            } => write!(f, "mismatched closing tag: expected </{}>, found </{}>", expected, found),
            StructureIssue::UnexpectedClose { found, .. } => {
                write!(f, "unexpected closing tag </{}>", found)
            }
            StructureIssue::Unclosed { kind, .. } => write!(f, "unclosed element <{}>", kind),
        }
    }
}

/// Fatal tree building failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("maximum nesting depth of {max} exceeded at <{kind}>")]
    DepthExceeded {
        kind: String,
        max: usize,
        position: usize,
    },
}

impl BuildError {
    pub fn position(&self) -> usize {
        match self {
            BuildError::DepthExceeded { position, .. } => *position,
        }
    }
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub root: Node,
    /// Nesting problems absorbed while building, in input order.
    pub issues: Vec<StructureIssue>,
}

/// Builds a tree from tokens with the default depth limit.
pub fn build(tokens: &[Token]) -> Result<Node, BuildError> {
    TreeBuilder::new().build(tokens).map(|output| output.root)
}

/// Stack-based tree builder.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    max_depth: usize,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Sets the number of nested elements allowed. Values below 1 are
    /// treated as 1.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Builds the tree.
    ///
    /// Closing tags pop the innermost open element whatever their name;
    /// mismatches and stray or missing closes are recorded in
    /// [`BuildOutput::issues`] rather than rejected.
    pub fn build(&self, tokens: &[Token]) -> Result<BuildOutput, BuildError> {
        let mut stack: Vec<Node> = vec![Node::document()];
        let mut issues = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            let token = &tokens[i];
            match token.kind {
                TokenKind::TagOpen => {
                    let depth = stack.len();
                    if depth > self.max_depth {
                        return Err(BuildError::DepthExceeded {
                            kind: token.value.clone(),
                            max: self.max_depth,
                            position: token.position,
                        });
                    }

                    let mut node = Node::element(token.value.clone(), token.position);

                    while tokens.get(i + 1).map(|t| t.kind) == Some(TokenKind::AttrName) {
                        let name = tokens[i + 1].value.clone();
                        let value = match tokens.get(i + 2) {
                            Some(t) if t.kind == TokenKind::AttrValue => {
                                i += 1;
                                t.value.clone()
                            }
                            _ => String::new(),
                        };
                        node.attributes.insert(name, value);
                        i += 1;
                    }

                    if tokens.get(i + 1).map(|t| t.kind) == Some(TokenKind::SelfClose) {
                        append(&mut stack, node);
                    } else {
                        stack.push(node);
                    }
                }
                TokenKind::TagClose => {
                    if stack.len() > 1 {
                        let node = stack.pop().unwrap_or_else(Node::document);
                        if node.kind != token.value {
                            issues.push(StructureIssue::MismatchedClose {
                                expected: node.kind.clone(),
                                found: token.value.clone(),
                                position: token.position,
                            });
                        }
                        append(&mut stack, node);
                    } else {
                        issues.push(StructureIssue::UnexpectedClose {
                            found: token.value.clone(),
                            position: token.position,
                        });
                    }
                }
                TokenKind::Text => {
                    append(&mut stack, Node::text(token.value.clone(), token.position));
                }
                TokenKind::AttrName
                | TokenKind::AttrValue
                | TokenKind::SelfClose
                | TokenKind::TagEnd => {}
            }
            i += 1;
        }

        // Attach whatever is still open to its parent.
        while stack.len() > 1 {
            if let Some(node) = stack.pop() {
                issues.push(StructureIssue::Unclosed {
                    kind: node.kind.clone(),
                    position: node.position,
                });
                append(&mut stack, node);
            }
        }

        for issue in &issues {
            tracing::debug!("absorbed structure issue: {}", issue);
        }

        let root = stack.pop().unwrap_or_else(Node::document);
        Ok(BuildOutput { root, issues })
    }
}

fn append(stack: &mut [Node], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    fn tree(input: &str) -> BuildOutput {
        TreeBuilder::new().build(&tokenize(input)).unwrap()
    }

    #[test]
    fn test_nested_elements() {
        let out = tree(r#"<message role="user"><stream>Hi</stream><tool name="x"/></message>"#);
        assert!(out.issues.is_empty());

        let root = &out.root;
        assert!(root.is_document());
        assert_eq!(root.children.len(), 1);

        let message = &root.children[0];
        assert_eq!(message.kind, "message");
        assert_eq!(message.attribute("role"), Some("user"));
        assert_eq!(message.children.len(), 2);
        assert_eq!(message.children[0].kind, "stream");
        assert_eq!(message.children[0].children[0].text.as_deref(), Some("Hi"));
        assert_eq!(message.children[1].kind, "tool");
        assert!(message.children[1].children.is_empty());
    }

    #[test]
    fn test_self_close_does_not_push() {
        let out = tree(r#"<context type="file" id="1"/>after"#);
        let root = &out.root;
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[1].text.as_deref(), Some("after"));
    }

    #[test]
    fn test_mismatched_close_pops_innermost() {
        let out = tree("<message><stream>text</message>tail");
        let root = &out.root;
        // </message> closed <stream>; "tail" lands inside <message>.
        assert_eq!(root.children.len(), 1);
        let message = &root.children[0];
        assert_eq!(message.children.len(), 2);
        assert!(message.children[1].is_text());
        assert_eq!(
            out.issues[0],
            StructureIssue::MismatchedClose {
                expected: "stream".to_string(),
                found: "message".to_string(),
                position: 21,
            }
        );
        assert!(matches!(out.issues[1], StructureIssue::Unclosed { ref kind, .. } if kind == "message"));
    }

    #[test]
    fn test_stray_close_absorbed() {
        let out = tree("</tool>hello");
        assert_eq!(out.root.children.len(), 1);
        assert!(matches!(out.issues[0], StructureIssue::UnexpectedClose { .. }));
    }

    #[test]
    fn test_unclosed_kept_in_tree() {
        let out = tree("<message><stream>partial");
        let message = &out.root.children[0];
        assert_eq!(message.kind, "message");
        assert_eq!(message.children[0].kind, "stream");
        assert_eq!(message.children[0].children[0].text.as_deref(), Some("partial"));
        assert_eq!(out.issues.len(), 2);
    }

    #[test]
    fn test_depth_limit() {
        let input = "<a>".repeat(5);
        let err = TreeBuilder::new()
            .with_max_depth(3)
            .build(&tokenize(&input))
            .unwrap_err();
        assert!(matches!(err, BuildError::DepthExceeded { max: 3, .. }));
        assert_eq!(err.position(), 9);

        assert!(TreeBuilder::new()
            .with_max_depth(5)
            .build(&tokenize(&input))
            .is_ok());
    }

    #[test]
    fn test_zero_depth_clamped() {
        let builder = TreeBuilder::new().with_max_depth(0);
        assert!(builder.build(&tokenize("<a>x</a>")).is_ok());
        assert!(builder.build(&tokenize("<a><b/></a>")).is_err());
    }

    #[test]
    fn test_duplicate_attribute_last_wins() {
        let out = tree(r#"<tool name="a" name="b"/>"#);
        assert_eq!(out.root.children[0].attribute("name"), Some("b"));
    }

    #[test]
    fn test_find_all_and_text_content() {
        let out = tree(
            r#"<message><tool name="a">one</tool><branch id="b"><tool name="c">two</tool></branch></message>"#,
        );
        let tools = out.root.find_all("tool");
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].attribute("name"), Some("a"));
        assert_eq!(tools[1].attribute("name"), Some("c"));
        assert_eq!(out.root.text_content(), "one two");
    }

    #[test]
    fn test_json_shape() {
        let out = tree(r#"<tool name="x">go</tool>"#);
        let json = serde_json::to_value(&out.root).unwrap();
        assert_eq!(json["kind"], "document");
        assert_eq!(json["children"][0]["attributes"]["name"], "x");
        assert_eq!(json["children"][0]["children"][0]["text"], "go");
        assert!(json["children"][0]["children"][0].get("attributes").is_none());
    }
}
