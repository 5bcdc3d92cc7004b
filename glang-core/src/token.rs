//! Tokenizer for G-Lang documents.
//!
//! Converts raw text into a flat token sequence. The scanner knows whether it
//! is inside a tag or in content, but it does not track nesting; that is the
//! AST builder's job.
//!
//! Recognized forms:
//!
//! - `<name` opens a tag, `</name` closes one
//! - `name="value"` inside a tag (double quotes only)
//! - `/>` and `>` end a tag
//! - `<!-- ... -->` comments are removed before scanning, wherever they
//!   sit; text on both sides joins up
//! - anything else is text, trimmed, and dropped when empty
//!
//! Scanning is best effort. Unrecognized spans inside a tag (unquoted or
//! single-quoted values, an unterminated value, stray characters) are skipped
//! without complaint.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lexical token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// `<name`
    TagOpen,
    /// `</name`
    TagClose,
    /// Attribute name inside a tag.
    AttrName,
    /// Attribute value, always directly after its name.
    AttrValue,
    /// `/>`
    SelfClose,
    /// `>`
    TagEnd,
    /// Trimmed run of content text.
    Text,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::TagOpen => "tag-open",
            TokenKind::TagClose => "tag-close",
            TokenKind::AttrName => "attribute-name",
            TokenKind::AttrValue => "attribute-value",
            TokenKind::SelfClose => "self-close",
            TokenKind::TagEnd => "tag-end",
            TokenKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    /// Byte offset in the original input.
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            position,
        }
    }
}

/// Tokenizes a document.
pub fn tokenize(input: &str) -> Vec<Token> {
    let source = Stripped::new(input);
    let mut tokens = Scanner::new(&source.text).run();
    for token in &mut tokens {
        token.position = source.original_offset(token.position);
    }
    tokens
}

const COMMENT_OPEN: &str = "<!--";
const COMMENT_CLOSE: &str = "-->";

/// Input with comments removed, plus the offsets needed to map positions in
/// the stripped text back to the input.
struct Stripped {
    text: String,
    /// `(stripped_start, original_start)` of each kept span, ascending.
    spans: Vec<(usize, usize)>,
}

impl Stripped {
    fn new(input: &str) -> Self {
        let mut text = String::with_capacity(input.len());
        let mut spans = Vec::new();
        let mut pos = 0;

        while pos < input.len() {
            let rest = &input[pos..];
            let kept = rest.find(COMMENT_OPEN).unwrap_or(rest.len());
            if kept > 0 {
                spans.push((text.len(), pos));
                text.push_str(&rest[..kept]);
            }
            pos += kept;
            if pos >= input.len() {
                break;
            }

            // An unterminated comment runs to the end of input.
            let body = pos + COMMENT_OPEN.len();
            pos = match input[body..].find(COMMENT_CLOSE) {
                Some(end) => body + end + COMMENT_CLOSE.len(),
                None => input.len(),
            };
        }

        Self { text, spans }
    }

    fn original_offset(&self, stripped: usize) -> usize {
        let i = self.spans.partition_point(|&(start, _)| start <= stripped);
        match i.checked_sub(1).and_then(|i| self.spans.get(i)) {
            Some(&(start, original)) => original + (stripped - start),
            None => stripped,
        }
    }
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    tokens: Vec<Token>,
    /// Pending text run: accumulated content and the offset it started at.
    text: String,
    text_start: Option<usize>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            tokens: Vec::new(),
            text: String::new(),
            text_start: None,
        }
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.input.len() {
            if self.at_tag_start() {
                self.flush_text();
                self.scan_tag();
            } else {
                self.push_text_char();
            }
        }
        self.flush_text();
        self.tokens
    }

    /// `<` followed by a tag name, or `</` followed by a tag name.
    fn at_tag_start(&self) -> bool {
        let rest = &self.input[self.pos..];
        let mut chars = rest.chars();
        if chars.next() != Some('<') {
            return false;
        }
        match chars.next() {
            Some('/') => chars.next().is_some_and(|c| c.is_ascii_alphabetic()),
            Some(c) => c.is_ascii_alphabetic(),
            None => false,
        }
    }

    fn push_text_char(&mut self) {
        if let Some(c) = self.peek_char() {
            if self.text_start.is_none() {
                self.text_start = Some(self.pos);
            }
            self.text.push(c);
            self.pos += c.len_utf8();
        }
    }

    fn flush_text(&mut self) {
        let Some(start) = self.text_start.take() else {
            return;
        };
        let raw = std::mem::take(&mut self.text);
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let leading = raw.len() - raw.trim_start().len();
            self.tokens
                .push(Token::new(TokenKind::Text, trimmed, start + leading));
        }
    }

    fn scan_tag(&mut self) {
        let start = self.pos;
        self.pos += 1; // '<'

        let kind = if self.peek_char() == Some('/') {
            self.pos += 1;
            TokenKind::TagClose
        } else {
            TokenKind::TagOpen
        };

        let name = self.scan_while(|c| c.is_ascii_alphanumeric() || c == '-');
        self.tokens.push(Token::new(kind, name, start));

        self.scan_tag_body();
    }

    /// Scans attributes up to and including the tag terminator.
    fn scan_tag_body(&mut self) {
        loop {
            self.skip_whitespace();

            let Some(c) = self.peek_char() else {
                return;
            };

            if self.peek_str("/>") {
                self.tokens
                    .push(Token::new(TokenKind::SelfClose, "/>", self.pos));
                self.pos += 2;
                return;
            }

            if c == '>' {
                self.tokens.push(Token::new(TokenKind::TagEnd, ">", self.pos));
                self.pos += 1;
                return;
            }

            // A new tag starting inside an unterminated tag ends it.
            if self.at_tag_start() {
                return;
            }

            if is_attr_name_start(c) {
                self.scan_attribute();
            } else {
                // Unrecognized character inside a tag.
                self.pos += c.len_utf8();
            }
        }
    }

    fn scan_attribute(&mut self) {
        let start = self.pos;
        let name = self.scan_while(is_attr_name_char);

        if !self.peek_str("=\"") {
            // Bare attribute or unquoted value.
            return;
        }

        let value_start = self.pos + 2;
        match self.input[value_start..].find('"') {
            Some(len) => {
                let value = &self.input[value_start..value_start + len];
                self.tokens.push(Token::new(TokenKind::AttrName, name, start));
                self.tokens
                    .push(Token::new(TokenKind::AttrValue, value, value_start));
                self.pos = value_start + len + 1;
            }
            None => {
                // Unterminated value: skip the opening quote and keep scanning.
                self.pos = value_start;
            }
        }
    }

    fn scan_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if pred(c) {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }
}

fn is_attr_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

fn is_attr_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_paired_tag() {
        let tokens = tokenize(r#"<tool name="search">Looking up</tool>"#);
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::TagOpen,
                TokenKind::AttrName,
                TokenKind::AttrValue,
                TokenKind::TagEnd,
                TokenKind::Text,
                TokenKind::TagClose,
                TokenKind::TagEnd,
            ]
        );
        assert_eq!(tokens[0].value, "tool");
        assert_eq!(tokens[1].value, "name");
        assert_eq!(tokens[2].value, "search");
        assert_eq!(tokens[4].value, "Looking up");
        assert_eq!(tokens[5].value, "tool");
    }

    #[test]
    fn test_self_closing_tag() {
        let tokens = tokenize(r#"<context type="file" id="a.rs"/>"#);
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::TagOpen,
                TokenKind::AttrName,
                TokenKind::AttrValue,
                TokenKind::AttrName,
                TokenKind::AttrValue,
                TokenKind::SelfClose,
            ]
        );
    }

    #[test]
    fn test_positions_refer_to_original_input() {
        let input = "  hello <stream>";
        let tokens = tokenize(input);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].position, 2);
        assert_eq!(tokens[1].kind, TokenKind::TagOpen);
        assert_eq!(tokens[1].position, 8);
        assert_eq!(&input[tokens[1].position..tokens[1].position + 7], "<stream");
    }

    #[test]
    fn test_comments_are_stripped() {
        let tokens = tokenize("a <!-- <tool name=\"x\"/> --> b");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].value, "a  b");
    }

    #[test]
    fn test_comment_inside_tag() {
        let tokens = tokenize(r#"<tool <!-- note --> name="x"/>"#);
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::TagOpen,
                TokenKind::AttrName,
                TokenKind::AttrValue,
                TokenKind::SelfClose,
            ]
        );
        assert_eq!(tokens[1].value, "name");
        assert_eq!(tokens[1].position, 20);
    }

    #[test]
    fn test_comment_splitting_tag_name() {
        let input = r#"<to<!-- x -->ol name="x"/>"#;
        let tokens = tokenize(input);
        assert_eq!(tokens[0].kind, TokenKind::TagOpen);
        assert_eq!(tokens[0].value, "tool");
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[2].value, "x");
        assert_eq!(&input[tokens[2].position..tokens[2].position + 1], "x");
    }

    #[test]
    fn test_positions_after_leading_comment() {
        let input = "<!-- c --> hi <stream>";
        let tokens = tokenize(input);
        assert_eq!(tokens[0].value, "hi");
        assert_eq!(tokens[0].position, 11);
        assert_eq!(tokens[1].position, 14);
        assert_eq!(&input[tokens[1].position..], "<stream>");
    }

    #[test]
    fn test_unterminated_comment_swallows_rest() {
        let tokens = tokenize("<stream>hi</stream><!-- <tool name=\"x\"/>");
        assert_eq!(tokens.len(), 5);
        assert!(tokens.iter().all(|t| t.value != "x"));
    }

    #[test]
    fn test_whitespace_only_text_dropped() {
        let tokens = tokenize("<message>\n   \n</message>");
        assert!(!kinds(&tokens).contains(&TokenKind::Text));
    }

    #[test]
    fn test_single_quoted_value_skipped() {
        let tokens = tokenize("<tool name='x' mode=\"manual\">");
        let names: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::AttrName)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(names, vec!["mode"]);
    }

    #[test]
    fn test_unterminated_value() {
        let tokens = tokenize("<tool name=\"x>");
        assert_eq!(tokens[0].kind, TokenKind::TagOpen);
        assert!(!kinds(&tokens).contains(&TokenKind::AttrValue));
    }

    #[test]
    fn test_less_than_in_text() {
        let tokens = tokenize("<think>a < b and 3<4</think>");
        assert_eq!(tokens[2].kind, TokenKind::Text);
        assert_eq!(tokens[2].value, "a < b and 3<4");
    }

    #[test]
    fn test_hyphenated_names() {
        let tokens = tokenize(r#"<my-widget data-id="7"/>"#);
        assert_eq!(tokens[0].value, "my-widget");
        assert_eq!(tokens[1].value, "data-id");
        assert_eq!(tokens[2].value, "7");
    }

    #[test]
    fn test_unicode_text() {
        let tokens = tokenize("<stream>héllo → wörld</stream>");
        assert_eq!(tokens[2].value, "héllo → wörld");
        assert_eq!(tokens[3].kind, TokenKind::TagClose);
    }

    #[test]
    fn test_empty_value() {
        let tokens = tokenize(r#"<tool name="">"#);
        assert_eq!(tokens[2].kind, TokenKind::AttrValue);
        assert_eq!(tokens[2].value, "");
    }
}
