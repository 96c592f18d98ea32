//! Error-tolerant JSON parser producing an arena AST.
//!
//! The parser never fails. Syntax problems are recorded on the document and
//! parsing resynchronises at the next separator. Shorthand that JavaScript
//! object literals allow has dedicated recovery:
//!
//! - an unquoted or single-quoted key becomes a key node plus an
//!   [`ErrorCode::Undefined`] error;
//! - an unrecognised value token leaves the property without a value and
//!   reports [`ErrorCode::CommaOrCloseBraceExpected`].

use std::collections::HashSet;

use super::ast::{AstNode, ErrorCode, JsonDocument, NodeId, NodeKind, SyntaxError};
use super::scanner::{ScanError, Scanner, SyntaxKind};

/// Parse `text` into a [`JsonDocument`].
pub fn parse(text: &str, allow_comments: bool) -> JsonDocument {
    let mut parser = Parser {
        text,
        scanner: Scanner::new(text),
        doc: JsonDocument::default(),
        allow_comments,
        last_problem_offset: None,
    };
    parser.parse_root();
    parser.doc
}

struct Parser<'a> {
    text: &'a str,
    scanner: Scanner<'a>,
    doc: JsonDocument,
    allow_comments: bool,
    last_problem_offset: Option<usize>,
}

impl Parser<'_> {
    fn token(&self) -> SyntaxKind {
        self.scanner.token()
    }

    fn scan_next(&mut self) -> SyntaxKind {
        loop {
            let token = self.scanner.scan();
            self.check_scan_error();
            match token {
                SyntaxKind::LineComment | SyntaxKind::BlockComment => {
                    let span = self.scanner.token_offset()..self.scanner.token_end();
                    if !self.allow_comments {
                        self.error_at(
                            "Comments are not permitted in JSON.",
                            ErrorCode::CommentNotPermitted,
                            span.start,
                            span.end,
                        );
                    }
                    self.doc.comments.push(span);
                }
                _ => return token,
            }
        }
    }

    fn check_scan_error(&mut self) {
        let (message, code) = match self.scanner.token_error() {
            ScanError::None => return,
            ScanError::InvalidUnicode => (
                "Invalid unicode sequence in string.",
                ErrorCode::InvalidEscapeCharacter,
            ),
            ScanError::InvalidEscapeCharacter => (
                "Invalid escape character in string.",
                ErrorCode::InvalidEscapeCharacter,
            ),
            ScanError::UnexpectedEndOfNumber => {
                ("Unexpected end of number.", ErrorCode::InvalidNumberFormat)
            }
            ScanError::UnexpectedEndOfComment => {
                ("Unexpected end of comment.", ErrorCode::UnexpectedEndOfComment)
            }
            ScanError::UnexpectedEndOfString => {
                ("Unexpected end of string.", ErrorCode::UnexpectedEndOfString)
            }
            ScanError::InvalidCharacter => (
                "Invalid characters in string. Control characters must be escaped.",
                ErrorCode::InvalidCharacter,
            ),
        };
        self.error_at(
            message,
            code,
            self.scanner.token_offset(),
            self.scanner.token_end(),
        );
    }

    /// Record an error unless one was already recorded at the same offset.
    fn error_at(&mut self, message: &str, code: ErrorCode, start: usize, end: usize) {
        if self.last_problem_offset == Some(start) {
            return;
        }
        self.doc.syntax_errors.push(SyntaxError {
            span: start..end,
            message: message.to_string(),
            code,
        });
        self.last_problem_offset = Some(start);
    }

    /// Record an error at the current token, then skip tokens.
    ///
    /// Tokens in `skip_until_after` are consumed and stop the skip; tokens in
    /// `skip_until` stop it without being consumed.
    fn error(
        &mut self,
        message: &str,
        code: ErrorCode,
        skip_until_after: &[SyntaxKind],
        skip_until: &[SyntaxKind],
    ) {
        let mut start = self.scanner.token_offset();
        let mut end = self.scanner.token_end();
        if start == end && start > 0 {
            // Empty token (end of input): point at the last visible character.
            if let Some((i, c)) = self.text[..start]
                .char_indices()
                .rev()
                .find(|(_, c)| !c.is_whitespace())
            {
                start = i;
                end = i + c.len_utf8();
            } else {
                start -= 1;
                end = start + 1;
            }
        }
        self.error_at(message, code, start, end);

        if skip_until_after.is_empty() && skip_until.is_empty() {
            return;
        }
        let mut token = self.token();
        while token != SyntaxKind::Eof {
            if skip_until_after.contains(&token) {
                self.scan_next();
                break;
            }
            if skip_until.contains(&token) {
                break;
            }
            token = self.scan_next();
        }
    }

    fn push(&mut self, offset: usize, length: usize, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        self.doc.push(AstNode {
            offset,
            length,
            parent,
            kind,
        })
    }

    fn parse_root(&mut self) {
        self.scan_next();
        let root = self.parse_value(None);
        match root {
            None => self.error(
                "Expected a JSON object, array or literal.",
                ErrorCode::Undefined,
                &[],
                &[],
            ),
            Some(_) if self.token() != SyntaxKind::Eof => {
                self.error("End of file expected.", ErrorCode::Undefined, &[], &[])
            }
            Some(_) => {}
        }
        self.doc.root = root;
    }

    fn parse_value(&mut self, parent: Option<NodeId>) -> Option<NodeId> {
        match self.token() {
            SyntaxKind::OpenBrace => Some(self.parse_object(parent)),
            SyntaxKind::OpenBracket => Some(self.parse_array(parent)),
            SyntaxKind::String => Some(self.parse_string(parent)),
            SyntaxKind::Number => Some(self.parse_number(parent)),
            SyntaxKind::True | SyntaxKind::False | SyntaxKind::Null => {
                let kind = match self.token() {
                    SyntaxKind::True => NodeKind::Boolean { value: true },
                    SyntaxKind::False => NodeKind::Boolean { value: false },
                    _ => NodeKind::Null,
                };
                let id = self.push(
                    self.scanner.token_offset(),
                    self.scanner.token_length(),
                    parent,
                    kind,
                );
                self.scan_next();
                Some(id)
            }
            _ => None,
        }
    }

    fn parse_string(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = self.push(
            self.scanner.token_offset(),
            self.scanner.token_length(),
            parent,
            NodeKind::String {
                value: self.scanner.token_value().to_string(),
            },
        );
        self.scan_next();
        id
    }

    fn parse_number(&mut self, parent: Option<NodeId>) -> NodeId {
        let raw = self.scanner.token_value();
        let is_integer = !raw.contains(|c| matches!(c, '.' | 'e' | 'E'));
        let value = match raw.parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                self.error("Invalid number format.", ErrorCode::InvalidNumberFormat, &[], &[]);
                0.0
            }
        };
        let id = self.push(
            self.scanner.token_offset(),
            self.scanner.token_length(),
            parent,
            NodeKind::Number { value, is_integer },
        );
        self.scan_next();
        id
    }

    fn parse_array(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = self.push(
            self.scanner.token_offset(),
            0,
            parent,
            NodeKind::Array { items: Vec::new() },
        );
        self.scan_next(); // consume [

        let mut items = Vec::new();
        let mut needs_comma = false;
        while !matches!(self.token(), SyntaxKind::CloseBracket | SyntaxKind::Eof) {
            if self.token() == SyntaxKind::Comma {
                if !needs_comma {
                    self.error("Value expected", ErrorCode::ValueExpected, &[], &[]);
                }
                let comma = self.scanner.token_offset();
                self.scan_next();
                if self.token() == SyntaxKind::CloseBracket {
                    if needs_comma {
                        self.error_at("Trailing comma", ErrorCode::TrailingComma, comma, comma + 1);
                    }
                    continue;
                }
            } else if needs_comma {
                self.error("Expected comma", ErrorCode::CommaExpected, &[], &[]);
            }

            match self.parse_value(Some(id)) {
                Some(item) => items.push(item),
                None => self.error(
                    "Value expected",
                    ErrorCode::ValueExpected,
                    &[],
                    &[SyntaxKind::CloseBracket, SyntaxKind::Comma],
                ),
            }
            needs_comma = true;
        }

        let closed = self.token() == SyntaxKind::CloseBracket;
        if !closed {
            self.error(
                "Expected comma or closing bracket",
                ErrorCode::CommaOrCloseBracketExpected,
                &[],
                &[],
            );
        }
        self.finish_container(id, NodeKind::Array { items }, closed);
        id
    }

    fn parse_object(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = self.push(
            self.scanner.token_offset(),
            0,
            parent,
            NodeKind::Object {
                properties: Vec::new(),
            },
        );
        self.scan_next(); // consume {

        let mut properties = Vec::new();
        let mut keys_seen = HashSet::new();
        let mut needs_comma = false;
        while !matches!(self.token(), SyntaxKind::CloseBrace | SyntaxKind::Eof) {
            if self.token() == SyntaxKind::Comma {
                if !needs_comma {
                    self.error("Property expected", ErrorCode::PropertyExpected, &[], &[]);
                }
                let comma = self.scanner.token_offset();
                self.scan_next();
                if self.token() == SyntaxKind::CloseBrace {
                    if needs_comma {
                        self.error_at("Trailing comma", ErrorCode::TrailingComma, comma, comma + 1);
                    }
                    continue;
                }
            } else if needs_comma {
                if self.token() != SyntaxKind::String {
                    // Leftover of a value the parser could not read.
                    self.error(
                        "Expected comma or closing brace",
                        ErrorCode::CommaOrCloseBraceExpected,
                        &[],
                        &[SyntaxKind::CloseBrace, SyntaxKind::Comma],
                    );
                    continue;
                }
                self.error("Expected comma", ErrorCode::CommaExpected, &[], &[]);
            }

            match self.parse_property(id, &mut keys_seen) {
                Some(property) => properties.push(property),
                None => self.error(
                    "Property expected",
                    ErrorCode::PropertyExpected,
                    &[],
                    &[SyntaxKind::CloseBrace, SyntaxKind::Comma],
                ),
            }
            needs_comma = true;
        }

        let closed = self.token() == SyntaxKind::CloseBrace;
        if !closed {
            self.error(
                "Expected comma or closing brace",
                ErrorCode::CommaOrCloseBraceExpected,
                &[],
                &[],
            );
        }
        self.finish_container(id, NodeKind::Object { properties }, closed);
        id
    }

    /// Store the children and extend the container over its closing token.
    fn finish_container(&mut self, id: NodeId, kind: NodeKind, closed: bool) {
        let end = if closed {
            self.scanner.token_end()
        } else {
            self.scanner.token_offset()
        };
        let node = self.doc.node_mut(id);
        node.kind = kind;
        node.length = end.saturating_sub(node.offset);
        if closed {
            self.scan_next();
        }
    }

    fn parse_property(&mut self, object: NodeId, keys_seen: &mut HashSet<String>) -> Option<NodeId> {
        let offset = self.scanner.token_offset();
        let key_value = match self.token() {
            SyntaxKind::String => self.scanner.token_value().to_string(),
            SyntaxKind::Unknown => {
                self.error(
                    "Property keys must be doublequoted",
                    ErrorCode::Undefined,
                    &[],
                    &[],
                );
                strip_quotes(self.scanner.token_text()).to_string()
            }
            _ => return None,
        };

        let id = self.push(
            offset,
            0,
            Some(object),
            NodeKind::Property {
                key: NodeId(0),
                value: None,
                colon_offset: None,
            },
        );
        let key = self.push(
            offset,
            self.scanner.token_length(),
            Some(id),
            NodeKind::String {
                value: key_value.clone(),
            },
        );
        let key_end = self.scanner.token_end();
        self.scan_next(); // consume key

        if !keys_seen.insert(key_value) {
            self.error_at(
                "Duplicate object key",
                ErrorCode::DuplicateKey,
                offset,
                key_end,
            );
        }

        let mut colon_offset = None;
        if self.token() == SyntaxKind::Colon {
            colon_offset = Some(self.scanner.token_offset());
            self.scan_next();
        } else {
            self.error("Colon expected", ErrorCode::ColonExpected, &[], &[]);
            if self.token() == SyntaxKind::String && self.on_later_line(key_end, self.scanner.token_offset()) {
                self.finish_property(id, key, None, colon_offset, key_end);
                return Some(id);
            }
        }

        let value = self.parse_value(Some(id));
        let end = match value {
            Some(value) => self.doc.node(value).end(),
            None => {
                if self.token() != SyntaxKind::Unknown {
                    self.error(
                        "Value expected",
                        ErrorCode::ValueExpected,
                        &[],
                        &[SyntaxKind::CloseBrace, SyntaxKind::Comma],
                    );
                }
                colon_offset.map_or(key_end, |colon| colon + 1)
            }
        };
        self.finish_property(id, key, value, colon_offset, end);
        Some(id)
    }

    fn finish_property(
        &mut self,
        id: NodeId,
        key: NodeId,
        value: Option<NodeId>,
        colon_offset: Option<usize>,
        end: usize,
    ) {
        let node = self.doc.node_mut(id);
        node.kind = NodeKind::Property {
            key,
            value,
            colon_offset,
        };
        node.length = end.saturating_sub(node.offset);
    }

    fn on_later_line(&self, before: usize, after: usize) -> bool {
        self.text
            .get(before..after)
            .is_some_and(|gap| gap.contains('\n'))
    }
}

fn strip_quotes(raw: &str) -> &str {
    for quote in ['\'', '`', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}
