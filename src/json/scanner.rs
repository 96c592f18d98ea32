//! Token scanner for JSON with comments.
//!
//! Whitespace is skipped. Anything that is not a JSON token is returned as one
//! [`SyntaxKind::Unknown`] token. Bare words run up to the next structural
//! character or whitespace; single-quoted and backtick strings run to their
//! closing quote.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Comma,
    Colon,
    Null,
    True,
    False,
    String,
    Number,
    LineComment,
    BlockComment,
    Unknown,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    None,
    UnexpectedEndOfComment,
    UnexpectedEndOfString,
    UnexpectedEndOfNumber,
    InvalidUnicode,
    InvalidEscapeCharacter,
    InvalidCharacter,
}

pub struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    token: SyntaxKind,
    token_offset: usize,
    value: String,
    error: ScanError,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            token: SyntaxKind::Eof,
            token_offset: 0,
            value: String::new(),
            error: ScanError::None,
        }
    }

    pub fn token(&self) -> SyntaxKind {
        self.token
    }

    pub fn token_offset(&self) -> usize {
        self.token_offset
    }

    pub fn token_length(&self) -> usize {
        self.pos - self.token_offset
    }

    pub fn token_end(&self) -> usize {
        self.pos
    }

    /// Unescaped string content for strings, raw text otherwise.
    pub fn token_value(&self) -> &str {
        &self.value
    }

    pub fn token_text(&self) -> &'a str {
        &self.text[self.token_offset..self.pos]
    }

    pub fn token_error(&self) -> ScanError {
        self.error
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_byte(&self, ahead: usize) -> Option<u8> {
        self.text.as_bytes().get(self.pos + ahead).copied()
    }

    /// Advance to the next token.
    pub fn scan(&mut self) -> SyntaxKind {
        self.value.clear();
        self.error = ScanError::None;

        while let Some(c) = self.peek() {
            if !c.is_whitespace() && c != '\u{feff}' {
                break;
            }
            self.pos += c.len_utf8();
        }

        self.token_offset = self.pos;
        self.token = self.scan_token();
        self.token
    }

    fn scan_token(&mut self) -> SyntaxKind {
        let Some(c) = self.peek() else {
            return SyntaxKind::Eof;
        };

        let single = match c {
            '{' => Some(SyntaxKind::OpenBrace),
            '}' => Some(SyntaxKind::CloseBrace),
            '[' => Some(SyntaxKind::OpenBracket),
            ']' => Some(SyntaxKind::CloseBracket),
            ':' => Some(SyntaxKind::Colon),
            ',' => Some(SyntaxKind::Comma),
            _ => None,
        };
        if let Some(kind) = single {
            self.pos += 1;
            self.value.push(c);
            return kind;
        }

        match c {
            '"' => {
                self.pos += 1;
                self.scan_string();
                SyntaxKind::String
            }
            '/' => self.scan_comment(),
            '-' | '0'..='9' => self.scan_number(),
            _ => self.scan_word(),
        }
    }

    fn scan_string(&mut self) {
        loop {
            let Some(c) = self.peek() else {
                self.error = ScanError::UnexpectedEndOfString;
                return;
            };
            match c {
                '"' => {
                    self.pos += 1;
                    return;
                }
                '\\' => {
                    self.pos += 1;
                    self.scan_escape();
                }
                '\n' | '\r' => {
                    self.error = ScanError::UnexpectedEndOfString;
                    return;
                }
                _ => {
                    if c.is_control() && c != '\t' {
                        self.error = ScanError::InvalidCharacter;
                    }
                    self.value.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn scan_escape(&mut self) {
        let Some(c) = self.peek() else {
            self.error = ScanError::UnexpectedEndOfString;
            return;
        };
        self.pos += c.len_utf8();
        let unescaped = match c {
            '"' => '"',
            '\\' => '\\',
            '/' => '/',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'u' => match self.scan_hex4() {
                Some(code) => char::from_u32(code).unwrap_or('\u{fffd}'),
                None => {
                    self.error = ScanError::InvalidUnicode;
                    return;
                }
            },
            _ => {
                self.error = ScanError::InvalidEscapeCharacter;
                return;
            }
        };
        self.value.push(unescaped);
    }

    fn scan_hex4(&mut self) -> Option<u32> {
        let digits = self.text.get(self.pos..self.pos + 4)?;
        let code = u32::from_str_radix(digits, 16).ok()?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        self.pos += 4;
        Some(code)
    }

    fn scan_comment(&mut self) -> SyntaxKind {
        match self.peek_byte(1) {
            Some(b'/') => {
                let text = self.text;
                let rest = &text[self.pos..];
                let len = rest.find(|c| c == '\n' || c == '\r').unwrap_or(rest.len());
                self.pos += len;
                self.value.push_str(&rest[..len]);
                SyntaxKind::LineComment
            }
            Some(b'*') => {
                let text = self.text;
                let rest = &text[self.pos..];
                let len = match rest[2..].find("*/") {
                    Some(end) => end + 4,
                    None => {
                        self.error = ScanError::UnexpectedEndOfComment;
                        rest.len()
                    }
                };
                self.pos += len;
                self.value.push_str(&rest[..len]);
                SyntaxKind::BlockComment
            }
            _ => {
                self.pos += 1;
                self.value.push('/');
                SyntaxKind::Unknown
            }
        }
    }

    fn scan_number(&mut self) -> SyntaxKind {
        let start = self.pos;
        let text = self.text;
        let bytes = text.as_bytes();
        let mut pos = self.pos;

        if bytes[pos] == b'-' {
            pos += 1;
            if !bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                return self.scan_word();
            }
        }

        if bytes[pos] == b'0' {
            pos += 1;
        } else {
            while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                pos += 1;
            }
        }

        if bytes.get(pos) == Some(&b'.') {
            pos += 1;
            if bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                    pos += 1;
                }
            } else {
                self.error = ScanError::UnexpectedEndOfNumber;
            }
        }

        if matches!(bytes.get(pos), Some(b'e' | b'E')) {
            pos += 1;
            if matches!(bytes.get(pos), Some(b'+' | b'-')) {
                pos += 1;
            }
            if bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                    pos += 1;
                }
            } else {
                self.error = ScanError::UnexpectedEndOfNumber;
            }
        }

        self.pos = pos;
        self.value.push_str(&text[start..pos]);
        SyntaxKind::Number
    }

    fn scan_word(&mut self) -> SyntaxKind {
        let start = self.pos;
        match self.peek() {
            Some(quote @ ('\'' | '`')) => self.scan_quoted(quote),
            _ => {
                while let Some(c) = self.peek() {
                    if !is_unknown_content(c) {
                        break;
                    }
                    self.pos += c.len_utf8();
                }
            }
        }
        if self.pos == start {
            // A lone character that cannot start any token.
            if let Some(c) = self.peek() {
                self.pos += c.len_utf8();
            }
        }
        let text = self.text;
        let word = &text[start..self.pos];
        self.value.push_str(word);
        match word {
            "true" => SyntaxKind::True,
            "false" => SyntaxKind::False,
            "null" => SyntaxKind::Null,
            _ => SyntaxKind::Unknown,
        }
    }

    /// Consume a `'...'` or backtick string up to its closing quote.
    ///
    /// Backtick strings may span lines. An unterminated single-quoted string
    /// stops at the end of its line.
    fn scan_quoted(&mut self, quote: char) {
        self.pos += quote.len_utf8();
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        self.pos += escaped.len_utf8();
                    }
                }
                '\n' | '\r' if quote == '\'' => return,
                _ => {
                    self.pos += c.len_utf8();
                    if c == quote {
                        return;
                    }
                }
            }
        }
    }
}

fn is_unknown_content(c: char) -> bool {
    !(c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | '"' | ':' | ',' | '/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<(SyntaxKind, String)> {
        let mut scanner = Scanner::new(text);
        let mut out = Vec::new();
        loop {
            let kind = scanner.scan();
            if kind == SyntaxKind::Eof {
                break;
            }
            out.push((kind, scanner.token_value().to_string()));
        }
        out
    }

    #[test]
    fn json_tokens() {
        use SyntaxKind::*;
        let kinds: Vec<SyntaxKind> = tokens(r#"{"a": [1, -2.5e3, true, false, null]}"#)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(
            kinds,
            vec![
                OpenBrace, String, Colon, OpenBracket, Number, Comma, Number, Comma, True, Comma,
                False, Comma, Null, CloseBracket, CloseBrace
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let toks = tokens(r#""a\"b\nA""#);
        assert_eq!(toks, vec![(SyntaxKind::String, "a\"b\nA".to_string())]);
    }

    #[test]
    fn bare_words_and_quotes_are_unknown() {
        let toks = tokens("{ type: page, label: 'Hi', tpl: `x` }");
        let unknown: Vec<&str> = toks
            .iter()
            .filter(|(k, _)| *k == SyntaxKind::Unknown)
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(unknown, vec!["type", "page", "label", "'Hi'", "tpl", "`x`"]);
    }

    #[test]
    fn quoted_words_run_to_their_closing_quote() {
        let toks = tokens("{ api: 'http://x.com/a', tpl: `a, b\n}`, t: 'it\\'s' }");
        let unknown: Vec<&str> = toks
            .iter()
            .filter(|(k, _)| *k == SyntaxKind::Unknown)
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(
            unknown,
            vec!["api", "'http://x.com/a'", "tpl", "`a, b\n}`", "t", "'it\\'s'"]
        );
        assert!(toks.iter().all(|(k, _)| *k != SyntaxKind::LineComment));

        let toks = tokens("'open\n1");
        assert_eq!(toks[0], (SyntaxKind::Unknown, "'open".to_string()));
        assert_eq!(toks[1].0, SyntaxKind::Number);
    }

    #[test]
    fn comments() {
        let toks = tokens("// line\n/* block */ 1");
        assert_eq!(toks[0], (SyntaxKind::LineComment, "// line".to_string()));
        assert_eq!(toks[1], (SyntaxKind::BlockComment, "/* block */".to_string()));
        assert_eq!(toks[2].0, SyntaxKind::Number);
    }

    #[test]
    fn scan_errors() {
        let mut scanner = Scanner::new("\"abc");
        scanner.scan();
        assert_eq!(scanner.token_error(), ScanError::UnexpectedEndOfString);

        let mut scanner = Scanner::new("/* open");
        scanner.scan();
        assert_eq!(scanner.token_error(), ScanError::UnexpectedEndOfComment);

        let mut scanner = Scanner::new("1.");
        scanner.scan();
        assert_eq!(scanner.token_error(), ScanError::UnexpectedEndOfNumber);

        let mut scanner = Scanner::new(r#""\q""#);
        scanner.scan();
        assert_eq!(scanner.token_error(), ScanError::InvalidEscapeCharacter);
    }

    #[test]
    fn offsets_are_bytes() {
        let mut scanner = Scanner::new("  \"é\" x");
        assert_eq!(scanner.scan(), SyntaxKind::String);
        assert_eq!(scanner.token_offset(), 2);
        assert_eq!(scanner.token_length(), 4);
        assert_eq!(scanner.scan(), SyntaxKind::Unknown);
        assert_eq!(scanner.token_offset(), 7);
    }
}
