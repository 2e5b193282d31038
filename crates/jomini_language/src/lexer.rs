//! Byte-level lexer for Jomini script.
//!
//! The lexer is total: any byte sequence produces a token stream plus zero or
//! more diagnostics. Whitespace is skipped; comments are skipped from the
//! token stream but retained (with spans) for editor features. Position
//! information is byte-accurate; the server layer converts to line/column.

use jomini_base::{codes, Diagnostic, Span};

use crate::token::{Comment, Operator, Token, TokenKind};

/// Output of a lexer run.
pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Tokenizes `source` in a single left-to-right pass.
pub fn lex(source: &str) -> LexOutput {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
    comments: Vec<Comment>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
            comments: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn run(mut self) -> LexOutput {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'#' => self.comment(),
                b'{' => self.punct(TokenKind::LBrace),
                b'}' => self.punct(TokenKind::RBrace),
                b'"' => self.string(),
                b'=' | b'!' | b'>' | b'<' => self.operator(),
                b'-' | b'+' | b'0'..=b'9' => self.number_or_ident(),
                _ => self.identifier(),
            }
        }
        LexOutput {
            tokens: self.tokens,
            comments: self.comments,
            diagnostics: self.diagnostics,
        }
    }

    fn punct(&mut self, kind: TokenKind) {
        let span = Span::new(self.pos, self.pos + 1);
        self.tokens.push(Token::new(kind, span));
        self.pos += 1;
    }

    fn comment(&mut self) {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
            self.pos += 1;
        }
        let span = Span::new(start, self.pos);
        self.comments.push(Comment {
            span,
            text: self.source[start + 1..self.pos].to_string(),
        });
    }

    fn operator(&mut self) {
        let start = self.pos;
        let first = self.bytes[self.pos];
        let second = self.bytes.get(self.pos + 1).copied();
        let (op, len) = match (first, second) {
            (b'=', Some(b'=')) => (Operator::EqEq, 2),
            (b'!', Some(b'=')) => (Operator::Ne, 2),
            (b'>', Some(b'=')) => (Operator::Ge, 2),
            (b'<', Some(b'=')) => (Operator::Le, 2),
            (b'=', _) => (Operator::Eq, 1),
            (b'>', _) => (Operator::Gt, 1),
            (b'<', _) => (Operator::Lt, 1),
            // lone `!`: treat as the start of an identifier-ish junk token;
            // the parser reports it as an unexpected entry
            (_, _) => {
                self.identifier();
                return;
            }
        };
        self.pos += len;
        self.tokens
            .push(Token::new(TokenKind::Operator(op), Span::new(start, self.pos)));
    }

    fn string(&mut self) {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut text = String::new();
        loop {
            match self.bytes.get(self.pos) {
                None | Some(b'\n') => {
                    // Unterminated: close at end-of-line and report.
                    let span = Span::new(start, self.pos);
                    self.diagnostics.push(Diagnostic::error(
                        codes::UNTERMINATED_STRING,
                        span,
                        "string is missing its closing quote",
                    ));
                    self.tokens.push(Token::new(TokenKind::Str(text), span));
                    return;
                }
                Some(b'\\') => {
                    match self.bytes.get(self.pos + 1) {
                        Some(b'"') => {
                            text.push('"');
                            self.pos += 2;
                        }
                        Some(b'\\') => {
                            text.push('\\');
                            self.pos += 2;
                        }
                        // Unknown escape: keep the backslash verbatim.
                        _ => {
                            text.push('\\');
                            self.pos += 1;
                        }
                    }
                }
                Some(b'"') => {
                    self.pos += 1;
                    let span = Span::new(start, self.pos);
                    self.tokens.push(Token::new(TokenKind::Str(text), span));
                    return;
                }
                Some(_) => {
                    // Advance one full UTF-8 character.
                    let ch_len = utf8_len(self.bytes[self.pos]);
                    let end = (self.pos + ch_len).min(self.bytes.len());
                    text.push_str(&self.source[self.pos..end]);
                    self.pos = end;
                }
            }
        }
    }

    fn number_or_ident(&mut self) {
        let start = self.pos;
        let mut pos = self.pos;
        if matches!(self.bytes[pos], b'-' | b'+') {
            pos += 1;
        }
        let digits_start = pos;
        let mut seen_dot = false;
        let mut numeric = true;
        while pos < self.bytes.len() {
            match self.bytes[pos] {
                b'0'..=b'9' => pos += 1,
                b'.' if !seen_dot => {
                    seen_dot = true;
                    pos += 1;
                }
                b if is_ident_continue(b) || b == b'.' => {
                    numeric = false;
                    break;
                }
                _ => break,
            }
        }
        if !numeric || pos == digits_start {
            // `-` with no digits, or digits running into identifier characters
            // (e.g. an event id like `1066.scenario`): lex as identifier.
            self.identifier();
            return;
        }
        let text = &self.source[start..pos];
        let value: f64 = text.parse().unwrap_or(0.0);
        self.pos = pos;
        self.tokens.push(Token::new(
            TokenKind::Number {
                value,
                is_float: seen_dot,
            },
            Span::new(start, pos),
        ));
    }

    fn identifier(&mut self) {
        let start = self.pos;
        // First byte is accepted unconditionally so that stray bytes form a
        // one-byte junk identifier rather than an infinite loop.
        self.pos += utf8_len(self.bytes[self.pos]);
        while self.pos < self.bytes.len() && is_ident_continue(self.bytes[self.pos]) {
            self.pos += 1;
        }
        let span = Span::new(start, self.pos);
        self.tokens.push(Token::new(
            TokenKind::Identifier(self.source[span.start..span.end].to_string()),
            span,
        ));
    }
}

/// Identifier continuation set: letters, digits, `_`, plus `:` for
/// `scope:`/`var:` forms, `.` for chains and event ids, `@` for script
/// values, `$` for scripted-effect argument substitution, and `'` which
/// appears in some loc-adjacent names.
fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b':' | b'.' | b'@' | b'$' | b'\'')
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}
