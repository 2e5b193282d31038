//! Recursive-descent parser with brace-boundary error recovery.
//!
//! Parsing is total: every input yields a root [`Block`] plus diagnostics.
//! On a stray `}` the parser reports and continues in the enclosing block; on
//! EOF with unclosed braces it reports once, at the outermost unclosed
//! opener, and keeps everything parsed so far so downstream phases can still
//! inspect the document.

use std::collections::HashSet;

use jomini_base::{codes, Diagnostic, Span};

use crate::ast::{Block, Entry, Scalar, Value};
use crate::lexer::{self, LexOutput};
use crate::token::{Comment, Operator, Token, TokenKind};

/// Hard cap on block nesting. Deeper input is almost certainly a brace error
/// amplified by resynchronization, not a real document.
const MAX_DEPTH: usize = 256;

/// Everything the parser knows about a document.
pub struct ParseOutput {
    pub root: Block,
    pub comments: Vec<Comment>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses `source` without merged-identifier detection.
pub fn parse(source: &str) -> ParseOutput {
    parse_with_keywords(source, None)
}

/// Parses `source`. When `keywords` is given, an identifier that is exactly
/// two known keywords run together is split into both halves (reported as
/// `CK3345`); the split is never applied speculatively.
pub fn parse_with_keywords(source: &str, keywords: Option<&HashSet<String>>) -> ParseOutput {
    let LexOutput {
        tokens,
        comments,
        diagnostics,
    } = lexer::lex(source);

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        diagnostics,
        keywords,
        unclosed_opener: None,
    };

    let mut root = parser.block_body(0, Span::new(0, source.len()));
    root.span = Span::new(0, source.len());

    if let Some(opener) = parser.unclosed_opener {
        parser.diagnostics.push(Diagnostic::error(
            codes::UNCLOSED_BRACE,
            opener,
            "this `{` is never closed",
        ));
        parser.diagnostics.push(Diagnostic::warning(
            codes::UNCLOSED_BRACE_STYLE,
            opener,
            "the file ends with unbalanced braces",
        ));
    }

    ParseOutput {
        root,
        comments,
        diagnostics: parser.diagnostics,
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    keywords: Option<&'a HashSet<String>>,
    /// Opener of the outermost block still unclosed at EOF.
    unclosed_opener: Option<Span>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parses entries until a closing brace (consumed) or EOF. `span` is the
    /// provisional block span; the caller fixes it up once the closer is seen.
    fn block_body(&mut self, depth: usize, span: Span) -> Block {
        let mut block = Block {
            entries: Vec::new(),
            span,
        };
        loop {
            match self.peek() {
                None => {
                    if depth > 0 {
                        // Unwinding at EOF: the last writer is the outermost
                        // unclosed opener.
                        self.unclosed_opener = Some(span);
                    }
                    return block;
                }
                Some(token) if token.kind == TokenKind::RBrace => {
                    let closer = self.bump().expect("peeked");
                    if depth > 0 {
                        block.span = Span::new(span.start, closer.span.end);
                        return block;
                    }
                    self.diagnostics.push(Diagnostic::error(
                        codes::STRAY_CLOSING_BRACE,
                        closer.span,
                        "unexpected `}` with no matching `{`",
                    ));
                    self.diagnostics.push(Diagnostic::warning(
                        codes::STRAY_CLOSING_BRACE_STYLE,
                        closer.span,
                        "this `}` unbalances the rest of the file",
                    ));
                }
                Some(_) => self.entry(depth, &mut block),
            }
        }
    }

    fn entry(&mut self, depth: usize, block: &mut Block) {
        let token = self.bump().expect("caller checked peek");
        let (key, key_span, quoted) = match token.kind {
            TokenKind::Identifier(text) => (text, token.span, false),
            TokenKind::Str(text) => (text, token.span, true),
            TokenKind::Number { .. } => (
                self.raw_text(token.span).to_string(),
                token.span,
                false,
            ),
            TokenKind::LBrace => {
                self.diagnostics.push(Diagnostic::error(
                    codes::STRAY_CLOSING_BRACE,
                    token.span,
                    "unexpected `{` without a key",
                ));
                // Consume the anonymous group so recovery stays brace-balanced.
                self.parse_block_value(depth + 1, token.span);
                return;
            }
            TokenKind::Operator(op) => {
                self.diagnostics.push(Diagnostic::error(
                    codes::STRAY_CLOSING_BRACE,
                    token.span,
                    format!("unexpected `{}` without a key", op.as_str()),
                ));
                return;
            }
            TokenKind::RBrace => unreachable!("handled in block_body"),
        };

        match self.peek() {
            Some(next) if matches!(next.kind, TokenKind::Operator(_)) => {
                let op_token = self.bump().expect("peeked");
                let op = match op_token.kind {
                    TokenKind::Operator(op) => op,
                    _ => unreachable!(),
                };
                let value = self.parse_value(depth, op_token.span);
                let span = key_span.merge(value.span());
                block.entries.push(Entry {
                    key,
                    key_span,
                    op,
                    has_operator: true,
                    value,
                    span,
                });
            }
            _ => {
                // Bare scalar: a list element with an implied `=`.
                if !quoted {
                    if let Some(halves) = self.split_merged(&key) {
                        let (left, right) = halves;
                        let mid = key_span.start + left.len();
                        self.diagnostics.push(Diagnostic::warning(
                            codes::MERGED_IDENTIFIERS,
                            key_span,
                            format!(
                                "`{}` looks like `{}` and `{}` run together",
                                key, left, right
                            ),
                        ));
                        block.entries.push(bare_entry(left, Span::new(key_span.start, mid), false));
                        block.entries.push(bare_entry(right, Span::new(mid, key_span.end), false));
                        return;
                    }
                }
                block.entries.push(bare_entry(key, key_span, quoted));
            }
        }
    }

    fn parse_value(&mut self, depth: usize, op_span: Span) -> Value {
        match self.peek() {
            Some(token) if token.kind == TokenKind::LBrace => {
                let opener = self.bump().expect("peeked");
                self.parse_block_value(depth + 1, opener.span)
            }
            Some(token)
                if matches!(
                    token.kind,
                    TokenKind::Identifier(_) | TokenKind::Number { .. } | TokenKind::Str(_)
                ) =>
            {
                let token = self.bump().expect("peeked");
                Value::Scalar(self.scalar_from(token))
            }
            _ => {
                // `key =` with nothing usable after it.
                self.diagnostics.push(Diagnostic::error(
                    codes::STRAY_CLOSING_BRACE,
                    op_span,
                    "operator has no value",
                ));
                Value::Scalar(Scalar::new("", Span::point(op_span.end)))
            }
        }
    }

    /// Parses a brace block whose opener was already consumed, enforcing the
    /// nesting cap and collapsing all-bare-scalar blocks into lists.
    fn parse_block_value(&mut self, depth: usize, opener: Span) -> Value {
        if depth > MAX_DEPTH {
            self.diagnostics.push(Diagnostic::error(
                codes::NESTING_TOO_DEEP,
                opener,
                format!("blocks nest deeper than {} levels", MAX_DEPTH),
            ));
            self.skip_balanced();
            return Value::Block(Block {
                entries: Vec::new(),
                span: opener,
            });
        }
        let block = self.block_body(depth, opener);
        if !block.entries.is_empty()
            && block
                .entries
                .iter()
                .all(|e| !e.has_operator && matches!(e.value, Value::Scalar(_)))
        {
            let items = block
                .entries
                .into_iter()
                .filter_map(|e| match e.value {
                    Value::Scalar(s) => Some(s),
                    _ => None,
                })
                .collect();
            return Value::List(items);
        }
        Value::Block(block)
    }

    /// Consumes tokens until the current brace nesting closes. Used only for
    /// over-deep blocks, where the content is not worth keeping.
    fn skip_balanced(&mut self) {
        let mut level = 1usize;
        while let Some(token) = self.bump() {
            match token.kind {
                TokenKind::LBrace => level += 1,
                TokenKind::RBrace => {
                    level -= 1;
                    if level == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn scalar_from(&self, token: Token) -> Scalar {
        match token.kind {
            TokenKind::Identifier(text) => Scalar::new(text, token.span),
            TokenKind::Str(text) => Scalar::quoted(text, token.span),
            TokenKind::Number { .. } => {
                Scalar::new(self.raw_text(token.span).to_string(), token.span)
            }
            _ => Scalar::new("", token.span),
        }
    }

    /// Splits `ident` at the unique boundary where both halves are known
    /// keywords. Ambiguous or partial matches leave the identifier intact.
    fn split_merged(&self, ident: &str) -> Option<(String, String)> {
        let keywords = self.keywords?;
        if keywords.contains(ident) {
            return None;
        }
        let mut found = None;
        for split in 1..ident.len() {
            if !ident.is_char_boundary(split) {
                continue;
            }
            let (left, right) = ident.split_at(split);
            if keywords.contains(left) && keywords.contains(right) {
                if found.is_some() {
                    // More than one plausible split: stay out of it.
                    return None;
                }
                found = Some((left.to_string(), right.to_string()));
            }
        }
        found
    }

    /// Original text of a span. Number tokens go through here so `0.35`
    /// keeps its written form instead of a float round-trip.
    fn raw_text(&self, span: Span) -> &str {
        &self.source[span.start..span.end]
    }
}

fn bare_entry(text: String, span: Span, quoted: bool) -> Entry {
    let scalar = if quoted {
        Scalar::quoted(text.clone(), span)
    } else {
        Scalar::new(text.clone(), span)
    };
    Entry {
        key: text,
        key_span: span,
        op: Operator::Eq,
        has_operator: false,
        value: Value::Scalar(scalar),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_entries() {
        let doc = parse("namespace = my_mod\nversion = 2\n");
        assert!(doc.diagnostics.is_empty(), "diags: {:?}", doc.diagnostics);
        assert_eq!(doc.root.entries.len(), 2);
        assert_eq!(doc.root.scalar_of("namespace"), Some("my_mod"));
        assert_eq!(doc.root.scalar_of("version"), Some("2"));
    }

    #[test]
    fn parses_nested_blocks() {
        let doc = parse("my_mod.0001 = { trigger = { is_alive = yes } }");
        assert!(doc.diagnostics.is_empty(), "diags: {:?}", doc.diagnostics);
        let event = doc.root.get("my_mod.0001").unwrap();
        let trigger = event.block().unwrap().get("trigger").unwrap();
        assert_eq!(trigger.block().unwrap().scalar_of("is_alive"), Some("yes"));
    }

    #[test]
    fn entry_spans_cover_key_through_value() {
        let source = "key = { a = 1 }";
        let doc = parse(source);
        let entry = &doc.root.entries[0];
        assert_eq!(&source[entry.key_span.start..entry.key_span.end], "key");
        assert_eq!(&source[entry.span.start..entry.span.end], source);
    }

    #[test]
    fn all_scalar_block_becomes_list() {
        let doc = parse("color = { 255 0 0 }");
        match &doc.root.entries[0].value {
            Value::List(items) => {
                let texts: Vec<&str> = items.iter().map(|s| s.text.as_str()).collect();
                assert_eq!(texts, vec!["255", "0", "0"]);
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn empty_block_stays_a_block() {
        let doc = parse("modifier = { }");
        assert!(matches!(doc.root.entries[0].value, Value::Block(_)));
    }

    #[test]
    fn mixed_block_keeps_bare_entries() {
        let doc = parse("traits = { brave education_martial_3 tier = high }");
        let block = doc.root.entries[0].block().unwrap();
        assert_eq!(block.entries.len(), 3);
        assert!(!block.entries[0].has_operator);
        assert!(block.entries[2].has_operator);
    }

    #[test]
    fn stray_closing_brace_reports_both_codes_and_continues() {
        let doc = parse("a = 1\n}\nb = 2\n");
        let codes_seen: Vec<&str> = doc.diagnostics.iter().map(|d| d.code.as_str()).collect();
        assert_eq!(
            codes_seen,
            vec![codes::STRAY_CLOSING_BRACE, codes::STRAY_CLOSING_BRACE_STYLE],
            "syntax code and its style-band twin fire together"
        );
        assert_eq!(doc.diagnostics[0].span, doc.diagnostics[1].span);
        assert!(doc.root.contains_key("a"));
        assert!(doc.root.contains_key("b"), "parsing must continue past the stray brace");
    }

    #[test]
    fn unclosed_brace_points_at_outermost_opener() {
        let source = "outer = { inner = { leaf = 1 ";
        let doc = parse(source);
        let unclosed: Vec<_> = doc
            .diagnostics
            .iter()
            .filter(|d| d.code == codes::UNCLOSED_BRACE)
            .collect();
        assert_eq!(unclosed.len(), 1, "exactly one unclosed-brace report");
        let opener_offset = source.find('{').unwrap();
        assert_eq!(unclosed[0].span.start, opener_offset);
        // The style-band twin lands at the same opener.
        let twin: Vec<_> = doc
            .diagnostics
            .iter()
            .filter(|d| d.code == codes::UNCLOSED_BRACE_STYLE)
            .collect();
        assert_eq!(twin.len(), 1);
        assert_eq!(twin[0].span.start, opener_offset);
    }

    #[test]
    fn dangling_operator_recovers() {
        let doc = parse("a = =\nb = 2\n");
        assert!(!doc.diagnostics.is_empty());
        assert!(doc.root.contains_key("b"), "parsing continues past the dangling operator");
    }

    #[test]
    fn operator_before_closer_recovers() {
        let doc = parse("outer = { a = }\nb = 2\n");
        assert!(!doc.diagnostics.is_empty());
        assert!(doc.root.contains_key("b"));
    }

    #[test]
    fn comparison_operators_parse() {
        let doc = parse("age >= 16 gold < 100");
        assert_eq!(doc.root.entries[0].op, Operator::Ge);
        assert_eq!(doc.root.entries[1].op, Operator::Lt);
    }

    #[test]
    fn merged_identifiers_split_when_both_halves_known() {
        let keywords: HashSet<String> =
            ["brave", "craven"].iter().map(|s| s.to_string()).collect();
        let doc = parse_with_keywords("traits = { bravecraven }", Some(&keywords));
        let warning: Vec<_> = doc
            .diagnostics
            .iter()
            .filter(|d| d.code == codes::MERGED_IDENTIFIERS)
            .collect();
        assert_eq!(warning.len(), 1);
        // Both halves become list elements.
        match &doc.root.entries[0].value {
            Value::List(items) => {
                let texts: Vec<&str> = items.iter().map(|s| s.text.as_str()).collect();
                assert_eq!(texts, vec!["brave", "craven"]);
            }
            other => panic!("expected list after split, got {:?}", other),
        }
    }

    #[test]
    fn merged_identifiers_not_split_speculatively() {
        let keywords: HashSet<String> =
            ["brave", "craven"].iter().map(|s| s.to_string()).collect();
        // "bravecowardly": second half unknown, must stay intact.
        let doc = parse_with_keywords("traits = { bravecowardly }", Some(&keywords));
        assert!(doc
            .diagnostics
            .iter()
            .all(|d| d.code != codes::MERGED_IDENTIFIERS));
        match &doc.root.entries[0].value {
            Value::List(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].text, "bravecowardly");
            }
            other => panic!("expected single-element list, got {:?}", other),
        }
    }

    #[test]
    fn deep_nesting_is_capped() {
        let mut source = String::from("a = ");
        for _ in 0..300 {
            source.push_str("{ x = ");
        }
        source.push('1');
        for _ in 0..300 {
            source.push_str(" }");
        }
        let doc = parse(&source);
        assert!(
            doc.diagnostics.iter().any(|d| d.code == codes::NESTING_TOO_DEEP),
            "expected depth-cap diagnostic"
        );
    }

    #[test]
    fn parse_is_deterministic() {
        let source = "a = 1\nbad = {\nc = 2\n";
        let first = parse(source);
        let second = parse(source);
        assert_eq!(first.root, second.root);
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn well_formed_input_has_no_diagnostics() {
        let source = r#"
my_mod.0001 = {
    type = character_event
    title = my_mod.0001.t
    desc = my_mod.0001.desc
    option = {
        name = my_mod.0001.a
        add_gold = 50
    }
}
"#;
        let doc = parse(source);
        assert!(doc.diagnostics.is_empty(), "diags: {:?}", doc.diagnostics);
    }

    #[test]
    fn quoted_keys_parse() {
        let doc = parse(r#""with space" = yes"#);
        assert_eq!(doc.root.entries[0].key, "with space");
    }
}
