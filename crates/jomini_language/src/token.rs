//! Token definitions for the Jomini lexer.

use jomini_base::Span;

/// Comparison / assignment operators.
///
/// Jomini treats `=` as both assignment and equality depending on context;
/// the distinction is semantic, not lexical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `==`
    EqEq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::EqEq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
        }
    }

    /// `true` for the operators that only make sense in trigger position.
    pub fn is_comparison(self) -> bool {
        !matches!(self, Operator::Eq)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `[A-Za-z_@][A-Za-z_0-9:.]*`, including `scope:x`, `var:x`,
    /// `my_mod.0001`, and `@script_value` forms.
    Identifier(String),
    /// Signed integer or decimal. `yes`/`no` are identifiers, not numbers.
    Number { value: f64, is_float: bool },
    /// Double-quoted string, escapes already resolved.
    Str(String),
    Operator(Operator),
    LBrace,
    RBrace,
}

/// A lexeme with its byte range in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }

    /// Identifier text, if this token is one.
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Identifier(text) => Some(text),
            _ => None,
        }
    }
}

/// A comment with its byte range, kept out of the token stream but retained
/// for editor features.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub span: Span,
    /// Text after the `#`, untrimmed.
    pub text: String,
}
