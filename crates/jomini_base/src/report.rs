//! The transport-independent diagnostic model.
//!
//! Every analysis phase produces [`Diagnostic`] values; the server layer
//! converts them to LSP diagnostics at the very edge. Keeping the core model
//! free of `lsp_types` lets the analysis crates be tested without a protocol
//! dependency.

use crate::span::Span;

/// Diagnostic severity, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

/// A secondary location that gives context for a diagnostic, e.g. the other
/// definition site of a duplicated event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Related {
    /// Workspace file the related range lives in, as a URI string.
    /// `None` means the same document as the diagnostic itself.
    pub file: Option<String>,
    pub span: Span,
    pub message: String,
}

/// A machine-applicable replacement the server can offer as a quick fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixHint {
    /// Short, imperative title ("Replace with `my_event.0001.t`").
    pub title: String,
    pub span: Span,
    pub replacement: String,
}

/// A single finding with a stable code and a source range.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub span: Span,
    pub severity: Severity,
    /// Namespaced stable code (`CK3550`, `SCHEMA-004`, `EVENT-003`, ...).
    pub code: String,
    pub message: String,
    pub related: Vec<Related>,
    pub fixes: Vec<FixHint>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: impl Into<String>,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            span,
            severity,
            code: code.into(),
            message: message.into(),
            related: Vec::new(),
            fixes: Vec::new(),
        }
    }

    pub fn error(code: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, span, message)
    }

    pub fn warning(code: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, span, message)
    }

    pub fn info(code: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, span, message)
    }

    pub fn hint(code: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Hint, code, span, message)
    }

    pub fn with_related(
        mut self,
        file: Option<String>,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        self.related.push(Related {
            file,
            span,
            message: message.into(),
        });
        self
    }

    pub fn with_fix(mut self, title: impl Into<String>, span: Span, replacement: impl Into<String>) -> Self {
        self.fixes.push(FixHint {
            title: title.into(),
            span,
            replacement: replacement.into(),
        });
        self
    }
}

/// Stable-sorts by `(span.start, code)` and drops exact `(span, code)`
/// duplicates, so repeated analysis of the same text yields byte-identical
/// output regardless of which phase emitted a finding first.
pub fn finalize(mut diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    diagnostics.sort_by(|a, b| {
        (a.span.start, a.span.end, a.code.as_str()).cmp(&(b.span.start, b.span.end, b.code.as_str()))
    });
    diagnostics.dedup_by(|a, b| a.span == b.span && a.code == b.code);
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_sorts_by_start_then_code() {
        let diags = vec![
            Diagnostic::error("CK3976", Span::new(10, 20), "b"),
            Diagnostic::error("CK3101", Span::new(10, 20), "a"),
            Diagnostic::error("CK3001", Span::new(2, 3), "c"),
        ];
        let out = finalize(diags);
        assert_eq!(out[0].code, "CK3001");
        assert_eq!(out[1].code, "CK3101");
        assert_eq!(out[2].code, "CK3976");
    }

    #[test]
    fn finalize_dedups_same_span_and_code() {
        let diags = vec![
            Diagnostic::error("CK3976", Span::new(4, 9), "first"),
            Diagnostic::error("CK3976", Span::new(4, 9), "second"),
        ];
        let out = finalize(diags);
        assert_eq!(out.len(), 1, "same (span, code) must collapse: {:?}", out);
    }

    #[test]
    fn finalize_keeps_same_code_at_different_spans() {
        let diags = vec![
            Diagnostic::error("CK3976", Span::new(4, 9), "first"),
            Diagnostic::error("CK3976", Span::new(12, 17), "second"),
        ];
        assert_eq!(finalize(diags).len(), 2);
    }

    #[test]
    fn finalize_is_idempotent() {
        let diags = vec![
            Diagnostic::warning("CK3600", Span::new(30, 40), "missing key"),
            Diagnostic::error("CK3550", Span::new(5, 12), "timing"),
        ];
        let once = finalize(diags.clone());
        let twice = finalize(once.clone());
        assert_eq!(once, twice);
    }
}
