//! Per-document state: the result of the most recently *completed* analysis.
//!
//! Queries read these; they never see a half-finished analysis. The live
//! edit buffer is separate (`state::Buffer`) so typing can outrun analysis
//! without tearing query results.

use tower_lsp::lsp_types::Url;

use jomini_base::Diagnostic;
use jomini_language::{DeclaredSymbol, ParseOutput, SymbolKind};

use crate::line_index::LineIndex;

pub struct DocumentState {
    pub uri: Url,
    /// Workspace-relative POSIX path used for schema matching.
    pub rel_path: String,
    pub source: String,
    pub version: i32,
    pub line_index: LineIndex,
    /// Parse tree; `None` for localization bundles.
    pub ast: Option<ParseOutput>,
    /// Core diagnostics, already stable-sorted and deduplicated.
    pub diagnostics: Vec<Diagnostic>,
    pub declared: Vec<DeclaredSymbol>,
    pub referenced: Vec<(SymbolKind, String)>,
}

impl DocumentState {
    /// Identifier-ish text under the cursor, with its byte span.
    ///
    /// Works on raw text rather than the token stream so it also behaves
    /// inside localization bundles and broken regions.
    pub fn word_at(&self, offset: usize) -> Option<(&str, jomini_base::Span)> {
        let bytes = self.source.as_bytes();
        if offset >= bytes.len() || !is_word_byte(bytes[offset]) {
            return None;
        }
        let mut start = offset;
        while start > 0 && is_word_byte(bytes[start - 1]) {
            start -= 1;
        }
        let mut end = offset;
        while end < bytes.len() && is_word_byte(bytes[end]) {
            end += 1;
        }
        Some((
            &self.source[start..end],
            jomini_base::Span::new(start, end),
        ))
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'@')
}

#[cfg(test)]
mod tests {
    use super::*;
    use jomini_language::parse;

    fn doc(source: &str) -> DocumentState {
        DocumentState {
            uri: Url::parse("file:///ws/events/test.txt").unwrap(),
            rel_path: "events/test.txt".to_string(),
            source: source.to_string(),
            version: 1,
            line_index: LineIndex::new(source),
            ast: Some(parse(source)),
            diagnostics: Vec::new(),
            declared: Vec::new(),
            referenced: Vec::new(),
        }
    }

    #[test]
    fn word_at_finds_event_id() {
        let state = doc("namespace = my_mod\nmy_mod.0001 = { }\n");
        let offset = state.source.find("my_mod.0001").unwrap() + 3;
        let (word, span) = state.word_at(offset).unwrap();
        assert_eq!(word, "my_mod.0001");
        assert_eq!(&state.source[span.start..span.end], "my_mod.0001");
    }

    #[test]
    fn word_at_includes_scope_prefix() {
        let state = doc("a = scope:victim\n");
        let offset = state.source.find("scope:").unwrap() + 2;
        assert_eq!(state.word_at(offset).unwrap().0, "scope:victim");
    }

    #[test]
    fn word_at_whitespace_is_none() {
        let state = doc("a = b\n");
        assert!(state.word_at(1).is_none());
    }
}
