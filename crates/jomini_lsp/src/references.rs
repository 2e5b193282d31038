//! Find references: definition sites from the index plus textual occurrences
//! in every open document.
//!
//! Reference *sites* are not indexed workspace-wide (only definitions are),
//! so occurrences come from scanning open buffers with identifier-boundary
//! matching. That covers the editing loop the feature exists for.

use tower_lsp::lsp_types::{Location, Position, Url};

use jomini_base::Span;

use crate::definition::NAVIGABLE_KINDS;
use crate::document::DocumentState;
use crate::state::ServerState;

pub fn find_references(
    doc: &DocumentState,
    position: Position,
    state: &ServerState,
    include_declaration: bool,
) -> Vec<Location> {
    let offset = doc.line_index.offset(position);
    let Some((word, _)) = doc.word_at(offset) else {
        return Vec::new();
    };

    let mut locations = Vec::new();
    let snapshot = state.index.snapshot();

    let mut definition_spans: Vec<(Url, tower_lsp::lsp_types::Range)> = Vec::new();
    for &kind in NAVIGABLE_KINDS {
        for site in snapshot.sites(kind, word) {
            definition_spans.push((site.file.clone(), site.range));
        }
    }

    if include_declaration {
        for (uri, range) in &definition_spans {
            locations.push(Location {
                uri: uri.clone(),
                range: *range,
            });
        }
    }

    // Occurrences in open documents, definition sites excluded to avoid
    // double-reporting.
    for entry in state.documents.iter() {
        let open = entry.value();
        for span in word_occurrences(&open.source, word) {
            let range = open.line_index.range(span);
            let already = definition_spans
                .iter()
                .any(|(uri, def_range)| uri == &open.uri && *def_range == range);
            if !already {
                locations.push(Location {
                    uri: open.uri.clone(),
                    range,
                });
            }
        }
    }

    locations
}

/// Byte spans of `word` in `source` at identifier boundaries.
pub fn word_occurrences(source: &str, word: &str) -> Vec<Span> {
    if word.is_empty() {
        return Vec::new();
    }
    let bytes = source.as_bytes();
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(found) = source[from..].find(word) {
        let start = from + found;
        let end = start + word.len();
        let left_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let right_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if left_ok && right_ok {
            out.push(Span::new(start, end));
        }
        from = start + 1;
    }
    out
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'@')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_doc, make_state, open_doc, position_of};

    #[test]
    fn occurrences_respect_word_boundaries() {
        let spans = word_occurrences("gold add_gold gold2 gold", "gold");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0], Span::new(0, 4));
        assert_eq!(spans[1], Span::new(20, 24));
    }

    #[test]
    fn scope_prefixed_names_match_whole() {
        let spans = word_occurrences("scope:t = { this = scope:t }", "scope:t");
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn references_span_open_documents() {
        let state = make_state();
        let here = "namespace = t\nt.1 = {\n    immediate = { my_helper = yes }\n}\n";
        let doc = make_doc(&state, here);
        open_doc(&state, "file:///ws/events/test.txt", here);
        open_doc(
            &state,
            "file:///ws/events/other.txt",
            "namespace = o\no.1 = {\n    immediate = { my_helper = yes }\n}\n",
        );

        let pos = position_of(here, "my_helper");
        let refs = find_references(&doc, pos, &state, false);
        assert_eq!(refs.len(), 2, "one occurrence per open document: {:?}", refs);
    }

    #[test]
    fn include_declaration_adds_index_sites() {
        let state = make_state();
        crate::test_support::index_event(&state, "o.1", "file:///ws/events/defs.txt");
        let here = "namespace = t\nt.1 = {\n    immediate = { trigger_event = { id = o.1 } }\n}\n";
        let doc = make_doc(&state, here);
        open_doc(&state, "file:///ws/events/test.txt", here);

        let pos = position_of(here, "o.1");
        let with = find_references(&doc, pos, &state, true);
        let without = find_references(&doc, pos, &state, false);
        assert_eq!(with.len(), without.len() + 1);
    }
}
