//! Go to definition via the workspace index.

use tower_lsp::lsp_types::{GotoDefinitionResponse, Location, Position};

use jomini_language::SymbolKind;

use crate::document::DocumentState;
use crate::state::ServerState;

/// Symbol kinds resolvable by name lookup, in preference order.
pub const NAVIGABLE_KINDS: &[SymbolKind] = &[
    SymbolKind::Event,
    SymbolKind::ScriptedEffect,
    SymbolKind::ScriptedTrigger,
    SymbolKind::ScriptValue,
    SymbolKind::Decision,
    SymbolKind::OnAction,
    SymbolKind::StoryCycle,
    SymbolKind::LocalizationKey,
];

pub fn goto_definition(
    doc: &DocumentState,
    position: Position,
    state: &ServerState,
) -> Option<GotoDefinitionResponse> {
    let offset = doc.line_index.offset(position);
    let (word, _span) = doc.word_at(offset)?;

    let snapshot = state.index.snapshot();
    let mut locations: Vec<Location> = Vec::new();
    for &kind in NAVIGABLE_KINDS {
        for site in snapshot.sites(kind, word) {
            locations.push(Location {
                uri: site.file.clone(),
                range: site.range,
            });
        }
        if !locations.is_empty() {
            break;
        }
    }

    match locations.len() {
        0 => None,
        1 => Some(GotoDefinitionResponse::Scalar(locations.pop().unwrap())),
        _ => Some(GotoDefinitionResponse::Array(locations)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{index_event, make_doc, make_state, position_of};

    #[test]
    fn event_reference_resolves_to_definition() {
        let state = make_state();
        index_event(&state, "other.1", "file:///ws/events/other.txt");
        let source = "namespace = t\nt.1 = {\n    immediate = { trigger_event = { id = other.1 } }\n}\n";
        let doc = make_doc(&state, source);
        let pos = position_of(source, "other.1");
        match goto_definition(&doc, pos, &state) {
            Some(GotoDefinitionResponse::Scalar(location)) => {
                assert!(location.uri.as_str().ends_with("other.txt"));
            }
            other => panic!("expected single location, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_definitions_return_all_sites() {
        let state = make_state();
        index_event(&state, "other.1", "file:///ws/events/a.txt");
        index_event(&state, "other.1", "file:///ws/events/b.txt");
        let source = "namespace = t\nt.1 = {\n    immediate = { trigger_event = { id = other.1 } }\n}\n";
        let doc = make_doc(&state, source);
        let pos = position_of(source, "other.1");
        match goto_definition(&doc, pos, &state) {
            Some(GotoDefinitionResponse::Array(locations)) => assert_eq!(locations.len(), 2),
            other => panic!("expected both sites, got {:?}", other),
        }
    }

    #[test]
    fn unknown_word_is_none() {
        let state = make_state();
        let source = "namespace = t\nt.1 = { hidden = yes }\n";
        let doc = make_doc(&state, source);
        let pos = position_of(source, "hidden");
        assert!(goto_definition(&doc, pos, &state).is_none());
    }
}
