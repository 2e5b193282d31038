//! Quick fixes derived from diagnostics that carry machine-applicable
//! replacements (loc-key suggestions, direct-comparison rewrites, ...).

use std::collections::HashMap;

use tower_lsp::lsp_types::{
    CodeAction, CodeActionKind, CodeActionOrCommand, CodeActionResponse, Diagnostic, Range,
    TextEdit, Url, WorkspaceEdit,
};

use crate::diagnostics;
use crate::document::DocumentState;

pub fn code_actions(doc: &DocumentState, range: Range, uri: &Url) -> CodeActionResponse {
    let start = doc.line_index.offset(range.start);
    let end = doc.line_index.offset(range.end);

    let mut actions = Vec::new();
    for diagnostic in &doc.diagnostics {
        if diagnostic.fixes.is_empty() {
            continue;
        }
        // Overlap with the requested range (point requests included).
        if diagnostic.span.end < start || diagnostic.span.start > end {
            continue;
        }
        let lsp_diagnostic: Diagnostic = diagnostics::convert(diagnostic, &doc.line_index, uri);
        for fix in &diagnostic.fixes {
            let mut changes = HashMap::new();
            changes.insert(
                uri.clone(),
                vec![TextEdit {
                    range: doc.line_index.range(fix.span),
                    new_text: fix.replacement.clone(),
                }],
            );
            actions.push(CodeActionOrCommand::CodeAction(CodeAction {
                title: fix.title.clone(),
                kind: Some(CodeActionKind::QUICKFIX),
                diagnostics: Some(vec![lsp_diagnostic.clone()]),
                edit: Some(WorkspaceEdit {
                    changes: Some(changes),
                    ..Default::default()
                }),
                is_preferred: Some(true),
                ..Default::default()
            }));
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_doc, make_doc_with_loc, make_state};
    use tower_lsp::lsp_types::Position;

    #[test]
    fn loc_suggestion_becomes_quickfix() {
        let state = make_state();
        // Index defines my.0001.t; the event references my.0001.ti.
        let source = "namespace = my\nmy.0001 = {\n    hidden = yes\n    title = my.0001.ti\n}\n";
        let doc = make_doc_with_loc(&state, source, &["my.0001.t"]);

        let diag_with_fix = doc
            .diagnostics
            .iter()
            .find(|d| !d.fixes.is_empty())
            .expect("loc miss should carry a fix");
        let range = doc.line_index.range(diag_with_fix.span);
        let actions = code_actions(&doc, range, &doc.uri);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            CodeActionOrCommand::CodeAction(action) => {
                assert!(action.title.contains("my.0001.t"));
                assert_eq!(action.kind, Some(CodeActionKind::QUICKFIX));
                assert!(action.edit.is_some());
            }
            other => panic!("expected code action, got {:?}", other),
        }
    }

    #[test]
    fn no_actions_outside_diagnostic_range() {
        let state = make_state();
        let source = "namespace = my\nmy.0001 = {\n    hidden = yes\n    title = my.0001.ti\n}\n";
        let doc = make_doc_with_loc(&state, source, &["my.0001.t"]);
        let zero = Range {
            start: Position { line: 0, character: 0 },
            end: Position { line: 0, character: 1 },
        };
        assert!(code_actions(&doc, zero, &doc.uri).is_empty());
    }

    #[test]
    fn clean_document_offers_nothing() {
        let state = make_state();
        let doc = make_doc(&state, "namespace = t\nt.1 = { hidden = yes }\n");
        let whole = Range {
            start: Position { line: 0, character: 0 },
            end: Position { line: 5, character: 0 },
        };
        assert!(code_actions(&doc, whole, &doc.uri).is_empty());
    }
}
