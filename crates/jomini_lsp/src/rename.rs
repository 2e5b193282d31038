//! Symbol rename.
//!
//! Offered only for names the index owns (events, scripted effects/triggers,
//! and friends) and for saved scopes within their document. Edits cover every
//! definition site plus occurrences in open documents; renaming back restores
//! the original text exactly.

use std::collections::HashMap;

use tower_lsp::lsp_types::{Position, Range, TextEdit, Url, WorkspaceEdit};

use crate::definition::NAVIGABLE_KINDS;
use crate::document::DocumentState;
use crate::references::word_occurrences;
use crate::state::ServerState;

/// Rejects names the script grammar cannot express. Returns an error
/// message, or `None` when the name is acceptable.
pub fn validate_new_name(new_name: &str) -> Option<String> {
    if new_name.is_empty() {
        return Some("name cannot be empty".to_string());
    }
    if !new_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':'))
    {
        return Some("name may only contain letters, digits, `_`, `.`, `:`".to_string());
    }
    let first = new_name.chars().next().expect("checked non-empty");
    if !first.is_ascii_alphabetic() && first != '_' {
        return Some("name must start with a letter or underscore".to_string());
    }
    None
}

/// What the cursor's word can be renamed as, if anything.
fn rename_target<'d>(doc: &'d DocumentState, offset: usize, state: &ServerState) -> Option<(&'d str, jomini_base::Span)> {
    let (word, span) = doc.word_at(offset)?;

    // Saved scopes are renameable within their document.
    if word.starts_with("scope:") {
        return Some((word, span));
    }
    if is_saved_scope_definition(doc, span) {
        return Some((word, span));
    }

    let snapshot = state.index.snapshot();
    if NAVIGABLE_KINDS
        .iter()
        .any(|&kind| !snapshot.sites(kind, word).is_empty())
    {
        return Some((word, span));
    }
    None
}

/// True when `span` is the value of a `save_scope_as`-family entry.
fn is_saved_scope_definition(doc: &DocumentState, span: jomini_base::Span) -> bool {
    let Some(ast) = &doc.ast else { return false };
    let path = jomini_language::node_at(&ast.root, span.start);
    matches!(
        path.last().map(|e| e.key.as_str()),
        Some("save_scope_as") | Some("save_temporary_scope_as") | Some("clear_saved_scope")
    )
}

pub fn prepare_rename(
    doc: &DocumentState,
    position: Position,
    state: &ServerState,
) -> Option<(Range, String)> {
    let offset = doc.line_index.offset(position);
    let (word, span) = rename_target(doc, offset, state)?;
    Some((doc.line_index.range(span), word.to_string()))
}

pub fn rename(
    doc: &DocumentState,
    position: Position,
    new_name: String,
    state: &ServerState,
) -> Option<WorkspaceEdit> {
    let offset = doc.line_index.offset(position);
    let (word, _span) = rename_target(doc, offset, state)?;

    // `scope:x` cursors rename the scope name; the replacement keeps the
    // prefix form consistent at every site.
    let (old_plain, new_plain) = match word.strip_prefix("scope:") {
        Some(name) => (
            name.to_string(),
            new_name.strip_prefix("scope:").unwrap_or(&new_name).to_string(),
        ),
        None => (word.to_string(), new_name.clone()),
    };
    if validate_new_name(&new_plain).is_some() {
        return None;
    }

    let is_saved_scope = word.starts_with("scope:")
        || doc
            .word_at(offset)
            .map(|(_, span)| is_saved_scope_definition(doc, span))
            .unwrap_or(false);

    let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();

    if is_saved_scope {
        // Same-document rename: the prefixed reads and the bare definition
        // sites both move.
        let mut edits = Vec::new();
        for span in word_occurrences(&doc.source, &format!("scope:{}", old_plain)) {
            edits.push(TextEdit {
                range: doc.line_index.range(span),
                new_text: format!("scope:{}", new_plain),
            });
        }
        for span in word_occurrences(&doc.source, &old_plain) {
            if is_saved_scope_definition(doc, span) {
                edits.push(TextEdit {
                    range: doc.line_index.range(span),
                    new_text: new_plain.clone(),
                });
            }
        }
        if edits.is_empty() {
            return None;
        }
        changes.insert(doc.uri.clone(), edits);
        return Some(WorkspaceEdit {
            changes: Some(changes),
            ..Default::default()
        });
    }

    // Indexed symbol: definition sites everywhere, occurrences in open docs.
    let snapshot = state.index.snapshot();
    for &kind in NAVIGABLE_KINDS {
        for site in snapshot.sites(kind, word) {
            changes.entry(site.file.clone()).or_default().push(TextEdit {
                range: site.range,
                new_text: new_plain.clone(),
            });
        }
    }
    for entry in state.documents.iter() {
        let open = entry.value();
        for span in word_occurrences(&open.source, word) {
            let range = open.line_index.range(span);
            let edits = changes.entry(open.uri.clone()).or_default();
            if !edits.iter().any(|e| e.range == range) {
                edits.push(TextEdit {
                    range,
                    new_text: new_plain.clone(),
                });
            }
        }
    }

    if changes.is_empty() {
        return None;
    }
    Some(WorkspaceEdit {
        changes: Some(changes),
        ..Default::default()
    })
}
