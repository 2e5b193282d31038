//! Document outline, driven by the schema's `symbols` declaration: top-level
//! declarations (events, decisions, ...) with their structural blocks as
//! children.

use tower_lsp::lsp_types::{DocumentSymbol, SymbolKind as LspSymbolKind};

use jomini_language::{SymbolKind, Value};

use crate::document::DocumentState;

#[allow(deprecated)] // DocumentSymbol.deprecated is required by the type
pub fn document_symbols(doc: &DocumentState) -> Vec<DocumentSymbol> {
    let Some(ast) = &doc.ast else {
        return Vec::new();
    };

    let mut symbols = Vec::new();
    for declared in &doc.declared {
        let Some(entry) = ast
            .root
            .entries
            .iter()
            .find(|e| e.key_span == declared.span)
        else {
            continue;
        };

        let mut children = Vec::new();
        if let Value::Block(block) = &entry.value {
            for child in &block.entries {
                if !matches!(child.value, Value::Block(_)) {
                    continue;
                }
                children.push(DocumentSymbol {
                    name: child.key.clone(),
                    detail: None,
                    kind: child_kind(&child.key),
                    tags: None,
                    deprecated: None,
                    range: doc.line_index.range(child.span),
                    selection_range: doc.line_index.range(child.key_span),
                    children: None,
                });
            }
        }

        symbols.push(DocumentSymbol {
            name: declared.name.clone(),
            detail: declared.detail.clone(),
            kind: top_kind(declared.kind),
            tags: None,
            deprecated: None,
            range: doc.line_index.range(entry.span),
            selection_range: doc.line_index.range(entry.key_span),
            children: if children.is_empty() {
                None
            } else {
                Some(children)
            },
        });
    }
    symbols
}

fn top_kind(kind: SymbolKind) -> LspSymbolKind {
    match kind {
        SymbolKind::Event => LspSymbolKind::EVENT,
        SymbolKind::ScriptedEffect | SymbolKind::ScriptedTrigger => LspSymbolKind::FUNCTION,
        SymbolKind::ScriptValue => LspSymbolKind::CONSTANT,
        SymbolKind::Modifier => LspSymbolKind::PROPERTY,
        SymbolKind::OnAction => LspSymbolKind::INTERFACE,
        SymbolKind::Decision => LspSymbolKind::METHOD,
        SymbolKind::StoryCycle => LspSymbolKind::CLASS,
        SymbolKind::Trait => LspSymbolKind::ENUM_MEMBER,
        SymbolKind::LocalizationKey => LspSymbolKind::STRING,
    }
}

fn child_kind(key: &str) -> LspSymbolKind {
    match key {
        "trigger" | "is_shown" | "is_valid" => LspSymbolKind::BOOLEAN,
        "immediate" | "after" | "effect" => LspSymbolKind::METHOD,
        "option" => LspSymbolKind::ENUM_MEMBER,
        _ => LspSymbolKind::NAMESPACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_doc, make_state};

    #[test]
    fn events_appear_with_structural_children() {
        let state = make_state();
        let source = r#"namespace = t
t.1 = {
    type = character_event
    trigger = { is_alive = yes }
    immediate = { add_gold = 1 }
    option = { name = t.1.a }
}
"#;
        let doc = make_doc(&state, source);
        let symbols = document_symbols(&doc);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "t.1");
        assert_eq!(symbols[0].kind, LspSymbolKind::EVENT);
        assert_eq!(symbols[0].detail.as_deref(), Some("character_event"));
        let children = symbols[0].children.as_ref().unwrap();
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["trigger", "immediate", "option"]);
    }

    #[test]
    fn localization_documents_have_no_outline() {
        let state = make_state();
        let doc = crate::test_support::make_loc_doc(&state, "\u{feff}l_english:\n a.b:0 \"v\"\n");
        assert!(document_symbols(&doc).is_empty());
    }
}
