//! Context-aware completion.
//!
//! The cursor context (role, scope, governing schema, saved scopes) decides
//! what is offered: schema fields and enum values, catalog commands filtered
//! by context, iterator prefixes for the lists the current scope can
//! iterate, saved scopes, and indexed scripted effects/triggers.

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionResponse, Documentation, InsertTextFormat,
    Position,
};

use jomini_language::schema::BlockRole;
use jomini_language::{context_at, SymbolKind};

use crate::document::DocumentState;
use crate::state::ServerState;

pub fn completions(
    doc: &DocumentState,
    position: Position,
    state: &ServerState,
) -> Option<CompletionResponse> {
    let ast = doc.ast.as_ref()?;
    let offset = doc.line_index.offset(position);
    let registry = state.registry();
    let ctx = context_at(&ast.root, offset, &doc.rel_path, &registry, &state.catalog);

    let mut items = Vec::new();

    // Enum values when the cursor sits in a value position of an enum field.
    if let Some(schema) = ctx.schema {
        if let Some(field) = ctx.path.last() {
            if let Some(spec) = schema.field(field) {
                for value in &spec.enum_values {
                    items.push(CompletionItem {
                        label: value.clone(),
                        kind: Some(CompletionItemKind::ENUM_MEMBER),
                        ..Default::default()
                    });
                }
            }
        }

        for (field, _spec) in &schema.fields {
            let docs = schema.field_doc(field);
            items.push(CompletionItem {
                label: field.clone(),
                kind: Some(CompletionItemKind::FIELD),
                detail: docs.map(|d| d.description.clone()),
                insert_text: docs.and_then(|d| d.snippet.clone()),
                insert_text_format: docs
                    .and_then(|d| d.snippet.as_ref())
                    .map(|_| InsertTextFormat::SNIPPET),
                ..Default::default()
            });
        }
    }

    let snapshot = state.index.snapshot();
    match ctx.role {
        BlockRole::Trigger => {
            for def in state.catalog.triggers_for(ctx.scope) {
                items.push(command_item(
                    &def.name,
                    &def.doc,
                    CompletionItemKind::FUNCTION,
                ));
            }
            for name in snapshot.names_of_kind(SymbolKind::ScriptedTrigger) {
                items.push(command_item(name, "scripted trigger", CompletionItemKind::METHOD));
            }
            for list in state.catalog.lists_for(ctx.scope) {
                items.push(iterator_item(&format!("any_{list}")));
            }
        }
        BlockRole::Effect | BlockRole::Mixed => {
            for def in state.catalog.effects_for(ctx.scope) {
                items.push(command_item(
                    &def.name,
                    &def.doc,
                    CompletionItemKind::FUNCTION,
                ));
            }
            for name in snapshot.names_of_kind(SymbolKind::ScriptedEffect) {
                items.push(command_item(name, "scripted effect", CompletionItemKind::METHOD));
            }
            for list in state.catalog.lists_for(ctx.scope) {
                items.push(iterator_item(&format!("every_{list}")));
                items.push(iterator_item(&format!("random_{list}")));
                items.push(iterator_item(&format!("ordered_{list}")));
            }
        }
        BlockRole::Neutral => {}
    }

    // Saved scopes visible at the cursor.
    for saved in ctx.saved.iter() {
        items.push(CompletionItem {
            label: format!("scope:{}", saved.name),
            kind: Some(CompletionItemKind::VARIABLE),
            detail: Some(format!("saved scope ({})", saved.resulting)),
            ..Default::default()
        });
    }

    // Scope links for chain-building in command positions.
    if matches!(ctx.role, BlockRole::Trigger | BlockRole::Effect) {
        for link in state.catalog.links_for(ctx.scope) {
            items.push(CompletionItem {
                label: link.to_string(),
                kind: Some(CompletionItemKind::PROPERTY),
                detail: Some("scope link".to_string()),
                ..Default::default()
            });
        }
    }

    if items.is_empty() {
        return None;
    }
    Some(CompletionResponse::Array(items))
}

fn command_item(name: &str, doc: &str, kind: CompletionItemKind) -> CompletionItem {
    CompletionItem {
        label: name.to_string(),
        kind: Some(kind),
        documentation: if doc.is_empty() {
            None
        } else {
            Some(Documentation::String(doc.to_string()))
        },
        ..Default::default()
    }
}

fn iterator_item(name: &str) -> CompletionItem {
    CompletionItem {
        label: name.to_string(),
        kind: Some(CompletionItemKind::KEYWORD),
        detail: Some("iterator".to_string()),
        insert_text: Some(format!("{name} = {{\n\t$0\n}}")),
        insert_text_format: Some(InsertTextFormat::SNIPPET),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_doc, make_state};

    fn labels(response: Option<CompletionResponse>) -> Vec<String> {
        match response {
            Some(CompletionResponse::Array(items)) => {
                items.into_iter().map(|i| i.label).collect()
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn trigger_block_offers_triggers_not_effects() {
        let state = make_state();
        let source = "namespace = t\nt.1 = {\n    trigger = {\n        \n    }\n}\n";
        let doc = make_doc(&state, source);
        let pos = Position { line: 3, character: 8 };
        let labels = labels(completions(&doc, pos, &state));
        assert!(labels.iter().any(|l| l == "is_alive"), "{:?}", labels.len());
        assert!(!labels.iter().any(|l| l == "add_gold"));
        assert!(labels.iter().any(|l| l == "any_vassal"));
        assert!(!labels.iter().any(|l| l == "every_vassal"));
    }

    #[test]
    fn effect_block_offers_effects_and_iterators() {
        let state = make_state();
        let source = "namespace = t\nt.1 = {\n    immediate = {\n        \n    }\n}\n";
        let doc = make_doc(&state, source);
        let pos = Position { line: 3, character: 8 };
        let labels = labels(completions(&doc, pos, &state));
        assert!(labels.iter().any(|l| l == "add_gold"));
        assert!(labels.iter().any(|l| l == "every_vassal"));
        assert!(!labels.iter().any(|l| l == "is_alive"));
    }

    #[test]
    fn event_body_offers_schema_fields_with_snippets() {
        let state = make_state();
        let source = "namespace = t\nt.1 = {\n    \n}\n";
        let doc = make_doc(&state, source);
        let pos = Position { line: 2, character: 4 };
        let response = completions(&doc, pos, &state);
        let items = match response {
            Some(CompletionResponse::Array(items)) => items,
            _ => panic!("expected items"),
        };
        let type_item = items.iter().find(|i| i.label == "type").expect("type field");
        assert_eq!(type_item.insert_text_format, Some(InsertTextFormat::SNIPPET));
        assert!(type_item.insert_text.as_ref().unwrap().contains("character_event"));
    }

    #[test]
    fn saved_scopes_visible_at_cursor() {
        let state = make_state();
        let source = "namespace = t\nt.1 = {\n    immediate = {\n        save_scope_as = victim\n        \n    }\n}\n";
        let doc = make_doc(&state, source);
        let pos = Position { line: 4, character: 8 };
        let labels = labels(completions(&doc, pos, &state));
        assert!(labels.iter().any(|l| l == "scope:victim"), "saved scope offered");
    }
}
