//! Hover documentation.
//!
//! Resolution order: catalog commands and scope links first, then indexed
//! symbols (events, scripted effects/triggers, localization keys), then the
//! governing schema's field documentation.

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

use jomini_language::{context_at, SymbolKind};

use crate::document::DocumentState;
use crate::state::ServerState;

pub fn hover(doc: &DocumentState, position: Position, state: &ServerState) -> Option<Hover> {
    let offset = doc.line_index.offset(position);
    let (word, span) = doc.word_at(offset)?;
    let range = Some(doc.line_index.range(span));

    let content = hover_markdown(doc, word, offset, state)?;
    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: content,
        }),
        range,
    })
}

fn hover_markdown(
    doc: &DocumentState,
    word: &str,
    offset: usize,
    state: &ServerState,
) -> Option<String> {
    if let Some(def) = state.catalog.effect(word) {
        let scopes = if def.scopes.is_empty() {
            "any scope".to_string()
        } else {
            def.scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        return Some(format!("**{}** — effect ({})\n\n{}", def.name, scopes, def.doc));
    }
    if let Some(def) = state.catalog.trigger(word) {
        let scopes = if def.scopes.is_empty() {
            "any scope".to_string()
        } else {
            def.scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        return Some(format!("**{}** — trigger ({})\n\n{}", def.name, scopes, def.doc));
    }

    let registry = state.registry();
    let ctx = doc.ast.as_ref().map(|ast| {
        context_at(&ast.root, offset, &doc.rel_path, &registry, &state.catalog)
    });

    if let Some(ctx) = &ctx {
        if let Some(target) = state.catalog.link_target(ctx.scope, word) {
            return Some(format!(
                "**{}** — scope link\n\n{} → {}",
                word, ctx.scope, target
            ));
        }
        if let Some(name) = word.strip_prefix("scope:") {
            if let Some(saved) = ctx.saved.get(name.split('.').next().unwrap_or(name)) {
                return Some(format!(
                    "**scope:{}** — saved scope ({}{})",
                    saved.name,
                    saved.resulting,
                    if saved.temporary { ", temporary" } else { "" }
                ));
            }
        }
    }

    let snapshot = state.index.snapshot();
    for kind in [
        SymbolKind::Event,
        SymbolKind::ScriptedEffect,
        SymbolKind::ScriptedTrigger,
        SymbolKind::ScriptValue,
        SymbolKind::Decision,
        SymbolKind::OnAction,
        SymbolKind::StoryCycle,
        SymbolKind::LocalizationKey,
    ] {
        let sites = snapshot.sites(kind, word);
        if let Some(site) = sites.first() {
            let mut text = format!("**{}** — {}", word, kind.as_str().replace('_', " "));
            if let Some(detail) = &site.detail {
                if kind == SymbolKind::LocalizationKey {
                    text.push_str(&format!("\n\n\"{}\"", detail));
                } else {
                    text.push_str(&format!("\n\n{}", detail));
                }
            }
            if sites.len() > 1 {
                text.push_str(&format!("\n\n{} definitions", sites.len()));
            }
            return Some(text);
        }
    }

    if state.catalog.has_trait(word) {
        return Some(format!("**{}** — trait", word));
    }

    if let Some(ctx) = &ctx {
        if let Some(schema) = ctx.schema {
            if let Some(field_doc) = schema.field_doc(word) {
                if !field_doc.description.is_empty() {
                    return Some(format!("**{}**\n\n{}", word, field_doc.description));
                }
            }
        }
    }

    None
}
