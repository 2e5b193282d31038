//! Symbol kinds and the lookup seam between validation and the workspace
//! index.
//!
//! Validation phases never talk to the index directly; they go through
//! [`SymbolLookup`], which the server implements over its index snapshot.
//! That keeps the analysis crates testable with a plain map.

use std::collections::{HashMap, HashSet};

use jomini_base::Span;

/// Kinds of workspace-indexed symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Event,
    ScriptedEffect,
    ScriptedTrigger,
    ScriptValue,
    Modifier,
    OnAction,
    Decision,
    StoryCycle,
    Trait,
    LocalizationKey,
}

impl SymbolKind {
    /// Resolves the `symbols: kind:` name used in schema files.
    pub fn from_decl_name(name: &str) -> Option<SymbolKind> {
        Some(match name {
            "event" => SymbolKind::Event,
            "scripted_effect" => SymbolKind::ScriptedEffect,
            "scripted_trigger" => SymbolKind::ScriptedTrigger,
            "script_value" => SymbolKind::ScriptValue,
            "modifier" => SymbolKind::Modifier,
            "on_action" => SymbolKind::OnAction,
            "decision" => SymbolKind::Decision,
            "story_cycle" => SymbolKind::StoryCycle,
            "trait" => SymbolKind::Trait,
            "localization_key" => SymbolKind::LocalizationKey,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Event => "event",
            SymbolKind::ScriptedEffect => "scripted_effect",
            SymbolKind::ScriptedTrigger => "scripted_trigger",
            SymbolKind::ScriptValue => "script_value",
            SymbolKind::Modifier => "modifier",
            SymbolKind::OnAction => "on_action",
            SymbolKind::Decision => "decision",
            SymbolKind::StoryCycle => "story_cycle",
            SymbolKind::Trait => "trait",
            SymbolKind::LocalizationKey => "localization_key",
        }
    }
}

/// A symbol declared by the document under analysis, reported back to the
/// indexer through the analysis outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredSymbol {
    pub kind: SymbolKind,
    pub name: String,
    /// Span of the declaring key.
    pub span: Span,
    pub detail: Option<String>,
}

/// Read access to workspace symbols during validation.
pub trait SymbolLookup {
    /// Is any definition of `(kind, name)` known?
    fn contains(&self, kind: SymbolKind, name: &str) -> bool;

    /// Closest known name of the same kind within the caller's edit-distance
    /// policy, for "did you mean" hints. `None` when nothing is close.
    fn suggest(&self, kind: SymbolKind, name: &str) -> Option<String>;
}

/// The empty lookup: nothing is known, nothing is suggested. Used when a
/// document is analyzed before the first workspace scan completes.
pub struct NoSymbols;

impl SymbolLookup for NoSymbols {
    fn contains(&self, _kind: SymbolKind, _name: &str) -> bool {
        false
    }

    fn suggest(&self, _kind: SymbolKind, _name: &str) -> Option<String> {
        None
    }
}

/// Map-backed lookup for tests and single-document tools.
#[derive(Default)]
pub struct MapSymbols {
    entries: HashMap<SymbolKind, HashSet<String>>,
}

impl MapSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: SymbolKind, name: impl Into<String>) {
        self.entries.entry(kind).or_default().insert(name.into());
    }
}

impl SymbolLookup for MapSymbols {
    fn contains(&self, kind: SymbolKind, name: &str) -> bool {
        self.entries
            .get(&kind)
            .map(|set| set.contains(name))
            .unwrap_or(false)
    }

    fn suggest(&self, _kind: SymbolKind, _name: &str) -> Option<String> {
        None
    }
}
