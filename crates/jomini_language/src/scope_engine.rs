//! Scope-chain resolution, saved scopes, and evaluation phases.
//!
//! A scope chain is a dotted scalar (`liege.primary_title.holder`) navigated
//! over the catalog's link tables. `root`/`this`/`prev`/`from` are universals
//! resolved from the traversal context; `scope:name` reads the saved-scope
//! table. When the engine cannot decide (a `from` without caller context, a
//! `var:` value), it resolves to [`ScopeType::Unknown`] and downstream checks
//! pass vacuously — reporting nothing beats guessing.

use std::collections::HashMap;

use jomini_base::Span;

use crate::ast::{Block, Value};
use crate::catalog::{Catalog, ScopeType};

/// Event evaluation phases, in engine order. The scope-timing rule compares
/// these: a `scope:` read in phase 1 must not depend on a definition that
/// first happens in phase 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// `trigger`, `is_shown`, `is_valid`, nested `limit`s.
    Trigger = 1,
    /// `desc` including `first_valid`/`random_valid`/`triggered_desc`.
    Desc = 2,
    Immediate = 3,
    /// Portrait position blocks.
    Portrait = 4,
    /// `option` bodies and `after`.
    Option = 5,
}

impl Phase {
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Phase of a top-level event field, if it belongs to one.
    pub fn of_event_field(field: &str) -> Option<Phase> {
        Some(match field {
            "trigger" | "is_shown" | "is_valid" | "is_valid_showing_failures_only" => {
                Phase::Trigger
            }
            "desc" => Phase::Desc,
            "immediate" => Phase::Immediate,
            "left_portrait" | "right_portrait" | "center_portrait" | "lower_left_portrait"
            | "lower_center_portrait" | "lower_right_portrait" => Phase::Portrait,
            "option" | "after" => Phase::Option,
            _ => return None,
        })
    }
}

/// One saved-scope definition site.
#[derive(Debug, Clone)]
pub struct SavedScope {
    pub name: String,
    pub span: Span,
    /// Phase of the defining block; `None` when defined outside an event
    /// structure (scripted effects).
    pub phase: Option<Phase>,
    pub temporary: bool,
    pub resulting: ScopeType,
}

/// Saved scopes visible within one event evaluation. When a name is defined
/// more than once, the earliest-phase definition is kept: the timing check
/// asks "is it defined by then along *any* path", so earlier is what matters.
#[derive(Debug, Default)]
pub struct SavedScopes {
    map: HashMap<String, SavedScope>,
}

impl SavedScopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, scope: SavedScope) {
        match self.map.get(&scope.name) {
            Some(existing)
                if phase_rank(existing.phase) <= phase_rank(scope.phase) => {}
            _ => {
                self.map.insert(scope.name.clone(), scope);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&SavedScope> {
        self.map.get(name)
    }

    /// `true` when `name` has a definition in a phase at or before `at`.
    pub fn is_available(&self, name: &str, at: Phase) -> bool {
        match self.map.get(name) {
            Some(scope) => phase_rank(scope.phase) <= at.number(),
            None => false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SavedScope> {
        self.map.values()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn phase_rank(phase: Option<Phase>) -> u8 {
    // No phase means "defined before any event phase" (external context).
    phase.map(Phase::number).unwrap_or(0)
}

/// Variable definitions (`set_variable`) tracked for the variable flavor of
/// the timing rule.
#[derive(Debug, Default)]
pub struct VarTable {
    map: HashMap<String, Option<Phase>>,
}

impl VarTable {
    pub fn define(&mut self, name: &str, phase: Option<Phase>) {
        match self.map.get(name) {
            Some(existing) if phase_rank(*existing) <= phase_rank(phase) => {}
            _ => {
                self.map.insert(name.to_string(), phase);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn is_available(&self, name: &str, at: Phase) -> bool {
        match self.map.get(name) {
            Some(phase) => phase_rank(*phase) <= at.number(),
            None => false,
        }
    }

    pub fn earliest_phase(&self, name: &str) -> Option<Option<Phase>> {
        self.map.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainErrorKind {
    UnknownLink,
    LinkNotValidForScope,
    UndefinedSavedScope,
}

/// A failed chain resolution: which segment, where, and why.
#[derive(Debug, Clone)]
pub struct ChainError {
    pub kind: ChainErrorKind,
    pub segment: String,
    pub span: Span,
    /// Scope type the offending segment was applied to.
    pub current: ScopeType,
}

/// Absolute prefixes that jump to a named object of a fixed type.
fn absolute_prefix(segment: &str) -> Option<ScopeType> {
    let (prefix, rest) = segment.split_once(':')?;
    if rest.is_empty() {
        return None;
    }
    Some(match prefix {
        "character" => ScopeType::Character,
        "title" => ScopeType::LandedTitle,
        "province" => ScopeType::Province,
        "faith" => ScopeType::Faith,
        "religion" => ScopeType::Faith,
        "culture" => ScopeType::Culture,
        "dynasty" => ScopeType::Dynasty,
        "house" => ScopeType::DynastyHouse,
        "flag" => ScopeType::Flag,
        _ => return None,
    })
}

pub struct ScopeEngine<'c> {
    catalog: &'c Catalog,
}

impl<'c> ScopeEngine<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        ScopeEngine { catalog }
    }

    /// Resolves `chain` starting from `current`. `span` must cover the chain
    /// text so segment spans can be derived by offset.
    pub fn resolve(
        &self,
        chain: &str,
        span: Span,
        current: ScopeType,
        root: ScopeType,
        saved: &SavedScopes,
    ) -> Result<ScopeType, ChainError> {
        let mut scope = current;
        let mut offset = 0usize;
        for segment in chain.split('.') {
            let seg_span = Span::new(span.start + offset, span.start + offset + segment.len());
            scope = self.resolve_segment(segment, seg_span, scope, root, saved)?;
            offset += segment.len() + 1;
        }
        Ok(scope)
    }

    fn resolve_segment(
        &self,
        segment: &str,
        span: Span,
        current: ScopeType,
        root: ScopeType,
        saved: &SavedScopes,
    ) -> Result<ScopeType, ChainError> {
        match segment {
            "root" => return Ok(root),
            "this" => return Ok(current),
            // One transition back, or caller context: not tracked through
            // arbitrary chains, so they pass as unknown rather than guess.
            "prev" | "prevprev" | "from" | "fromfrom" | "fromfromfrom" => {
                return Ok(ScopeType::Unknown)
            }
            _ => {}
        }

        if let Some(name) = segment.strip_prefix("scope:") {
            return match saved.get(name) {
                Some(scope) => Ok(scope.resulting),
                None => Err(ChainError {
                    kind: ChainErrorKind::UndefinedSavedScope,
                    segment: segment.to_string(),
                    span,
                    current,
                }),
            };
        }

        if segment.starts_with("var:")
            || segment.starts_with("local_var:")
            || segment.starts_with("global_var:")
        {
            return Ok(ScopeType::Unknown);
        }

        if let Some(target) = absolute_prefix(segment) {
            return Ok(target);
        }

        if current == ScopeType::Unknown {
            return Ok(ScopeType::Unknown);
        }

        match self.catalog.link_target(current, segment) {
            Some(target) => Ok(target),
            None => {
                let kind = if self.catalog.link_exists(segment) {
                    ChainErrorKind::LinkNotValidForScope
                } else {
                    ChainErrorKind::UnknownLink
                };
                Err(ChainError {
                    kind,
                    segment: segment.to_string(),
                    span,
                    current,
                })
            }
        }
    }

    /// Scope change caused by entering a block with this key, if any:
    /// iterator bodies bind the list element, chain keys bind the chain
    /// result. `None` means the key does not change scope.
    pub fn scope_for_key(
        &self,
        key: &str,
        current: ScopeType,
        root: ScopeType,
        saved: &SavedScopes,
    ) -> Option<ScopeType> {
        if let Some(list) = iterator_list_name(key) {
            return match self.catalog.list_target(current, list) {
                Some(target) => Some(target),
                None => Some(ScopeType::Unknown),
            };
        }
        // Single-segment links (`liege = { ... }`) navigate too.
        if let Some(target) = self.catalog.link_target(current, key) {
            return Some(target);
        }
        if looks_like_chain(key) {
            return Some(
                self.resolve(key, Span::default(), current, root, saved)
                    .unwrap_or(ScopeType::Unknown),
            );
        }
        None
    }

    /// Collects saved scopes and variables defined anywhere in an event
    /// block, tagged with their phase. This is the flow-insensitive prepass
    /// behind the timing rule: a definition behind an unevaluated branch
    /// still counts as defined.
    pub fn collect_event_definitions(
        &self,
        event: &Block,
        root: ScopeType,
    ) -> (SavedScopes, VarTable) {
        let mut saved = SavedScopes::new();
        let mut vars = VarTable::default();
        for entry in &event.entries {
            let phase = Phase::of_event_field(&entry.key);
            if let Value::Block(block) = &entry.value {
                self.collect_in_block(block, root, root, phase, &mut saved, &mut vars);
            }
        }
        (saved, vars)
    }

    fn collect_in_block(
        &self,
        block: &Block,
        current: ScopeType,
        root: ScopeType,
        phase: Option<Phase>,
        saved: &mut SavedScopes,
        vars: &mut VarTable,
    ) {
        for entry in &block.entries {
            match entry.key.as_str() {
                "save_scope_as" | "save_temporary_scope_as" => {
                    if let Some(name) = entry.scalar_text() {
                        saved.define(SavedScope {
                            name: name.to_string(),
                            span: entry.span,
                            phase,
                            temporary: entry.key == "save_temporary_scope_as",
                            resulting: current,
                        });
                    }
                    continue;
                }
                "set_variable" | "set_local_variable" | "set_global_variable" => {
                    let name = match &entry.value {
                        Value::Scalar(s) => Some(s.text.clone()),
                        Value::Block(b) => b.scalar_of("name").map(str::to_string),
                        Value::List(_) => None,
                    };
                    if let Some(name) = name {
                        vars.define(&name, phase);
                    }
                    continue;
                }
                _ => {}
            }
            if let Value::Block(inner) = &entry.value {
                let next = self
                    .scope_for_key(&entry.key, current, root, saved)
                    .unwrap_or(current);
                self.collect_in_block(inner, next, root, phase, saved, vars);
            }
        }
    }
}

/// `any_vassal` → `vassal`, for all four iterator families.
pub fn iterator_list_name(key: &str) -> Option<&str> {
    for prefix in ["any_", "every_", "random_", "ordered_"] {
        if let Some(rest) = key.strip_prefix(prefix) {
            if !rest.is_empty() {
                return Some(rest);
            }
        }
    }
    None
}

/// Iterator family of a key, if it is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorKind {
    Any,
    Every,
    Random,
    Ordered,
}

pub fn iterator_kind(key: &str) -> Option<IteratorKind> {
    if key.starts_with("any_") {
        Some(IteratorKind::Any)
    } else if key.starts_with("every_") {
        Some(IteratorKind::Every)
    } else if key.starts_with("random_") && key != "random_list" && key != "random_valid" {
        Some(IteratorKind::Random)
    } else if key.starts_with("ordered_") {
        Some(IteratorKind::Ordered)
    } else {
        None
    }
}

/// Heuristic for "this key navigates scope": universals, prefixes, or a
/// dotted chain.
pub fn looks_like_chain(key: &str) -> bool {
    matches!(
        key,
        "root" | "this" | "prev" | "prevprev" | "from" | "fromfrom" | "fromfromfrom"
    ) || key.contains('.')
        || key.contains(':')
}
