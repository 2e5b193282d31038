//! File-type-agnostic invariants: command/context agreement, iterator
//! semantics, control-structure shape, event guardrails, and the scope-timing
//! rule.
//!
//! Each check reads a [`RuleContext`] carrying the phase, role, and scope the
//! traversal computed for the block. The checker itself is stateless across
//! documents; everything threaded lives in the context.

use jomini_base::{codes, Diagnostic, Span};

use crate::ast::{Block, Entry, Value};
use crate::catalog::{Catalog, ScopeType};
use crate::schema::{BlockRole, DuplicatePolicy, Required, Schema};
use crate::scope_engine::{
    iterator_kind, iterator_list_name, looks_like_chain, ChainErrorKind, IteratorKind, Phase,
    SavedScopes, ScopeEngine, VarTable,
};
use crate::symbols::{SymbolKind, SymbolLookup};

/// Everything a rule may consult about the block being visited.
pub struct RuleContext<'w> {
    pub role: BlockRole,
    pub phase: Option<Phase>,
    pub scope: ScopeType,
    pub root_scope: ScopeType,
    pub saved: &'w SavedScopes,
    pub vars: &'w VarTable,
    /// Key of the entry whose value this block is, when it has one.
    pub block_key: Option<&'w str>,
    /// True for the body of a top-level event declaration.
    pub is_event_root: bool,
    pub schema: Option<&'w Schema>,
}

/// Triggers commonly pasted into effect blocks by mistake. Only these draw
/// the trigger-in-effect report; most trigger names double as parameters
/// somewhere and a blanket rule would drown users in noise.
const CONFUSABLE_TRIGGERS: &[&str] = &["has_trait", "is_alive", "exists", "age", "gold", "is_adult"];

/// Parameter keys that belong to the enclosing command, not to the command
/// namespace itself.
const PARAM_KEYS: &[&str] = &[
    "limit", "alternative_limit", "filter", "order_by", "position", "min", "max", "check_range",
    "percent", "count", "weight", "chance", "base", "factor", "add", "multiply", "subtract",
    "divide", "value", "desc", "text", "custom", "name", "target", "title", "who", "opinion",
    "modifier", "days", "weeks", "months", "years", "duration", "reason", "skill", "trait",
    "amount", "type", "tier", "level", "id", "death_reason", "killer", "show_chance", "fallback",
    "offset", "scale", "animation", "character", "outfit_tags", "camera", "hide_info",
];

/// `true` for keys that are parameters of their enclosing command rather
/// than commands themselves.
pub fn is_param_key(key: &str) -> bool {
    PARAM_KEYS.contains(&key)
}

pub struct GenericRules<'a> {
    catalog: &'a Catalog,
    symbols: &'a dyn SymbolLookup,
    engine: ScopeEngine<'a>,
}

impl<'a> GenericRules<'a> {
    pub fn new(catalog: &'a Catalog, symbols: &'a dyn SymbolLookup) -> Self {
        GenericRules {
            catalog,
            symbols,
            engine: ScopeEngine::new(catalog),
        }
    }

    pub fn visit_block(&self, block: &Block, ctx: &RuleContext, out: &mut Vec<Diagnostic>) {
        if ctx.is_event_root {
            self.event_structure(block, ctx, out);
        }
        self.control_structure(block, out);
        for entry in &block.entries {
            self.visit_entry(entry, ctx, out);
        }
    }

    fn visit_entry(&self, entry: &Entry, ctx: &RuleContext, out: &mut Vec<Diagnostic>) {
        let key = entry.key.as_str();

        self.scope_timing(entry, ctx, out);

        if ctx.is_event_root && key == "theme" {
            if let Some(theme) = entry.scalar_text() {
                if !self.catalog.has_theme(theme) {
                    out.push(Diagnostic::warning(
                        codes::UNKNOWN_THEME,
                        entry.value.span(),
                        format!("`{}` is not a known event theme", theme),
                    ));
                }
            }
        }

        if key == "animation" {
            if let Some(animation) = entry.scalar_text() {
                if !self.catalog.has_animation(animation) {
                    out.push(Diagnostic::warning(
                        codes::UNKNOWN_ANIMATION,
                        entry.value.span(),
                        format!("`{}` is not a known portrait animation", animation),
                    ));
                }
            }
        }

        // A field the governing schema declares is the validator's business;
        // judging it as a command would misread names like `random_events`.
        if ctx.schema.is_some_and(|s| s.field(key).is_some()) {
            return;
        }

        if let Some(kind) = iterator_kind(key) {
            self.iterator_checks(entry, kind, ctx, out);
            return;
        }

        if looks_like_chain(key) {
            if entry.has_operator
                && matches!(ctx.role, BlockRole::Trigger | BlockRole::Effect)
            {
                self.chain_check(key, entry.key_span, ctx, out);
                self.direct_scope_comparison(entry, ctx, out);
            }
            return;
        }

        // A bare identifier key can also be a single-segment scope link, as
        // long as no command claims the name first.
        if matches!(ctx.role, BlockRole::Trigger | BlockRole::Effect)
            && entry.has_operator
            && !self.catalog.is_trigger(key)
            && !self.catalog.is_effect(key)
            && self.catalog.link_exists(key)
        {
            self.chain_check(key, entry.key_span, ctx, out);
            return;
        }

        if key == "always" {
            self.always_check(entry, ctx, out);
            return;
        }

        if key == "add_opinion" {
            self.opinion_inline_value(entry, out);
        }

        self.command_check(entry, ctx, out);
    }

    /// Unknown-command and command/context classification for plain keys.
    fn command_check(&self, entry: &Entry, ctx: &RuleContext, out: &mut Vec<Diagnostic>) {
        let key = entry.key.as_str();
        if PARAM_KEYS.contains(&key)
            || !entry.has_operator
            || key.chars().next().is_some_and(|c| c.is_ascii_digit())
            // `$ARG$` substitution targets are opaque until instantiation.
            || key.contains('$')
        {
            return;
        }

        match ctx.role {
            BlockRole::Trigger => {
                if let Some(def) = self.catalog.trigger(key) {
                    if !def.valid_in(ctx.scope) {
                        out.push(Diagnostic::warning(
                            codes::TRIGGER_WRONG_SCOPE,
                            entry.key_span,
                            format!(
                                "`{}` is not a valid trigger in {} scope",
                                key, ctx.scope
                            ),
                        ));
                    }
                } else if self.catalog.is_effect(key) {
                    out.push(Diagnostic::error(
                        codes::EFFECT_IN_TRIGGER,
                        entry.key_span,
                        format!("`{}` is an effect and cannot be used in a trigger block", key),
                    ));
                } else if !self.symbols.contains(SymbolKind::ScriptedTrigger, key) {
                    let mut diagnostic = Diagnostic::warning(
                        codes::UNKNOWN_TRIGGER,
                        entry.key_span,
                        format!("`{}` is not a known trigger", key),
                    );
                    if let Some(suggestion) = self.symbols.suggest(SymbolKind::ScriptedTrigger, key)
                    {
                        diagnostic.message =
                            format!("`{}` is not a known trigger; did you mean `{}`?", key, suggestion);
                    }
                    out.push(diagnostic);
                }
            }
            BlockRole::Effect => {
                if let Some(def) = self.catalog.effect(key) {
                    if !def.valid_in(ctx.scope) {
                        out.push(Diagnostic::warning(
                            codes::EFFECT_WRONG_SCOPE,
                            entry.key_span,
                            format!("`{}` is not a valid effect in {} scope", key, ctx.scope),
                        ));
                    }
                } else if self.catalog.is_trigger(key) {
                    if CONFUSABLE_TRIGGERS.contains(&key) {
                        out.push(Diagnostic::error(
                            codes::TRIGGER_IN_EFFECT,
                            entry.key_span,
                            format!(
                                "`{}` is a trigger and cannot be used in an effect block",
                                key
                            ),
                        ));
                    }
                } else if !self.symbols.contains(SymbolKind::ScriptedEffect, key) {
                    let mut diagnostic = Diagnostic::warning(
                        codes::UNKNOWN_EFFECT,
                        entry.key_span,
                        format!("`{}` is not a known effect", key),
                    );
                    if let Some(suggestion) = self.symbols.suggest(SymbolKind::ScriptedEffect, key) {
                        diagnostic.message =
                            format!("`{}` is not a known effect; did you mean `{}`?", key, suggestion);
                    }
                    out.push(diagnostic);
                }
            }
            BlockRole::Neutral | BlockRole::Mixed => {}
        }
    }

    fn chain_check(&self, chain: &str, span: Span, ctx: &RuleContext, out: &mut Vec<Diagnostic>) {
        if let Err(err) = self.engine.resolve(chain, span, ctx.scope, ctx.root_scope, ctx.saved) {
            match err.kind {
                ChainErrorKind::UnknownLink => out.push(Diagnostic::error(
                    codes::UNKNOWN_SCOPE_LINK,
                    err.span,
                    format!("`{}` is not a known scope link", err.segment),
                )),
                ChainErrorKind::LinkNotValidForScope => out.push(Diagnostic::error(
                    codes::LINK_NOT_VALID_FOR_SCOPE,
                    err.span,
                    format!(
                        "`{}` cannot be reached from {} scope",
                        err.segment, err.current
                    ),
                )),
                // The scope may be saved by a calling event; a definite
                // absence is only claimed for the timing rule.
                ChainErrorKind::UndefinedSavedScope => out.push(Diagnostic::warning(
                    codes::UNDEFINED_SAVED_SCOPE,
                    err.span,
                    format!("`{}` does not name a saved scope", err.segment),
                )),
            }
        }
    }

    /// The Golden Rule: a `scope:`/`var:` read in an early phase must not
    /// depend on a definition that first happens in a later phase of the
    /// same event.
    fn scope_timing(&self, entry: &Entry, ctx: &RuleContext, out: &mut Vec<Diagnostic>) {
        let Some(phase) = ctx.phase else { return };
        let code = match phase {
            Phase::Trigger => codes::SCOPE_TIMING_TRIGGER,
            Phase::Desc => codes::SCOPE_TIMING_DESC,
            Phase::Portrait => codes::SCOPE_TIMING_PORTRAIT,
            Phase::Immediate | Phase::Option => return,
        };

        let mut check_text = |text: &str, span: Span| {
            if let Some(name) = scope_ref_name(text) {
                if ctx.saved.get(name).is_some() && !ctx.saved.is_available(name, phase) {
                    let ref_span = Span::new(span.start, span.start + "scope:".len() + name.len());
                    out.push(Diagnostic::error(
                        code,
                        ref_span,
                        format!(
                            "`scope:{}` is read in phase {} but only defined in a later phase",
                            name,
                            phase.number()
                        ),
                    ));
                }
            }
            if let Some(name) = text.strip_prefix("var:") {
                if ctx.vars.contains(name) && !ctx.vars.is_available(name, phase) {
                    out.push(Diagnostic::error(
                        codes::VARIABLE_TIMING,
                        span,
                        format!(
                            "`var:{}` is read in phase {} but only set in a later phase",
                            name,
                            phase.number()
                        ),
                    ));
                }
            }
        };

        check_text(&entry.key, entry.key_span);
        if let Value::Scalar(scalar) = &entry.value {
            if entry.has_operator {
                check_text(&scalar.text, scalar.span);
            }
        }
    }

    fn iterator_checks(
        &self,
        entry: &Entry,
        kind: IteratorKind,
        ctx: &RuleContext,
        out: &mut Vec<Diagnostic>,
    ) {
        let key = entry.key.as_str();
        let list = iterator_list_name(key).expect("caller classified as iterator");

        let list_ok = match self.catalog.list_target(ctx.scope, list) {
            Some(_) => true,
            None => {
                if ctx.scope == ScopeType::Unknown && self.catalog.list_exists(list) {
                    true
                } else {
                    out.push(Diagnostic::error(
                        codes::ITERATOR_INVALID_LIST,
                        entry.span,
                        if self.catalog.list_exists(list) {
                            format!("`{}` cannot be iterated from {} scope", list, ctx.scope)
                        } else {
                            format!("`{}` is not an iterable list", list)
                        },
                    ));
                    false
                }
            }
        };

        match (kind, ctx.role) {
            (IteratorKind::Any, BlockRole::Effect) => {
                out.push(Diagnostic::error(
                    codes::ITERATOR_WRONG_CONTEXT,
                    entry.key_span,
                    format!("`{}` is a trigger iterator; use `every_{}` in effects", key, list),
                ));
            }
            (IteratorKind::Every | IteratorKind::Random | IteratorKind::Ordered, BlockRole::Trigger) => {
                out.push(Diagnostic::error(
                    codes::ITERATOR_WRONG_CONTEXT,
                    entry.key_span,
                    format!("`{}` is an effect iterator; use `any_{}` in triggers", key, list),
                ));
            }
            _ => {}
        }

        if !list_ok || ctx.role != BlockRole::Effect {
            return;
        }
        let has_limit = entry
            .block()
            .map(|b| b.contains_key("limit"))
            .unwrap_or(false);
        if !has_limit {
            match kind {
                IteratorKind::Random => out.push(Diagnostic::warning(
                    codes::RANDOM_WITHOUT_LIMIT,
                    entry.key_span,
                    format!("`{}` without a `limit` picks from every element", key),
                )),
                IteratorKind::Every => out.push(Diagnostic::info(
                    codes::EVERY_WITHOUT_LIMIT,
                    entry.key_span,
                    format!("`{}` without a `limit` touches every element", key),
                )),
                _ => {}
            }
        }
    }

    fn always_check(&self, entry: &Entry, ctx: &RuleContext, out: &mut Vec<Diagnostic>) {
        if ctx.block_key != Some("trigger") {
            return;
        }
        match entry.scalar_text() {
            Some("yes") => out.push(Diagnostic::info(
                codes::REDUNDANT_ALWAYS_YES,
                entry.span,
                "`always = yes` in a trigger is redundant",
            )),
            Some("no") => out.push(Diagnostic::warning(
                codes::IMPOSSIBLE_ALWAYS_NO,
                entry.span,
                "`always = no` means this can never fire",
            )),
            _ => {}
        }
    }

    fn control_structure(&self, block: &Block, out: &mut Vec<Diagnostic>) {
        let mut if_open = false;
        let mut else_count = 0usize;
        for entry in &block.entries {
            match entry.key.as_str() {
                "trigger_if" => {
                    if_open = true;
                    else_count = 0;
                    let has_limit = entry
                        .block()
                        .map(|b| b.contains_key("limit"))
                        .unwrap_or(false);
                    if !has_limit {
                        out.push(Diagnostic::error(
                            codes::TRIGGER_IF_WITHOUT_LIMIT,
                            entry.key_span,
                            "`trigger_if` needs a `limit` to test",
                        ));
                    }
                }
                "trigger_else_if" => {
                    if !if_open {
                        out.push(Diagnostic::error(
                            codes::TRIGGER_ELSE_WITHOUT_IF,
                            entry.key_span,
                            "`trigger_else_if` has no preceding `trigger_if`",
                        ));
                    }
                }
                "trigger_else" => {
                    if !if_open {
                        out.push(Diagnostic::error(
                            codes::TRIGGER_ELSE_WITHOUT_IF,
                            entry.key_span,
                            "`trigger_else` has no preceding `trigger_if`",
                        ));
                    } else {
                        else_count += 1;
                        if else_count >= 2 {
                            out.push(Diagnostic::warning(
                                codes::MULTIPLE_TRIGGER_ELSE,
                                entry.key_span,
                                "only the first `trigger_else` of a chain runs",
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn opinion_inline_value(&self, entry: &Entry, out: &mut Vec<Diagnostic>) {
        let Some(block) = entry.block() else { return };
        let numeric_opinion = block
            .get("opinion")
            .and_then(|e| e.value.as_scalar())
            .and_then(|s| s.as_number())
            .is_some();
        if numeric_opinion && !block.contains_key("modifier") {
            let opinion_entry = block.get("opinion").expect("checked");
            out.push(Diagnostic::error(
                codes::OPINION_INLINE_VALUE,
                opinion_entry.span,
                "`add_opinion` takes a named `modifier`; the opinion value comes from its definition",
            ));
        }
    }

    fn direct_scope_comparison(&self, entry: &Entry, ctx: &RuleContext, out: &mut Vec<Diagnostic>) {
        if ctx.role != BlockRole::Trigger {
            return;
        }
        let key_is_scope = entry.key.starts_with("scope:");
        let value_is_scope = entry
            .scalar_text()
            .map(|t| t.starts_with("scope:"))
            .unwrap_or(false);
        if key_is_scope && value_is_scope && !entry.key.contains('.') {
            let value = entry.scalar_text().expect("checked");
            out.push(
                Diagnostic::error(
                    codes::DIRECT_SCOPE_COMPARISON,
                    entry.span,
                    format!(
                        "characters cannot be compared directly; use `{} = {{ this = {} }}`",
                        entry.key, value
                    ),
                )
                .with_fix(
                    "Wrap in a `this` comparison",
                    entry.span,
                    format!("{} = {{ this = {} }}", entry.key, value),
                ),
            );
        }
    }

    /// Event-body guardrails. Duplicate immediate/after is left to the schema
    /// when its duplicate policy already forbids them.
    fn event_structure(&self, block: &Block, ctx: &RuleContext, out: &mut Vec<Diagnostic>) {
        for field in ["immediate", "after"] {
            let schema_forbids = ctx
                .schema
                .and_then(|s| s.field(field))
                .map(|spec| spec.duplicate == DuplicatePolicy::Forbidden)
                .unwrap_or(false);
            if schema_forbids {
                continue;
            }
            let code = if field == "immediate" {
                codes::MULTIPLE_IMMEDIATE
            } else {
                codes::MULTIPLE_AFTER
            };
            for entry in block.get_all(field).skip(1) {
                out.push(Diagnostic::error(
                    code,
                    entry.key_span,
                    format!("only the first `{}` block executes", field),
                ));
            }
        }

        let hidden = block
            .get("hidden")
            .and_then(|e| e.scalar_text())
            .map(|t| t == "yes")
            .unwrap_or(false);

        if hidden {
            if let Some(option) = block.get("option") {
                out.push(Diagnostic::warning(
                    codes::HIDDEN_EVENT_WITH_OPTIONS,
                    option.key_span,
                    "a hidden event never shows its options",
                ));
            }
        } else if !block.contains_key("desc") {
            let schema_requires_desc = ctx
                .schema
                .and_then(|s| s.field("desc"))
                .map(|spec| !matches!(spec.required, Required::Never))
                .unwrap_or(false);
            if !schema_requires_desc {
                out.push(Diagnostic::warning(
                    codes::EVENT_WITHOUT_DESC,
                    block.span,
                    "a visible event without `desc` shows empty text",
                ));
            }
        }
    }
}

/// `scope:name` or `scope:name.rest` → `name`.
fn scope_ref_name(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("scope:")?;
    let name = rest.split('.').next().unwrap_or(rest);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
