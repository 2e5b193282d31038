//! The schema-driven validator.
//!
//! Given a block and its governing [`Schema`], checks run in a fixed order
//! (required fields, cross-field rules, type/enum/pattern, duplicate policy,
//! field ordering, ranges) so output is deterministic before the final stable
//! sort. Traversal, role/scope/phase threading, and recursion into nested
//! schemas live in [`crate::analysis`]; this module judges one block at a
//! time and never mutates the AST.

use jomini_base::{codes, Diagnostic, Span};

use crate::ast::{Block, Entry, Value};
use crate::schema::{
    CrossRule, DuplicatePolicy, FieldSpec, Required, Schema, SchemaRegistry, TypeSpec,
};
use crate::symbols::{SymbolKind, SymbolLookup};

pub struct SchemaValidator<'a> {
    registry: &'a SchemaRegistry,
    symbols: &'a dyn SymbolLookup,
    /// Style checks (field ordering) are opt-out.
    pub style_checks: bool,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(registry: &'a SchemaRegistry, symbols: &'a dyn SymbolLookup) -> Self {
        SchemaValidator {
            registry,
            symbols,
            style_checks: true,
        }
    }

    /// Runs every per-block check of `schema` against `block`. `anchor` is
    /// the span block-level findings attach to (the declaring entry's key).
    pub fn visit_block(
        &self,
        block: &Block,
        schema: &Schema,
        anchor: Span,
        out: &mut Vec<Diagnostic>,
    ) {
        self.check_required(block, schema, anchor, out);
        self.check_rules(block, schema, anchor, out);
        for entry in &block.entries {
            if let Some(spec) = schema.field(&entry.key) {
                self.check_entry(entry, spec, out);
            } else if schema.strict {
                out.push(Diagnostic::warning(
                    codes::SCHEMA_UNKNOWN_FIELD,
                    entry.key_span,
                    format!("`{}` is not a known field here", entry.key),
                ));
            }
        }
        self.check_duplicates(block, schema, out);
        if self.style_checks {
            self.check_field_order(block, schema, out);
        }
    }

    /// Root-level fields of a matched file (`namespace = ...`).
    pub fn visit_root_scalars(&self, root: &Block, schema: &Schema, out: &mut Vec<Diagnostic>) {
        for entry in &root.entries {
            if matches!(entry.value, Value::Block(_)) {
                continue;
            }
            if let Some(spec) = schema.root_field(&entry.key) {
                self.check_entry(entry, spec, out);
            }
        }
        for (field, spec) in &schema.root_fields {
            if matches!(spec.required, Required::Always) && !root.contains_key(field) {
                out.push(self.required_missing(field, spec, Span::new(0, 0)));
            }
        }
    }

    fn required_missing(&self, field: &str, spec: &FieldSpec, anchor: Span) -> Diagnostic {
        let code = spec.code.as_deref().unwrap_or(codes::SCHEMA_REQUIRED_MISSING);
        let message = spec
            .message
            .clone()
            .unwrap_or_else(|| format!("required field `{}` is missing", field));
        Diagnostic::error(code, anchor, message)
    }

    fn check_required(
        &self,
        block: &Block,
        schema: &Schema,
        anchor: Span,
        out: &mut Vec<Diagnostic>,
    ) {
        for (field, spec) in &schema.fields {
            let needed = match &spec.required {
                Required::Always => true,
                Required::Never => false,
                Required::If(pred) => pred.eval(block),
            };
            if needed && !block.contains_key(field) {
                out.push(self.required_missing(field, spec, anchor));
            }
        }
    }

    fn check_rules(&self, block: &Block, schema: &Schema, anchor: Span, out: &mut Vec<Diagnostic>) {
        for rule in &schema.rules {
            match rule {
                CrossRule::RequireIf {
                    field,
                    condition,
                    code,
                    message,
                } => {
                    if condition.eval(block) && !block.contains_key(field) {
                        out.push(Diagnostic::error(
                            code.as_deref().unwrap_or(codes::SCHEMA_RULE_VIOLATION),
                            anchor,
                            message
                                .clone()
                                .unwrap_or_else(|| format!("`{}` is required here", field)),
                        ));
                    }
                }
                CrossRule::ForbidWith {
                    field,
                    with,
                    code,
                    message,
                } => {
                    if block.contains_key(field) && block.contains_key(with) {
                        let second = block
                            .get(with)
                            .map(|e| e.key_span)
                            .unwrap_or(anchor);
                        out.push(Diagnostic::error(
                            code.as_deref().unwrap_or(codes::SCHEMA_RULE_VIOLATION),
                            second,
                            message.clone().unwrap_or_else(|| {
                                format!("`{}` cannot be combined with `{}`", field, with)
                            }),
                        ));
                    }
                }
                CrossRule::AtMostOneOf {
                    fields,
                    code,
                    message,
                } => {
                    let mut seen = 0usize;
                    for entry in &block.entries {
                        if !fields.iter().any(|f| f == &entry.key) {
                            continue;
                        }
                        seen += 1;
                        if seen >= 2 {
                            out.push(Diagnostic::error(
                                code.as_deref().unwrap_or(codes::SCHEMA_RULE_VIOLATION),
                                entry.key_span,
                                message.clone().unwrap_or_else(|| {
                                    format!("at most one of {} is allowed", fields.join(", "))
                                }),
                            ));
                        }
                    }
                }
            }
        }
    }

    fn check_entry(&self, entry: &Entry, spec: &FieldSpec, out: &mut Vec<Diagnostic>) {
        if let Some(message) = &spec.deprecated {
            out.push(Diagnostic::warning(
                codes::SCHEMA_DEPRECATED_FIELD,
                entry.key_span,
                format!("`{}` is deprecated: {}", entry.key, message),
            ));
        }
        self.check_value(entry, spec, out);
    }

    fn check_value(&self, entry: &Entry, spec: &FieldSpec, out: &mut Vec<Diagnostic>) {
        match spec.ty {
            TypeSpec::Any => {}
            TypeSpec::Scalar => {
                if entry.value.as_scalar().is_none() {
                    out.push(self.type_mismatch(entry, "a scalar value"));
                }
            }
            TypeSpec::Int => match entry.scalar_text() {
                Some(text) if text.parse::<i64>().is_ok() => {}
                _ => out.push(self.type_mismatch(entry, "an integer")),
            },
            TypeSpec::Float => match entry.scalar_text() {
                Some(text) if text.parse::<f64>().is_ok() => {}
                _ => out.push(self.type_mismatch(entry, "a number")),
            },
            TypeSpec::Bool => match entry.scalar_text() {
                Some("yes") | Some("no") => {}
                _ => out.push(self.type_mismatch(entry, "`yes` or `no`")),
            },
            TypeSpec::EnumValue => match entry.scalar_text() {
                Some(text) if spec.enum_values.iter().any(|v| v == text) => {}
                Some(text) => out.push(Diagnostic::error(
                    codes::SCHEMA_ENUM_MISMATCH,
                    entry.value.span(),
                    format!(
                        "`{}` is not one of: {}",
                        text,
                        spec.enum_values.join(", ")
                    ),
                )),
                None => out.push(self.type_mismatch(entry, "one of the allowed values")),
            },
            TypeSpec::Range => self.check_range(entry, out),
            TypeSpec::Block => {
                if entry.value.as_block().is_none() {
                    out.push(self.type_mismatch(entry, "a `{ ... }` block"));
                }
            }
            TypeSpec::DescBlock => match &entry.value {
                Value::Scalar(s) => self.check_loc_key(&s.text, s.span, out),
                Value::Block(_) => {}
                Value::List(_) => out.push(self.type_mismatch(entry, "a key or desc block")),
            },
            TypeSpec::LocalizationKey => match entry.value.as_scalar() {
                Some(s) => self.check_loc_key(&s.text, s.span, out),
                None => out.push(self.type_mismatch(entry, "a localization key")),
            },
            TypeSpec::EventId => match entry.value.as_scalar() {
                Some(s) => self.check_event_id(&s.text, s.span, out),
                None => out.push(self.type_mismatch(entry, "an event id")),
            },
            // Scope-dependent shapes are judged by the analysis walk, which
            // owns the current scope and saved-scope tables.
            TypeSpec::ScopeReference | TypeSpec::SavedScope => {}
        }

        if let Some(pattern_name) = &spec.pattern {
            if let Some(text) = entry.scalar_text() {
                if let Some(regex) = self.registry.pattern_named(pattern_name) {
                    if !regex.is_match(text) {
                        out.push(Diagnostic::error(
                            codes::SCHEMA_PATTERN_MISMATCH,
                            entry.value.span(),
                            format!("`{}` does not match the `{}` pattern", text, pattern_name),
                        ));
                    }
                }
            }
        }
    }

    fn type_mismatch(&self, entry: &Entry, expected: &str) -> Diagnostic {
        Diagnostic::error(
            codes::SCHEMA_TYPE_MISMATCH,
            entry.value.span(),
            format!("`{}` expects {}", entry.key, expected),
        )
    }

    fn check_range(&self, entry: &Entry, out: &mut Vec<Diagnostic>) {
        let items = match &entry.value {
            Value::List(items) => items,
            _ => {
                out.push(self.type_mismatch(entry, "a `{ min max }` pair"));
                return;
            }
        };
        if items.len() != 2 {
            out.push(Diagnostic::error(
                codes::SCHEMA_RANGE_INVALID,
                entry.value.span(),
                format!("`{}` takes exactly two values", entry.key),
            ));
            return;
        }
        match (items[0].as_number(), items[1].as_number()) {
            (Some(min), Some(max)) => {
                if min > max {
                    out.push(Diagnostic::error(
                        codes::SCHEMA_RANGE_INVALID,
                        entry.value.span(),
                        format!("range minimum {} exceeds maximum {}", min, max),
                    ));
                }
            }
            _ => out.push(Diagnostic::error(
                codes::SCHEMA_RANGE_INVALID,
                entry.value.span(),
                "both range bounds must be numeric",
            )),
        }
    }

    /// Loc keys are cross-checked against the index; a miss draws a warning
    /// with a same-namespace fuzzy suggestion when one is close enough.
    fn check_loc_key(&self, key: &str, span: Span, out: &mut Vec<Diagnostic>) {
        if key.is_empty() {
            return;
        }
        if self.symbols.contains(SymbolKind::LocalizationKey, key) {
            return;
        }
        let mut diagnostic = Diagnostic::warning(
            codes::MISSING_LOC_KEY,
            span,
            format!("localization key `{}` is not defined", key),
        );
        if let Some(suggestion) = self.symbols.suggest(SymbolKind::LocalizationKey, key) {
            diagnostic.message = format!(
                "localization key `{}` is not defined; did you mean `{}`?",
                key, suggestion
            );
            diagnostic = diagnostic.with_fix(
                format!("Replace with `{}`", suggestion),
                span,
                suggestion,
            );
        }
        out.push(diagnostic);
    }

    fn check_event_id(&self, id: &str, span: Span, out: &mut Vec<Diagnostic>) {
        if let Some(regex) = self.registry.pattern_named("event_id") {
            if !regex.is_match(id) {
                out.push(Diagnostic::error(
                    codes::SCHEMA_PATTERN_MISMATCH,
                    span,
                    format!("`{}` is not a valid event id (`namespace.NNNN`)", id),
                ));
                return;
            }
        }
        if !self.symbols.contains(SymbolKind::Event, id) {
            let mut diagnostic = Diagnostic::warning(
                codes::UNKNOWN_EVENT,
                span,
                format!("event `{}` is not defined anywhere in the workspace", id),
            );
            if let Some(suggestion) = self.symbols.suggest(SymbolKind::Event, id) {
                diagnostic.message =
                    format!("event `{}` is not defined; did you mean `{}`?", id, suggestion);
            }
            out.push(diagnostic);
        }
    }

    fn check_duplicates(&self, block: &Block, schema: &Schema, out: &mut Vec<Diagnostic>) {
        for (field, spec) in &schema.fields {
            match spec.duplicate {
                DuplicatePolicy::Append => continue,
                DuplicatePolicy::Forbidden => {
                    for entry in block.get_all(field).skip(1) {
                        out.push(Diagnostic::error(
                            codes::SCHEMA_DUPLICATE_FORBIDDEN,
                            entry.key_span,
                            format!("`{}` may only appear once; only the first is used", field),
                        ));
                    }
                }
                DuplicatePolicy::LastWins => {
                    let occurrences: Vec<&Entry> = block.get_all(field).collect();
                    if occurrences.len() < 2 {
                        continue;
                    }
                    for entry in &occurrences[..occurrences.len() - 1] {
                        out.push(Diagnostic::info(
                            codes::SCHEMA_DUPLICATE_SHADOWED,
                            entry.key_span,
                            format!(
                                "this `{}` is shadowed by a later occurrence",
                                field
                            ),
                        ));
                    }
                }
            }
        }
    }

    fn check_field_order(&self, block: &Block, schema: &Schema, out: &mut Vec<Diagnostic>) {
        let Some(order) = &schema.field_order else {
            return;
        };
        let rank = |key: &str| order.iter().position(|f| f == key);
        let mut max_seen: Option<usize> = None;
        for entry in &block.entries {
            let Some(this_rank) = rank(&entry.key) else {
                continue;
            };
            if let Some(max) = max_seen {
                if this_rank < max {
                    out.push(Diagnostic::hint(
                        codes::SCHEMA_FIELD_ORDER,
                        entry.key_span,
                        format!(
                            "`{}` conventionally comes before `{}`",
                            entry.key, order[max]
                        ),
                    ));
                }
            }
            max_seen = Some(max_seen.map_or(this_rank, |m| m.max(this_rank)));
        }
    }
}
