//! Declarative file-type schemas.
//!
//! One YAML document describes one file-type: which paths it governs, which
//! fields its blocks may carry, the per-field shape/enum/pattern constraints,
//! cross-field rules, and how top-level entries declare symbols for the
//! indexer. Schemas drive the [`crate::validator`]; nothing in here walks an
//! AST itself.

mod loader;
mod registry;

pub use loader::load_schema_documents;
pub use registry::SchemaRegistry;

use std::collections::HashMap;

use crate::ast::Block;
use crate::catalog::ScopeType;

/// What kind of commands a block hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRole {
    Effect,
    Trigger,
    Neutral,
    /// Both effects and triggers legal (e.g. scripted rule bodies).
    Mixed,
}

#[derive(Debug, Clone)]
pub struct SchemaContext {
    pub role: BlockRole,
    /// Scope type at the root of a matched document, when the file-type
    /// fixes one (events start in `character` scope).
    pub root_scope: Option<ScopeType>,
}

impl Default for SchemaContext {
    fn default() -> Self {
        SchemaContext {
            role: BlockRole::Neutral,
            root_scope: None,
        }
    }
}

/// The small predicate language used by conditional requirements and
/// cross-field rules: `has(f)`, `absent(f)`, `value(f) == lit`,
/// `not …`, `… and …`, `… or …`, parentheses.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Has(String),
    Absent(String),
    ValueEq(String, String),
    ValueNe(String, String),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Evaluates against a block's direct entries. `value(f)` reads the first
    /// scalar value of `f`; a missing or non-scalar field compares unequal.
    pub fn eval(&self, block: &Block) -> bool {
        match self {
            Predicate::Has(field) => block.contains_key(field),
            Predicate::Absent(field) => !block.contains_key(field),
            Predicate::ValueEq(field, literal) => block.scalar_of(field) == Some(literal.as_str()),
            Predicate::ValueNe(field, literal) => block.scalar_of(field) != Some(literal.as_str()),
            Predicate::Not(inner) => !inner.eval(block),
            Predicate::And(parts) => parts.iter().all(|p| p.eval(block)),
            Predicate::Or(parts) => parts.iter().any(|p| p.eval(block)),
        }
    }

    /// Parses the textual form. Returns `None` on malformed input; the loader
    /// turns that into a configuration error with file context.
    pub fn parse(text: &str) -> Option<Predicate> {
        let tokens = pred_lex(text)?;
        let mut pos = 0;
        let pred = pred_or(&tokens, &mut pos)?;
        if pos == tokens.len() {
            Some(pred)
        } else {
            None
        }
    }
}

#[derive(Debug, PartialEq)]
enum PredToken {
    Ident(String),
    LParen,
    RParen,
    EqEq,
    Ne,
}

fn pred_lex(text: &str) -> Option<Vec<PredToken>> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' => i += 1,
            b'(' => {
                tokens.push(PredToken::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(PredToken::RParen);
                i += 1;
            }
            b'=' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(PredToken::EqEq);
                i += 2;
            }
            b'!' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(PredToken::Ne);
                i += 2;
            }
            b if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'.'))
                {
                    i += 1;
                }
                tokens.push(PredToken::Ident(text[start..i].to_string()));
            }
            _ => return None,
        }
    }
    Some(tokens)
}

fn pred_or(tokens: &[PredToken], pos: &mut usize) -> Option<Predicate> {
    let mut parts = vec![pred_and(tokens, pos)?];
    while matches!(tokens.get(*pos), Some(PredToken::Ident(w)) if w == "or") {
        *pos += 1;
        parts.push(pred_and(tokens, pos)?);
    }
    Some(if parts.len() == 1 {
        parts.pop().unwrap()
    } else {
        Predicate::Or(parts)
    })
}

fn pred_and(tokens: &[PredToken], pos: &mut usize) -> Option<Predicate> {
    let mut parts = vec![pred_unary(tokens, pos)?];
    while matches!(tokens.get(*pos), Some(PredToken::Ident(w)) if w == "and") {
        *pos += 1;
        parts.push(pred_unary(tokens, pos)?);
    }
    Some(if parts.len() == 1 {
        parts.pop().unwrap()
    } else {
        Predicate::And(parts)
    })
}

fn pred_unary(tokens: &[PredToken], pos: &mut usize) -> Option<Predicate> {
    match tokens.get(*pos)? {
        PredToken::Ident(w) if w == "not" => {
            *pos += 1;
            Some(Predicate::Not(Box::new(pred_unary(tokens, pos)?)))
        }
        PredToken::LParen => {
            *pos += 1;
            let inner = pred_or(tokens, pos)?;
            match tokens.get(*pos)? {
                PredToken::RParen => {
                    *pos += 1;
                    Some(inner)
                }
                _ => None,
            }
        }
        PredToken::Ident(w) if w == "has" || w == "absent" || w == "value" => {
            let func = w.clone();
            *pos += 1;
            if tokens.get(*pos)? != &PredToken::LParen {
                return None;
            }
            *pos += 1;
            let field = match tokens.get(*pos)? {
                PredToken::Ident(name) => name.clone(),
                _ => return None,
            };
            *pos += 1;
            if tokens.get(*pos)? != &PredToken::RParen {
                return None;
            }
            *pos += 1;
            match func.as_str() {
                "has" => Some(Predicate::Has(field)),
                "absent" => Some(Predicate::Absent(field)),
                "value" => {
                    let negated = match tokens.get(*pos)? {
                        PredToken::EqEq => false,
                        PredToken::Ne => true,
                        _ => return None,
                    };
                    *pos += 1;
                    let literal = match tokens.get(*pos)? {
                        PredToken::Ident(lit) => lit.clone(),
                        _ => return None,
                    };
                    *pos += 1;
                    Some(if negated {
                        Predicate::ValueNe(field, literal)
                    } else {
                        Predicate::ValueEq(field, literal)
                    })
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// When a field must be present.
#[derive(Debug, Clone, PartialEq)]
pub enum Required {
    Always,
    Never,
    If(Predicate),
}

/// The value shape a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSpec {
    /// No shape constraint.
    Any,
    /// Any scalar.
    Scalar,
    Int,
    Float,
    Bool,
    /// Scalar restricted to the field's `enum:` set.
    EnumValue,
    /// Two-element numeric list `{ min max }` with `min <= max`.
    Range,
    Block,
    /// `desc` shapes: bare localization key or nested desc block.
    DescBlock,
    LocalizationKey,
    /// A scope chain validated by the scope engine.
    ScopeReference,
    /// A `scope:name` reference that must name a saved scope.
    SavedScope,
    /// `namespace.NNNN`, cross-checked against the event index.
    EventId,
}

impl TypeSpec {
    pub fn from_name(name: &str) -> Option<TypeSpec> {
        Some(match name {
            "any" => TypeSpec::Any,
            "scalar" | "string" => TypeSpec::Scalar,
            "int" | "integer" => TypeSpec::Int,
            "float" | "number" => TypeSpec::Float,
            "bool" | "yes_no" => TypeSpec::Bool,
            "enum" => TypeSpec::EnumValue,
            "range" => TypeSpec::Range,
            "block" => TypeSpec::Block,
            "desc_block" => TypeSpec::DescBlock,
            "localization_key" => TypeSpec::LocalizationKey,
            "scope_reference" => TypeSpec::ScopeReference,
            "saved_scope" => TypeSpec::SavedScope,
            "event_id" => TypeSpec::EventId,
            _ => return None,
        })
    }
}

/// What to do when a key appears more than once in the same block.
///
/// There is deliberately no schema-author shorthand that infers this from the
/// type: the engine's own behavior differs per field, and a silent default
/// could mask real duplicates. Unset means `last-wins`, which still surfaces
/// the shadowed occurrence as an info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    Forbidden,
    LastWins,
    Append,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub required: Required,
    pub ty: TypeSpec,
    /// Name of a shared pattern in the registry.
    pub pattern: Option<String>,
    pub enum_values: Vec<String>,
    /// Name of the schema governing this field's block value.
    pub nested_schema: Option<String>,
    pub duplicate: DuplicatePolicy,
    /// Deprecation message; presence of the field draws a warning.
    pub deprecated: Option<String>,
    /// Diagnostic code override for the required-missing report.
    pub code: Option<String>,
    /// Message override for the required-missing report.
    pub message: Option<String>,
}

impl Default for FieldSpec {
    fn default() -> Self {
        FieldSpec {
            required: Required::Never,
            ty: TypeSpec::Any,
            pattern: None,
            enum_values: Vec::new(),
            nested_schema: None,
            duplicate: DuplicatePolicy::LastWins,
            deprecated: None,
            code: None,
            message: None,
        }
    }
}

/// A cross-field condition evaluated per block.
#[derive(Debug, Clone)]
pub enum CrossRule {
    /// `require: F, if: P`: F must be present when P holds.
    RequireIf {
        field: String,
        condition: Predicate,
        code: Option<String>,
        message: Option<String>,
    },
    /// `forbid: F, with: G`: F and G may not both appear.
    ForbidWith {
        field: String,
        with: String,
        code: Option<String>,
        message: Option<String>,
    },
    /// At most one of the listed fields may appear.
    AtMostOneOf {
        fields: Vec<String>,
        code: Option<String>,
        message: Option<String>,
    },
}

/// How top-level entries of a matched file declare symbols.
#[derive(Debug, Clone)]
pub struct SymbolDecl {
    /// Symbol kind name (`event`, `scripted_effect`, ...), resolved by the
    /// indexer.
    pub kind: String,
    pub id_from: IdSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdSource {
    /// The entry key is the qualified name.
    BlockKey,
    /// A named field inside the entry's block provides the name.
    Field(String),
}

#[derive(Debug, Clone, Default)]
pub struct FieldDoc {
    pub description: String,
    pub snippet: Option<String>,
}

/// A fully resolved schema (after `extends` merging and variable
/// substitution).
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub extends: Option<String>,
    pub path_patterns: Vec<String>,
    pub context: SchemaContext,
    /// Fields legal directly at file root, outside declarations
    /// (`namespace = my_mod` in event files).
    pub root_fields: Vec<(String, FieldSpec)>,
    /// Named pattern top-level declaration keys must match (`event_id`).
    pub key_pattern: Option<String>,
    /// Ordered: field order in the file is the canonical declaration order.
    pub fields: Vec<(String, FieldSpec)>,
    pub rules: Vec<CrossRule>,
    pub field_order: Option<Vec<String>>,
    /// When set, fields not declared in the schema are reported.
    pub strict: bool,
    pub symbols: Option<SymbolDecl>,
    pub field_docs: HashMap<String, FieldDoc>,
    /// Declaration order across the registry, for match tie-breaking.
    pub(crate) order: usize,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, spec)| spec)
    }

    pub fn root_field(&self, name: &str) -> Option<&FieldSpec> {
        self.root_fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, spec)| spec)
    }

    pub fn field_doc(&self, name: &str) -> Option<&FieldDoc> {
        self.field_docs.get(name)
    }
}
