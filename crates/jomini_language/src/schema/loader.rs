//! Schema YAML loading: variable substitution, `extends` resolution, and
//! internal consistency checks.
//!
//! Loading is all-or-nothing: any malformed document aborts with a
//! [`ConfigError`] and no partially-merged schema set escapes.

use std::collections::{HashMap, HashSet};

use serde_yaml::Value;

use crate::catalog::ScopeType;
use crate::config::ConfigError;

use super::{
    BlockRole, CrossRule, DuplicatePolicy, FieldDoc, FieldSpec, IdSource, Predicate, Required,
    Schema, SchemaContext, SymbolDecl, TypeSpec,
};

/// Result of loading a set of schema documents: resolved schemas in
/// declaration order plus the shared named-pattern table (raw, compiled by
/// the registry).
#[derive(Debug)]
pub struct LoadedSchemas {
    pub schemas: Vec<Schema>,
    pub patterns: HashMap<String, String>,
}

/// Loads schema documents given as `(file_name, text)` pairs. Documents
/// without a `name:` key are fragments contributing only `variables:` and
/// `patterns:`.
pub fn load_schema_documents(docs: &[(String, String)]) -> Result<LoadedSchemas, ConfigError> {
    let mut parsed: Vec<(String, Value)> = Vec::with_capacity(docs.len());
    for (file, text) in docs {
        let value: Value = serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            file: file.clone(),
            source,
        })?;
        parsed.push((file.clone(), value));
    }

    // Variables are global across the schema set; collect them all first.
    let mut variables: HashMap<String, String> = HashMap::new();
    for (file, value) in &parsed {
        if let Some(vars) = value.get("variables").and_then(Value::as_mapping) {
            for (key, val) in vars {
                let name = scalar_string(key).ok_or_else(|| schema_err(file, "variable names must be strings"))?;
                let text = scalar_string(val)
                    .ok_or_else(|| schema_err(file, format!("variable `{name}` must be a scalar")))?;
                variables.insert(name, text);
            }
        }
    }

    // Textual `$variable` substitution over every string scalar.
    for (file, value) in &mut parsed {
        substitute_variables(value, &variables, file)?;
    }

    // Shared named patterns.
    let mut patterns: HashMap<String, String> = HashMap::new();
    for (file, value) in &parsed {
        if let Some(pats) = value.get("patterns").and_then(Value::as_mapping) {
            for (key, val) in pats {
                let name = scalar_string(key).ok_or_else(|| schema_err(file, "pattern names must be strings"))?;
                let text = scalar_string(val)
                    .ok_or_else(|| schema_err(file, format!("pattern `{name}` must be a string")))?;
                if let Some(existing) = patterns.get(&name) {
                    if existing != &text {
                        return Err(schema_err(
                            file,
                            format!("pattern `{name}` is defined twice with different values"),
                        ));
                    }
                }
                patterns.insert(name, text);
            }
        }
    }

    // Build unresolved schemas in declaration order.
    let mut schemas: Vec<Schema> = Vec::new();
    for (_file, value) in &parsed {
        let Some(name) = value.get("name").and_then(scalar_string_ref) else {
            continue; // fragment
        };
        schemas.push(parse_schema(&name, value)?);
    }

    resolve_extends(&mut schemas)?;
    validate(&schemas, &patterns)?;

    for (index, schema) in schemas.iter_mut().enumerate() {
        schema.order = index;
    }

    Ok(LoadedSchemas { schemas, patterns })
}

fn schema_err(schema: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::Schema {
        schema: schema.into(),
        message: message.into(),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    scalar_string_ref(value)
}

fn scalar_string_ref(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn substitute_variables(
    value: &mut Value,
    variables: &HashMap<String, String>,
    file: &str,
) -> Result<(), ConfigError> {
    match value {
        Value::String(text) => {
            if text.contains('$') {
                *text = substitute_in_str(text, variables, file)?;
            }
            Ok(())
        }
        Value::Sequence(items) => {
            for item in items {
                substitute_variables(item, variables, file)?;
            }
            Ok(())
        }
        Value::Mapping(map) => {
            for (_key, val) in map.iter_mut() {
                substitute_variables(val, variables, file)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Replaces `$name` references. `$` followed by anything other than an
/// identifier head (snippet placeholders like `${1|...}`, `$1`) is left
/// alone.
fn substitute_in_str(
    text: &str,
    variables: &HashMap<String, String>,
    file: &str,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$'
            && i + 1 < bytes.len()
            && (bytes[i + 1].is_ascii_alphabetic() || bytes[i + 1] == b'_')
        {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                end += 1;
            }
            let name = &text[start..end];
            match variables.get(name) {
                Some(replacement) => out.push_str(replacement),
                None => {
                    return Err(ConfigError::UnknownVariable {
                        schema: file.to_string(),
                        name: name.to_string(),
                    })
                }
            }
            i = end;
        } else {
            let ch_len = text[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            out.push_str(&text[i..i + ch_len]);
            i += ch_len;
        }
    }
    Ok(out)
}

fn parse_schema(name: &str, value: &Value) -> Result<Schema, ConfigError> {
    let extends = value.get("extends").and_then(scalar_string_ref);

    let path_patterns = match value.get("path_patterns") {
        None => Vec::new(),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| {
                scalar_string(item)
                    .ok_or_else(|| schema_err(name, "path_patterns entries must be strings"))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(schema_err(name, "path_patterns must be a list")),
    };

    let context = match value.get("context") {
        None => SchemaContext::default(),
        Some(ctx) => parse_context(name, ctx)?,
    };

    let mut fields = Vec::new();
    if let Some(map) = value.get("fields").and_then(Value::as_mapping) {
        for (key, spec) in map {
            let field = scalar_string(key)
                .ok_or_else(|| schema_err(name, "field names must be strings"))?;
            fields.push((field.clone(), parse_field_spec(name, &field, spec)?));
        }
    }

    let mut root_fields = Vec::new();
    if let Some(map) = value.get("root_fields").and_then(Value::as_mapping) {
        for (key, spec) in map {
            let field = scalar_string(key)
                .ok_or_else(|| schema_err(name, "root field names must be strings"))?;
            root_fields.push((field.clone(), parse_field_spec(name, &field, spec)?));
        }
    }

    let key_pattern = value.get("key_pattern").and_then(scalar_string_ref);

    let mut rules = Vec::new();
    if let Some(items) = value.get("rules").and_then(Value::as_sequence) {
        for item in items {
            rules.push(parse_rule(name, item)?);
        }
    }

    let field_order = match value.get("field_order") {
        None => None,
        Some(Value::Sequence(items)) => Some(
            items
                .iter()
                .map(|item| {
                    scalar_string(item)
                        .ok_or_else(|| schema_err(name, "field_order entries must be strings"))
                })
                .collect::<Result<_, _>>()?,
        ),
        Some(_) => return Err(schema_err(name, "field_order must be a list")),
    };

    let strict = value.get("strict").and_then(Value::as_bool).unwrap_or(false);

    let symbols = match value.get("symbols") {
        None => None,
        Some(sym) => Some(parse_symbols(name, sym)?),
    };

    let mut field_docs = HashMap::new();
    if let Some(map) = value.get("field_docs").and_then(Value::as_mapping) {
        for (key, doc) in map {
            let field = scalar_string(key)
                .ok_or_else(|| schema_err(name, "field_docs keys must be strings"))?;
            let description = doc
                .get("description")
                .and_then(scalar_string_ref)
                .unwrap_or_default();
            let snippet = doc.get("snippet").and_then(scalar_string_ref);
            field_docs.insert(
                field,
                FieldDoc {
                    description,
                    snippet,
                },
            );
        }
    }

    Ok(Schema {
        name: name.to_string(),
        extends,
        path_patterns,
        context,
        root_fields,
        key_pattern,
        fields,
        rules,
        field_order,
        strict,
        symbols,
        field_docs,
        order: 0,
    })
}

fn parse_context(schema: &str, value: &Value) -> Result<SchemaContext, ConfigError> {
    let role = match value.get("this_block_is").and_then(scalar_string_ref) {
        None => BlockRole::Neutral,
        Some(role) => match role.as_str() {
            "effect" => BlockRole::Effect,
            "trigger" => BlockRole::Trigger,
            "neutral" => BlockRole::Neutral,
            "mixed" => BlockRole::Mixed,
            other => {
                return Err(schema_err(
                    schema,
                    format!("unknown block role `{other}` in context"),
                ))
            }
        },
    };
    let root_scope = match value.get("root_scope").and_then(scalar_string_ref) {
        None => None,
        Some(scope) => Some(ScopeType::from_name(&scope).ok_or_else(|| {
            schema_err(schema, format!("unknown root_scope `{scope}`"))
        })?),
    };
    Ok(SchemaContext { role, root_scope })
}

fn parse_field_spec(schema: &str, field: &str, value: &Value) -> Result<FieldSpec, ConfigError> {
    let mut spec = FieldSpec::default();
    let Some(map) = value.as_mapping() else {
        return Err(schema_err(
            schema,
            format!("field `{field}` must map to a spec"),
        ));
    };

    for (key, val) in map {
        let key = scalar_string(key)
            .ok_or_else(|| schema_err(schema, format!("field `{field}`: spec keys must be strings")))?;
        match key.as_str() {
            "required" => spec.required = parse_required(schema, field, val)?,
            "type" => {
                let ty = scalar_string(val).ok_or_else(|| {
                    schema_err(schema, format!("field `{field}`: type must be a string"))
                })?;
                spec.ty = TypeSpec::from_name(&ty).ok_or_else(|| {
                    schema_err(schema, format!("field `{field}`: unknown type `{ty}`"))
                })?;
            }
            "enum" => {
                let items = val.as_sequence().ok_or_else(|| {
                    schema_err(schema, format!("field `{field}`: enum must be a list"))
                })?;
                for item in items {
                    spec.enum_values.push(scalar_string(item).ok_or_else(|| {
                        schema_err(schema, format!("field `{field}`: enum values must be scalars"))
                    })?);
                }
            }
            "pattern" => spec.pattern = scalar_string(val),
            "nested_schema" => spec.nested_schema = scalar_string(val),
            "duplicate_policy" => {
                let policy = scalar_string(val).unwrap_or_default();
                spec.duplicate = match policy.as_str() {
                    "forbidden" => DuplicatePolicy::Forbidden,
                    "last-wins" => DuplicatePolicy::LastWins,
                    "append" => DuplicatePolicy::Append,
                    other => {
                        return Err(schema_err(
                            schema,
                            format!("field `{field}`: unknown duplicate_policy `{other}`"),
                        ))
                    }
                };
            }
            "deprecated" => spec.deprecated = scalar_string(val),
            "code" => spec.code = scalar_string(val),
            "message" => spec.message = scalar_string(val),
            other => {
                return Err(schema_err(
                    schema,
                    format!("field `{field}`: unknown spec key `{other}`"),
                ))
            }
        }
    }

    if spec.ty == TypeSpec::EnumValue && spec.enum_values.is_empty() {
        return Err(schema_err(
            schema,
            format!("field `{field}`: enum type with empty enum set"),
        ));
    }

    Ok(spec)
}

fn parse_required(schema: &str, field: &str, value: &Value) -> Result<Required, ConfigError> {
    match value {
        Value::String(s) if s == "always" => Ok(Required::Always),
        Value::String(s) if s == "never" => Ok(Required::Never),
        Value::Bool(true) => Ok(Required::Always),
        Value::Bool(false) => Ok(Required::Never),
        Value::Mapping(_) => {
            let expr = value.get("if").and_then(scalar_string_ref).ok_or_else(|| {
                schema_err(schema, format!("field `{field}`: required mapping needs `if`"))
            })?;
            let pred = Predicate::parse(&expr).ok_or_else(|| {
                schema_err(
                    schema,
                    format!("field `{field}`: cannot parse condition `{expr}`"),
                )
            })?;
            Ok(Required::If(pred))
        }
        _ => Err(schema_err(
            schema,
            format!("field `{field}`: required must be always/never or {{ if: ... }}"),
        )),
    }
}

fn parse_rule(schema: &str, value: &Value) -> Result<CrossRule, ConfigError> {
    let code = value.get("code").and_then(scalar_string_ref);
    let message = value.get("message").and_then(scalar_string_ref);

    if let Some(field) = value.get("require").and_then(scalar_string_ref) {
        let expr = value.get("if").and_then(scalar_string_ref).ok_or_else(|| {
            schema_err(schema, format!("rule requiring `{field}` needs an `if` condition"))
        })?;
        let condition = Predicate::parse(&expr).ok_or_else(|| {
            schema_err(schema, format!("cannot parse rule condition `{expr}`"))
        })?;
        return Ok(CrossRule::RequireIf {
            field,
            condition,
            code,
            message,
        });
    }

    if let Some(field) = value.get("forbid").and_then(scalar_string_ref) {
        let with = value.get("with").and_then(scalar_string_ref).ok_or_else(|| {
            schema_err(schema, format!("rule forbidding `{field}` needs `with`"))
        })?;
        return Ok(CrossRule::ForbidWith {
            field,
            with,
            code,
            message,
        });
    }

    if let Some(items) = value.get("at_most_one_of").and_then(Value::as_sequence) {
        let fields = items
            .iter()
            .map(|item| {
                scalar_string(item)
                    .ok_or_else(|| schema_err(schema, "at_most_one_of entries must be strings"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if fields.len() < 2 {
            return Err(schema_err(schema, "at_most_one_of needs at least two fields"));
        }
        return Ok(CrossRule::AtMostOneOf {
            fields,
            code,
            message,
        });
    }

    Err(schema_err(
        schema,
        "rule must be require/if, forbid/with, or at_most_one_of",
    ))
}

fn parse_symbols(schema: &str, value: &Value) -> Result<SymbolDecl, ConfigError> {
    let kind = value.get("kind").and_then(scalar_string_ref).ok_or_else(|| {
        schema_err(schema, "symbols block needs a `kind`")
    })?;
    let id_from = match value.get("id_from") {
        None | Some(Value::String(_)) => {
            let source = value
                .get("id_from")
                .and_then(scalar_string_ref)
                .unwrap_or_else(|| "block_key".to_string());
            if source == "block_key" {
                IdSource::BlockKey
            } else {
                return Err(schema_err(
                    schema,
                    format!("unknown id_from `{source}` (use block_key or {{ field: name }})"),
                ));
            }
        }
        Some(mapping @ Value::Mapping(_)) => {
            let field = mapping.get("field").and_then(scalar_string_ref).ok_or_else(|| {
                schema_err(schema, "id_from mapping needs a `field`")
            })?;
            IdSource::Field(field)
        }
        Some(_) => return Err(schema_err(schema, "id_from must be a string or mapping")),
    };
    Ok(SymbolDecl { kind, id_from })
}

/// Resolves `extends` by shallow-merging each parent into its children.
/// Parents merge before grandchildren via repeated passes; a cycle leaves
/// unresolved schemas behind and is reported.
fn resolve_extends(schemas: &mut Vec<Schema>) -> Result<(), ConfigError> {
    let names: HashSet<String> = schemas.iter().map(|s| s.name.clone()).collect();
    for schema in schemas.iter() {
        if let Some(parent) = &schema.extends {
            if !names.contains(parent) {
                return Err(ConfigError::UnknownExtends {
                    child: schema.name.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }

    // A schema is resolvable once its parent no longer extends anything.
    let mut remaining: Vec<usize> = (0..schemas.len())
        .filter(|&i| schemas[i].extends.is_some())
        .collect();
    while !remaining.is_empty() {
        let before = remaining.len();
        remaining.retain(|&child_idx| {
            let parent_name = schemas[child_idx].extends.clone().expect("retained");
            let parent_idx = schemas
                .iter()
                .position(|s| s.name == parent_name)
                .expect("checked above");
            if schemas[parent_idx].extends.is_some() {
                return true; // parent not merged yet
            }
            let parent = schemas[parent_idx].clone();
            merge_parent(&mut schemas[child_idx], &parent);
            false
        });
        if remaining.len() == before {
            let stuck = &schemas[remaining[0]];
            return Err(ConfigError::ExtendsCycle {
                schema: stuck.name.clone(),
            });
        }
    }
    Ok(())
}

/// Shallow merge: child wins field-by-field; parent-only fields are inserted
/// ahead of the child's own so the parent's ordering survives.
fn merge_parent(child: &mut Schema, parent: &Schema) {
    let child_fields: HashSet<&String> = child.fields.iter().map(|(name, _)| name).collect();
    let inherited: Vec<(String, FieldSpec)> = parent
        .fields
        .iter()
        .filter(|(name, _)| !child_fields.contains(name))
        .cloned()
        .collect();
    drop(child_fields);
    let mut fields = inherited;
    fields.append(&mut child.fields);
    child.fields = fields;

    let mut rules = parent.rules.clone();
    rules.append(&mut child.rules);
    child.rules = rules;

    let child_roots: HashSet<&String> = child.root_fields.iter().map(|(name, _)| name).collect();
    let inherited_roots: Vec<(String, FieldSpec)> = parent
        .root_fields
        .iter()
        .filter(|(name, _)| !child_roots.contains(name))
        .cloned()
        .collect();
    drop(child_roots);
    let mut root_fields = inherited_roots;
    root_fields.append(&mut child.root_fields);
    child.root_fields = root_fields;

    if child.key_pattern.is_none() {
        child.key_pattern = parent.key_pattern.clone();
    }
    if child.field_order.is_none() {
        child.field_order = parent.field_order.clone();
    }
    if child.symbols.is_none() {
        child.symbols = parent.symbols.clone();
    }
    for (field, doc) in &parent.field_docs {
        child.field_docs.entry(field.clone()).or_insert_with(|| doc.clone());
    }
    child.extends = None;
}

fn validate(schemas: &[Schema], patterns: &HashMap<String, String>) -> Result<(), ConfigError> {
    let names: HashSet<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
    for schema in schemas {
        if let Some(pattern) = &schema.key_pattern {
            if !patterns.contains_key(pattern) {
                return Err(schema_err(
                    &schema.name,
                    format!("key_pattern references unknown pattern `{pattern}`"),
                ));
            }
        }
        for (field, spec) in schema.fields.iter().chain(schema.root_fields.iter()) {
            if let Some(nested) = &spec.nested_schema {
                if !names.contains(nested.as_str()) {
                    return Err(schema_err(
                        &schema.name,
                        format!("field `{field}` references unknown nested schema `{nested}`"),
                    ));
                }
            }
            if let Some(pattern) = &spec.pattern {
                if !patterns.contains_key(pattern) {
                    return Err(schema_err(
                        &schema.name,
                        format!("field `{field}` references unknown pattern `{pattern}`"),
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(f, t)| (f.to_string(), t.to_string()))
            .collect()
    }

    #[test]
    fn loads_minimal_schema() {
        let loaded = load_schema_documents(&docs(&[(
            "events.yaml",
            "name: events\npath_patterns: [\"events/**/*.txt\"]\nfields:\n  type: { required: always, type: enum, enum: [a, b] }\n",
        )]))
        .unwrap();
        assert_eq!(loaded.schemas.len(), 1);
        let schema = &loaded.schemas[0];
        assert_eq!(schema.name, "events");
        assert!(matches!(
            schema.field("type").unwrap().required,
            Required::Always
        ));
    }

    #[test]
    fn extends_merges_parent_fields_first() {
        let loaded = load_schema_documents(&docs(&[
            (
                "base.yaml",
                "name: base\nfields:\n  shared: { type: scalar }\n  overridden: { type: int }\n",
            ),
            (
                "child.yaml",
                "name: child\nextends: base\nfields:\n  overridden: { type: bool }\n  own: { type: scalar }\n",
            ),
        ]))
        .unwrap();
        let child = loaded.schemas.iter().find(|s| s.name == "child").unwrap();
        let names: Vec<&str> = child.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["shared", "overridden", "own"]);
        assert_eq!(child.field("overridden").unwrap().ty, TypeSpec::Bool);
    }

    #[test]
    fn unknown_extends_is_fatal() {
        let err = load_schema_documents(&docs(&[(
            "a.yaml",
            "name: a\nextends: ghost\n",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownExtends { .. }));
    }

    #[test]
    fn extends_cycle_is_fatal() {
        let err = load_schema_documents(&docs(&[
            ("a.yaml", "name: a\nextends: b\n"),
            ("b.yaml", "name: b\nextends: a\n"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::ExtendsCycle { .. }));
    }

    #[test]
    fn variables_substitute_textually() {
        let loaded = load_schema_documents(&docs(&[
            ("vars.yaml", "variables:\n  event_types: character_event\n"),
            (
                "events.yaml",
                "name: events\nfields:\n  type: { type: enum, enum: [$event_types] }\n",
            ),
        ]))
        .unwrap();
        let schema = &loaded.schemas[0];
        assert_eq!(
            schema.field("type").unwrap().enum_values,
            vec!["character_event"]
        );
    }

    #[test]
    fn unknown_variable_is_fatal() {
        let err = load_schema_documents(&docs(&[(
            "events.yaml",
            "name: events\nfields:\n  x: { pattern: $ghost_pattern }\npatterns:\n  p: \"a\"\n",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVariable { .. }));
    }

    #[test]
    fn snippet_placeholders_are_not_variables() {
        let loaded = load_schema_documents(&docs(&[(
            "events.yaml",
            "name: events\nfield_docs:\n  type: { snippet: \"type = ${1|a,b|}\" }\n",
        )]))
        .unwrap();
        assert_eq!(
            loaded.schemas[0].field_doc("type").unwrap().snippet.as_deref(),
            Some("type = ${1|a,b|}")
        );
    }

    #[test]
    fn empty_enum_is_fatal() {
        let err = load_schema_documents(&docs(&[(
            "events.yaml",
            "name: events\nfields:\n  type: { type: enum, enum: [] }\n",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Schema { .. }));
    }

    #[test]
    fn unknown_nested_schema_is_fatal() {
        let err = load_schema_documents(&docs(&[(
            "events.yaml",
            "name: events\nfields:\n  immediate: { type: block, nested_schema: ghost }\n",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Schema { .. }));
    }

    #[test]
    fn rules_parse_all_three_forms() {
        let loaded = load_schema_documents(&docs(&[(
            "events.yaml",
            concat!(
                "name: events\n",
                "rules:\n",
                "  - { require: sender, if: \"value(type) == letter_event\", code: EVENT-003 }\n",
                "  - { forbid: hidden, with: option }\n",
                "  - { at_most_one_of: [days, months, years], code: STORY-004 }\n",
            ),
        )]))
        .unwrap();
        assert_eq!(loaded.schemas[0].rules.len(), 3);
        assert!(matches!(
            loaded.schemas[0].rules[0],
            CrossRule::RequireIf { .. }
        ));
        assert!(matches!(
            loaded.schemas[0].rules[2],
            CrossRule::AtMostOneOf { .. }
        ));
    }
}
