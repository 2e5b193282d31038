//! The compiled schema registry: path matching and shared patterns.

use std::collections::HashMap;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use crate::config::ConfigError;

use super::loader::{load_schema_documents, LoadedSchemas};
use super::Schema;

/// Schema documents compiled into the crate. These are the defaults; a
/// workspace can override them with a schema directory (`load_dir`).
const EMBEDDED: &[(&str, &str)] = &[
    ("_variables.yaml", include_str!("../../schemas/_variables.yaml")),
    ("base_block.yaml", include_str!("../../schemas/base_block.yaml")),
    ("trigger_block.yaml", include_str!("../../schemas/trigger_block.yaml")),
    ("effect_block.yaml", include_str!("../../schemas/effect_block.yaml")),
    ("desc_block.yaml", include_str!("../../schemas/desc_block.yaml")),
    ("option_block.yaml", include_str!("../../schemas/option_block.yaml")),
    ("portrait_block.yaml", include_str!("../../schemas/portrait_block.yaml")),
    ("events.yaml", include_str!("../../schemas/events.yaml")),
    ("decisions.yaml", include_str!("../../schemas/decisions.yaml")),
    ("scripted_effects.yaml", include_str!("../../schemas/scripted_effects.yaml")),
    ("scripted_triggers.yaml", include_str!("../../schemas/scripted_triggers.yaml")),
    ("script_values.yaml", include_str!("../../schemas/script_values.yaml")),
    ("on_actions.yaml", include_str!("../../schemas/on_actions.yaml")),
    ("story_cycles.yaml", include_str!("../../schemas/story_cycles.yaml")),
    ("effect_group_block.yaml", include_str!("../../schemas/effect_group_block.yaml")),
];

#[derive(Debug)]
struct CompiledPattern {
    matcher: GlobMatcher,
    /// Length of the pattern's leading literal text, for tie-breaking.
    literal_prefix: usize,
    schema: usize,
}

/// Immutable after construction; reloading builds a fresh registry that the
/// server swaps in atomically.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: Vec<Schema>,
    by_name: HashMap<String, usize>,
    patterns: HashMap<String, Regex>,
    matchers: Vec<CompiledPattern>,
}

impl SchemaRegistry {
    /// Builds the registry from the schemas compiled into the crate.
    pub fn load_embedded() -> Result<SchemaRegistry, ConfigError> {
        let docs: Vec<(String, String)> = EMBEDDED
            .iter()
            .map(|(file, text)| (file.to_string(), text.to_string()))
            .collect();
        Self::from_documents(&docs)
    }

    /// Builds the registry from the embedded defaults plus every `.yaml` file
    /// under `dir`. A directory schema with the same `name:` replaces the
    /// embedded one.
    pub fn load_dir(dir: &Path) -> Result<SchemaRegistry, ConfigError> {
        let mut docs: Vec<(String, String)> = EMBEDDED
            .iter()
            .map(|(file, text)| (file.to_string(), text.to_string()))
            .collect();

        let mut extra: Vec<(String, String)> = Vec::new();
        let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Io {
            file: dir.display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ConfigError::Io {
                file: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                file: path.display().to_string(),
                source,
            })?;
            extra.push((path.display().to_string(), text));
        }
        // Deterministic declaration order regardless of readdir order.
        extra.sort_by(|a, b| a.0.cmp(&b.0));

        // A directory document overriding an embedded schema name replaces it.
        for (file, text) in extra {
            let name = schema_name_of(&text);
            if let Some(name) = name {
                if let Some(slot) = docs
                    .iter()
                    .position(|(_, existing)| schema_name_of(existing).as_deref() == Some(&name))
                {
                    docs[slot] = (file, text);
                    continue;
                }
            }
            docs.push((file, text));
        }
        Self::from_documents(&docs)
    }

    pub fn from_documents(docs: &[(String, String)]) -> Result<SchemaRegistry, ConfigError> {
        let LoadedSchemas { schemas, patterns } = load_schema_documents(docs)?;

        let mut compiled_patterns = HashMap::new();
        for (name, text) in patterns {
            let regex = Regex::new(&text).map_err(|source| ConfigError::BadRegex {
                name: name.clone(),
                source,
            })?;
            compiled_patterns.insert(name, regex);
        }

        let mut by_name = HashMap::new();
        let mut matchers = Vec::new();
        for (index, schema) in schemas.iter().enumerate() {
            by_name.insert(schema.name.clone(), index);
            for pattern in &schema.path_patterns {
                let glob = GlobBuilder::new(pattern)
                    .literal_separator(false)
                    .build()
                    .map_err(|source| ConfigError::BadGlob {
                        schema: schema.name.clone(),
                        pattern: pattern.clone(),
                        source,
                    })?;
                matchers.push(CompiledPattern {
                    matcher: glob.compile_matcher(),
                    literal_prefix: literal_prefix_len(pattern),
                    schema: index,
                });
            }
        }

        Ok(SchemaRegistry {
            schemas,
            by_name,
            patterns: compiled_patterns,
            matchers,
        })
    }

    /// Matches a workspace-relative path (POSIX separators). Longest literal
    /// prefix wins; remaining ties go to declaration order.
    pub fn schema_for(&self, rel_path: &str) -> Option<&Schema> {
        let path = rel_path.replace('\\', "/");
        let mut best: Option<(&CompiledPattern, usize)> = None;
        for compiled in &self.matchers {
            if !compiled.matcher.is_match(&path) {
                continue;
            }
            let order = self.schemas[compiled.schema].order;
            let better = match best {
                None => true,
                Some((current, current_order)) => {
                    compiled.literal_prefix > current.literal_prefix
                        || (compiled.literal_prefix == current.literal_prefix
                            && order < current_order)
                }
            };
            if better {
                best = Some((compiled, order));
            }
        }
        best.map(|(compiled, _)| &self.schemas[compiled.schema])
    }

    pub fn schema_named(&self, name: &str) -> Option<&Schema> {
        self.by_name.get(name).map(|&i| &self.schemas[i])
    }

    pub fn all_schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.iter()
    }

    pub fn pattern_named(&self, name: &str) -> Option<&Regex> {
        self.patterns.get(name)
    }
}

fn schema_name_of(text: &str) -> Option<String> {
    let value: serde_yaml::Value = serde_yaml::from_str(text).ok()?;
    value.get("name")?.as_str().map(str::to_string)
}

/// Bytes of the pattern before the first glob metacharacter.
fn literal_prefix_len(pattern: &str) -> usize {
    pattern
        .find(|c| matches!(c, '*' | '?' | '[' | '{'))
        .unwrap_or(pattern.len())
}
