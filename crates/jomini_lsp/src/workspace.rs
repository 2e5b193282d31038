//! The workspace-wide symbol index.
//!
//! Single writer, snapshot readers: every mutation rebuilds an immutable
//! [`IndexSnapshot`] behind an `Arc`, so validation phases read a coherent
//! index without blocking writes. Per-file ownership lists make invalidation
//! O(symbols-in-file) instead of a global sweep.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use sha2::{Digest, Sha256};
use tower_lsp::lsp_types::{Range, Url};
use walkdir::WalkDir;

use jomini_base::{codes, Diagnostic, Span};
use jomini_language::localization::{key_namespace, parse_localization};
use jomini_language::schema::{IdSource, SchemaRegistry};
use jomini_language::{parse, Block, SymbolKind, SymbolLookup, Value};

use crate::line_index::LineIndex;

/// Maximum Damerau-Levenshtein distance for "did you mean" suggestions.
const SUGGEST_DISTANCE: usize = 2;

/// One definition site of an indexed symbol.
///
/// Carries both the byte span and the LSP range: the range is computed at
/// extraction time, while the defining file's text is still at hand, so
/// cross-file Locations never need a re-read.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSite {
    pub kind: SymbolKind,
    pub name: String,
    pub file: Url,
    pub span: Span,
    pub range: Range,
    pub detail: Option<String>,
}

/// Immutable view of the index at one point in time.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    by_kind: HashMap<SymbolKind, HashMap<String, Vec<SymbolSite>>>,
}

impl IndexSnapshot {
    /// All definition sites of `(kind, name)`, in insertion order.
    pub fn sites(&self, kind: SymbolKind, name: &str) -> &[SymbolSite] {
        self.by_kind
            .get(&kind)
            .and_then(|names| names.get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn names_of_kind(&self, kind: SymbolKind) -> impl Iterator<Item = &str> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flat_map(|names| names.keys().map(String::as_str))
    }

    /// Names of `kind` defined at more than one site.
    pub fn duplicates(&self, kind: SymbolKind) -> impl Iterator<Item = (&str, &[SymbolSite])> {
        self.by_kind.get(&kind).into_iter().flat_map(|names| {
            names
                .iter()
                .filter(|(_, sites)| sites.len() > 1)
                .map(|(name, sites)| (name.as_str(), sites.as_slice()))
        })
    }

    /// Symbols defined by one file, for document queries.
    pub fn sites_in_file<'a>(&'a self, file: &'a Url) -> impl Iterator<Item = &'a SymbolSite> {
        self.by_kind
            .values()
            .flat_map(|names| names.values())
            .flatten()
            .filter(move |site| &site.file == file)
    }
}

impl SymbolLookup for IndexSnapshot {
    fn contains(&self, kind: SymbolKind, name: &str) -> bool {
        !self.sites(kind, name).is_empty()
    }

    /// Fuzzy match within the same namespace: at most two edits away, or a
    /// truncation of one another (`my_event.0001.t` for `my_event.0001.title`).
    fn suggest(&self, kind: SymbolKind, name: &str) -> Option<String> {
        let namespace = key_namespace(name);
        let mut best: Option<(usize, &str)> = None;
        for candidate in self.names_of_kind(kind) {
            if candidate == name || key_namespace(candidate) != namespace {
                continue;
            }
            let distance = strsim::damerau_levenshtein(name, candidate);
            let is_truncation = name.starts_with(candidate) || candidate.starts_with(name);
            if distance > SUGGEST_DISTANCE && !is_truncation {
                continue;
            }
            if best.map(|(d, _)| distance < d).unwrap_or(true) {
                best = Some((distance, candidate));
            }
        }
        best.map(|(_, candidate)| candidate.to_string())
    }
}

#[derive(Default)]
struct IndexData {
    sites: HashMap<SymbolKind, HashMap<String, Vec<SymbolSite>>>,
    /// What each file currently owns, for cheap invalidation.
    ownership: HashMap<Url, Vec<(SymbolKind, String)>>,
    /// Content hash of the last extraction per file.
    hashes: HashMap<Url, [u8; 32]>,
}

/// The mutable index. All writes go through `&self` methods that publish a
/// fresh snapshot atomically.
#[derive(Default)]
pub struct WorkspaceIndex {
    data: Mutex<IndexData>,
    snapshot: RwLock<Arc<IndexSnapshot>>,
}

impl WorkspaceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cheap: clones the current `Arc`.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replaces everything `file` owns with `symbols`. Returns the set of
    /// qualified names whose definition sites changed (added or removed),
    /// which drives cross-file reanalysis.
    pub fn apply_file(&self, file: &Url, symbols: Vec<SymbolSite>) -> Vec<(SymbolKind, String)> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let mut changed: Vec<(SymbolKind, String)> = Vec::new();

        if let Some(owned) = data.ownership.remove(file) {
            for (kind, name) in owned {
                if let Some(names) = data.sites.get_mut(&kind) {
                    if let Some(sites) = names.get_mut(&name) {
                        sites.retain(|site| &site.file != file);
                        if sites.is_empty() {
                            names.remove(&name);
                        }
                    }
                }
                changed.push((kind, name));
            }
        }

        let mut owned = Vec::with_capacity(symbols.len());
        for site in symbols {
            owned.push((site.kind, site.name.clone()));
            changed.push((site.kind, site.name.clone()));
            data.sites
                .entry(site.kind)
                .or_default()
                .entry(site.name.clone())
                .or_default()
                .push(site);
        }
        data.ownership.insert(file.clone(), owned);

        self.publish(&data);
        changed.sort_by(|a, b| (a.0 as u8, a.1.as_str()).cmp(&(b.0 as u8, b.1.as_str())));
        changed.dedup();
        changed
    }

    pub fn remove_file(&self, file: &Url) -> Vec<(SymbolKind, String)> {
        let changed = self.apply_file(file, Vec::new());
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.ownership.remove(file);
        data.hashes.remove(file);
        changed
    }

    /// True when `text` differs from what was last extracted for `file`;
    /// records the new hash.
    pub fn content_changed(&self, file: &Url, text: &str) -> bool {
        let digest: [u8; 32] = Sha256::digest(text.as_bytes()).into();
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        match data.hashes.insert(file.clone(), digest) {
            Some(previous) => previous != digest,
            None => true,
        }
    }

    fn publish(&self, data: &IndexData) {
        let snapshot = IndexSnapshot {
            by_kind: data.sites.clone(),
        };
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(snapshot);
    }

    /// Cross-file duplicate diagnostics for `file`: currently duplicate event
    /// ids, each related to every other definition site. Produced as LSP
    /// diagnostics directly, since the related ranges live in other files
    /// whose line indexes only existed at extraction time.
    pub fn duplicate_diagnostics(&self, file: &Url) -> Vec<tower_lsp::lsp_types::Diagnostic> {
        use tower_lsp::lsp_types::{
            DiagnosticRelatedInformation, DiagnosticSeverity, Location, NumberOrString,
        };
        let snapshot = self.snapshot();
        let mut out = Vec::new();
        for (name, sites) in snapshot.duplicates(SymbolKind::Event) {
            for site in sites.iter().filter(|s| &s.file == file) {
                let related: Vec<DiagnosticRelatedInformation> = sites
                    .iter()
                    .filter(|s| *s != site)
                    .map(|other| DiagnosticRelatedInformation {
                        location: Location {
                            uri: other.file.clone(),
                            range: other.range,
                        },
                        message: "also defined here".to_string(),
                    })
                    .collect();
                out.push(tower_lsp::lsp_types::Diagnostic {
                    range: site.range,
                    severity: Some(DiagnosticSeverity::ERROR),
                    code: Some(NumberOrString::String(codes::DUPLICATE_EVENT_ID.to_string())),
                    source: Some("jomini-ls".to_string()),
                    message: format!("event `{}` is defined more than once", name),
                    related_information: Some(related),
                    ..Default::default()
                });
            }
        }
        out
    }
}

/// Pulls the indexable symbols out of a parsed script file, per the schema's
/// `symbols` declaration.
pub fn extract_script_symbols(
    root: &Block,
    source: &str,
    file: &Url,
    registry: &SchemaRegistry,
    rel_path: &str,
) -> Vec<SymbolSite> {
    let Some(schema) = registry.schema_for(rel_path) else {
        return Vec::new();
    };
    let Some(decl) = &schema.symbols else {
        return Vec::new();
    };
    let Some(kind) = SymbolKind::from_decl_name(&decl.kind) else {
        return Vec::new();
    };

    let line_index = LineIndex::new(source);
    let mut out = Vec::new();
    for entry in &root.entries {
        let Value::Block(block) = &entry.value else {
            continue;
        };
        let name = match &decl.id_from {
            IdSource::BlockKey => Some(entry.key.clone()),
            IdSource::Field(field) => block.scalar_of(field).map(str::to_string),
        };
        if let Some(name) = name {
            out.push(SymbolSite {
                kind,
                name,
                file: file.clone(),
                span: entry.key_span,
                range: line_index.range(entry.key_span),
                detail: block.scalar_of("type").map(str::to_string),
            });
        }
    }
    out
}

/// Localization `.yml` files become `LocalizationKey` sites.
pub fn extract_localization_symbols(source: &str, file: &Url) -> (Vec<SymbolSite>, Vec<Diagnostic>) {
    let parsed = parse_localization(source);
    let line_index = LineIndex::new(source);
    let sites = parsed
        .entries
        .into_iter()
        .map(|entry| SymbolSite {
            kind: SymbolKind::LocalizationKey,
            name: entry.key,
            file: file.clone(),
            span: entry.key_span,
            range: line_index.range(entry.key_span),
            detail: Some(entry.value),
        })
        .collect();
    (sites, parsed.diagnostics)
}

/// Whether a workspace path belongs to the localization tree.
pub fn is_localization_path(rel_path: &str) -> bool {
    let normalized = rel_path.replace('\\', "/");
    normalized.ends_with(".yml")
        && (normalized.starts_with("localization/") || normalized.contains("/localization/"))
}

/// Initial workspace scan: walks `root`, indexes every schema-matched script
/// file and localization bundle. Returns the number of files indexed.
pub fn scan_workspace(root: &Path, registry: &SchemaRegistry, index: &WorkspaceIndex) -> usize {
    let mut indexed = 0usize;
    for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel_path = rel.to_string_lossy().replace('\\', "/");
        let Ok(url) = Url::from_file_path(entry.path()) else {
            continue;
        };

        if is_localization_path(&rel_path) {
            if let Ok(text) = std::fs::read_to_string(entry.path()) {
                if index.content_changed(&url, &text) {
                    let (sites, _diags) = extract_localization_symbols(&text, &url);
                    index.apply_file(&url, sites);
                    indexed += 1;
                }
            }
            continue;
        }

        if registry
            .schema_for(&rel_path)
            .and_then(|s| s.symbols.as_ref())
            .is_none()
        {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        if !index.content_changed(&url, &text) {
            continue;
        }
        let doc = parse(&text);
        let sites = extract_script_symbols(&doc.root, &text, &url, registry, &rel_path);
        index.apply_file(&url, sites);
        indexed += 1;
    }
    log::info!("workspace scan indexed {} files under {}", indexed, root.display());
    indexed
}
