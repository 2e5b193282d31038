//! Global server state, shared across all requests.
//!
//! Two document tables: `buffers` holds the live edit text (updated on every
//! keystroke), `documents` holds the last completed analysis (what queries
//! read). Both use `DashMap` for concurrent access without external locking.
//! Catalog and schema registry are immutable after startup; a schema reload
//! builds a fresh registry and swaps the `Arc`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use tower_lsp::lsp_types::Url;

use jomini_base::CancelToken;
use jomini_language::{Catalog, SchemaRegistry};

use crate::document::DocumentState;
use crate::pipeline::AnalysisInputs;
use crate::workspace::WorkspaceIndex;

/// The live text of an open document, ahead of analysis.
pub struct Buffer {
    pub text: String,
    pub version: i32,
    /// Token for the analysis currently in flight for this document, if any.
    pub cancel: CancelToken,
}

pub struct ServerState {
    pub buffers: DashMap<Url, Buffer>,
    pub documents: DashMap<Url, Arc<DocumentState>>,
    pub catalog: Arc<Catalog>,
    pub registry: RwLock<Arc<SchemaRegistry>>,
    pub index: Arc<WorkspaceIndex>,
    pub keywords: Arc<HashSet<String>>,
    pub workspace_root: RwLock<Option<PathBuf>>,
}

impl ServerState {
    /// Fails only on configuration errors (malformed embedded tables), which
    /// are fatal by design.
    pub fn new() -> Result<Self, jomini_language::ConfigError> {
        let catalog = Arc::new(Catalog::load_embedded()?);
        let registry = Arc::new(SchemaRegistry::load_embedded()?);
        let keywords = Arc::new(catalog.keyword_set());
        Ok(ServerState {
            buffers: DashMap::new(),
            documents: DashMap::new(),
            catalog,
            registry: RwLock::new(registry),
            index: Arc::new(WorkspaceIndex::new()),
            keywords,
            workspace_root: RwLock::new(None),
        })
    }

    pub fn registry(&self) -> Arc<SchemaRegistry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Snapshot of everything an analysis run needs.
    pub fn analysis_inputs(&self) -> AnalysisInputs {
        AnalysisInputs {
            catalog: self.catalog.clone(),
            registry: self.registry(),
            snapshot: self.index.snapshot(),
            keywords: self.keywords.clone(),
        }
    }

    /// Workspace-relative POSIX path for schema matching. Falls back to the
    /// URI's trailing segments when the file is outside the workspace.
    pub fn rel_path(&self, uri: &Url) -> String {
        let root = self.workspace_root.read().unwrap_or_else(|e| e.into_inner());
        if let (Some(root), Ok(path)) = (root.as_ref(), uri.to_file_path()) {
            if let Ok(rel) = path.strip_prefix(root) {
                return rel.to_string_lossy().replace('\\', "/");
            }
        }
        uri.path().trim_start_matches('/').to_string()
    }

    /// Open documents whose last analysis referenced any of `names`.
    pub fn dependents_of(
        &self,
        names: &[(jomini_language::SymbolKind, String)],
        except: &Url,
    ) -> Vec<Url> {
        let mut out = Vec::new();
        for entry in self.documents.iter() {
            if entry.key() == except {
                continue;
            }
            let referenced = &entry.value().referenced;
            if names
                .iter()
                .any(|(kind, name)| referenced.iter().any(|(k, n)| k == kind && n == name))
            {
                out.push(entry.key().clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_loads_embedded_configuration() {
        let state = ServerState::new().expect("embedded configuration must load");
        assert!(state.catalog.is_effect("add_gold"));
        assert!(state.registry().schema_named("events").is_some());
    }

    #[test]
    fn rel_path_strips_workspace_root() {
        let state = ServerState::new().unwrap();
        *state.workspace_root.write().unwrap() = Some(PathBuf::from("/ws/mod"));
        let uri = Url::parse("file:///ws/mod/events/a.txt").unwrap();
        assert_eq!(state.rel_path(&uri), "events/a.txt");
    }

    #[test]
    fn rel_path_without_root_uses_uri_path() {
        let state = ServerState::new().unwrap();
        let uri = Url::parse("file:///somewhere/events/a.txt").unwrap();
        assert_eq!(state.rel_path(&uri), "somewhere/events/a.txt");
    }
}
