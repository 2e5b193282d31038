//! The per-document analysis pipeline.
//!
//! One run: parse → schema resolve → composed validation walk → merged,
//! stable-sorted diagnostics → document state. The server layer wraps this
//! in debounce, cancellation, and the hard timeout; a panic anywhere in the
//! analysis is contained here and surfaced as a single internal diagnostic
//! instead of taking the server down.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tower_lsp::lsp_types::Url;

use jomini_base::{codes, CancelToken, Diagnostic, Severity, Span};
use jomini_language::{
    analyze_document, parse_with_keywords, Catalog, SchemaRegistry,
};

use crate::document::DocumentState;
use crate::line_index::LineIndex;
use crate::workspace::{self, IndexSnapshot};

/// Immutable inputs shared by every analysis run.
pub struct AnalysisInputs {
    pub catalog: Arc<Catalog>,
    pub registry: Arc<SchemaRegistry>,
    pub snapshot: Arc<IndexSnapshot>,
    /// Catalog keyword set for the parser's merged-identifier check.
    pub keywords: Arc<HashSet<String>>,
}

/// Runs the full pipeline for one document revision.
pub fn analyze(
    uri: &Url,
    rel_path: &str,
    source: &str,
    version: i32,
    inputs: &AnalysisInputs,
    cancel: &CancelToken,
) -> DocumentState {
    if workspace::is_localization_path(rel_path) {
        return analyze_localization(uri, rel_path, source, version);
    }

    let doc = parse_with_keywords(source, Some(inputs.keywords.as_ref()));
    let outcome = analyze_document(
        &doc,
        rel_path,
        &inputs.registry,
        &inputs.catalog,
        inputs.snapshot.as_ref(),
        cancel,
    );

    DocumentState {
        uri: uri.clone(),
        rel_path: rel_path.to_string(),
        source: source.to_string(),
        version,
        line_index: LineIndex::new(source),
        ast: Some(doc),
        diagnostics: outcome.diagnostics,
        declared: outcome.declared,
        referenced: outcome.referenced,
    }
}

fn analyze_localization(uri: &Url, rel_path: &str, source: &str, version: i32) -> DocumentState {
    let parsed = jomini_language::localization::parse_localization(source);
    DocumentState {
        uri: uri.clone(),
        rel_path: rel_path.to_string(),
        source: source.to_string(),
        version,
        line_index: LineIndex::new(source),
        ast: None,
        diagnostics: jomini_base::report::finalize(parsed.diagnostics),
        declared: Vec::new(),
        referenced: Vec::new(),
    }
}

/// Panic-contained variant: a crashing subsystem yields a document whose only
/// diagnostic is the internal-failure marker, so sibling documents and the
/// server keep running.
pub fn analyze_guarded(
    uri: &Url,
    rel_path: &str,
    source: &str,
    version: i32,
    inputs: &AnalysisInputs,
    cancel: &CancelToken,
) -> DocumentState {
    let result = catch_unwind(AssertUnwindSafe(|| {
        analyze(uri, rel_path, source, version, inputs, cancel)
    }));
    match result {
        Ok(state) => state,
        Err(_) => {
            log::error!("analysis panicked for {}", uri);
            DocumentState {
                uri: uri.clone(),
                rel_path: rel_path.to_string(),
                source: source.to_string(),
                version,
                line_index: LineIndex::new(source),
                ast: None,
                diagnostics: vec![internal_diagnostic("analysis failed internally")],
                declared: Vec::new(),
                referenced: Vec::new(),
            }
        }
    }
}

/// The `CK-internal` diagnostic used for timeouts and contained panics,
/// anchored at the start of the document.
pub fn internal_diagnostic(message: &str) -> Diagnostic {
    Diagnostic::new(Severity::Warning, codes::INTERNAL, Span::new(0, 0), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jomini_language::SymbolKind;
    use crate::workspace::WorkspaceIndex;

    fn inputs() -> AnalysisInputs {
        let catalog = Arc::new(Catalog::load_embedded().unwrap());
        let keywords = Arc::new(catalog.keyword_set());
        AnalysisInputs {
            catalog,
            registry: Arc::new(SchemaRegistry::load_embedded().unwrap()),
            snapshot: WorkspaceIndex::new().snapshot(),
            keywords,
        }
    }

    fn uri() -> Url {
        Url::parse("file:///ws/events/test.txt").unwrap()
    }

    #[test]
    fn pipeline_produces_document_state() {
        let state = analyze(
            &uri(),
            "events/test.txt",
            "namespace = t\nt.1 = { hidden = yes }\n",
            3,
            &inputs(),
            &CancelToken::new(),
        );
        assert_eq!(state.version, 3);
        assert!(state.ast.is_some());
        assert_eq!(state.declared.len(), 1);
        assert_eq!(state.declared[0].kind, SymbolKind::Event);
    }

    #[test]
    fn analysis_twice_is_byte_identical() {
        let source = "namespace = t\nt.1 = { trigger = { add_gold = 1 } }\n";
        let inputs = inputs();
        let first = analyze(&uri(), "events/test.txt", source, 1, &inputs, &CancelToken::new());
        let second = analyze(&uri(), "events/test.txt", source, 1, &inputs, &CancelToken::new());
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn localization_path_uses_line_grammar() {
        let state = analyze(
            &Url::parse("file:///ws/localization/english/t_l_english.yml").unwrap(),
            "localization/english/t_l_english.yml",
            "l_english:\n key:0 \"v\"\n",
            1,
            &inputs(),
            &CancelToken::new(),
        );
        assert!(state.ast.is_none());
        assert!(state
            .diagnostics
            .iter()
            .any(|d| d.code == codes::LOC_MISSING_BOM));
    }

    #[test]
    fn internal_diagnostic_is_anchored_at_start() {
        let diag = internal_diagnostic("analysis timed out after 5s");
        assert_eq!(diag.code, codes::INTERNAL);
        assert_eq!(diag.span, Span::new(0, 0));
    }
}
