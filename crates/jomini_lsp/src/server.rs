//! The tower-lsp server and the per-document analysis coordinator.
//!
//! Each document has at most one analysis in flight. An edit cancels the
//! previous run, replaces the buffer, and schedules a new run after the
//! debounce window (zero on open/save). Results are version-gated: a run
//! superseded by a newer edit is discarded whole, never published partially.

use std::sync::Arc;
use std::time::Duration;

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use jomini_base::CancelToken;

use crate::document::DocumentState;
use crate::line_index::LineIndex;
use crate::state::{Buffer, ServerState};
use crate::workspace;
use crate::{code_actions, completion, definition, diagnostics, document_symbols, hover, pipeline, references, rename};

/// Debounce window between an edit and its analysis.
const DEBOUNCE_MS: u64 = 250;
/// Hard cap on a single document analysis.
const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(5);

pub struct JominiServer {
    client: Client,
    state: Arc<ServerState>,
}

impl JominiServer {
    pub fn new(client: Client, state: Arc<ServerState>) -> Self {
        JominiServer { client, state }
    }

    fn document(&self, uri: &Url) -> Option<Arc<DocumentState>> {
        self.state.documents.get(uri).map(|d| d.value().clone())
    }
}

/// Schedules one analysis run for `uri`. Free function so completed runs can
/// schedule dependent documents without borrowing the server.
fn spawn_analysis(state: Arc<ServerState>, client: Client, uri: Url, debounce_ms: u64) {
    let (text, version, cancel) = {
        let Some(mut buffer) = state.buffers.get_mut(&uri) else {
            return;
        };
        // Supersede whatever was running for this document.
        buffer.cancel.cancel();
        buffer.cancel = CancelToken::new();
        (buffer.text.clone(), buffer.version, buffer.cancel.clone())
    };

    tokio::spawn(async move {
        if debounce_ms > 0 {
            tokio::time::sleep(Duration::from_millis(debounce_ms)).await;
        }
        let still_current = state
            .buffers
            .get(&uri)
            .map(|b| b.version == version)
            .unwrap_or(false);
        if !still_current || cancel.is_cancelled() {
            return;
        }

        let rel_path = state.rel_path(&uri);
        let inputs = state.analysis_inputs();
        let run_uri = uri.clone();
        let run_text = text.clone();
        let run_rel = rel_path.clone();
        let run_cancel = cancel.clone();

        let outcome = tokio::time::timeout(
            ANALYSIS_TIMEOUT,
            tokio::task::spawn_blocking(move || {
                pipeline::analyze_guarded(
                    &run_uri, &run_rel, &run_text, version, &inputs, &run_cancel,
                )
            }),
        )
        .await;

        let document = match outcome {
            Ok(Ok(document)) => document,
            Ok(Err(join_error)) => {
                log::error!("analysis task failed for {}: {}", uri, join_error);
                return;
            }
            Err(_elapsed) => {
                cancel.cancel();
                log::warn!("analysis timed out for {}", uri);
                DocumentState {
                    uri: uri.clone(),
                    rel_path,
                    source: text.clone(),
                    version,
                    line_index: LineIndex::new(&text),
                    ast: None,
                    diagnostics: vec![pipeline::internal_diagnostic(
                        "analysis timed out after 5s; diagnostics for this file are incomplete",
                    )],
                    declared: Vec::new(),
                    referenced: Vec::new(),
                }
            }
        };

        // Discard entirely if a newer edit arrived while we were running.
        let still_current = state
            .buffers
            .get(&uri)
            .map(|b| b.version == version)
            .unwrap_or(false);
        if !still_current {
            return;
        }

        // Index delta before publishing, so duplicate detection sees the
        // new definitions.
        let sites = if workspace::is_localization_path(&document.rel_path) {
            workspace::extract_localization_symbols(&document.source, &uri).0
        } else {
            document
                .declared
                .iter()
                .map(|declared| workspace::SymbolSite {
                    kind: declared.kind,
                    name: declared.name.clone(),
                    file: uri.clone(),
                    span: declared.span,
                    range: document.line_index.range(declared.span),
                    detail: declared.detail.clone(),
                })
                .collect()
        };
        let changed = state.index.apply_file(&uri, sites);

        let document = Arc::new(document);
        state.documents.insert(uri.clone(), document.clone());

        let mut lsp_diagnostics =
            diagnostics::convert_all(&document.diagnostics, &document.line_index, &uri);
        lsp_diagnostics.extend(state.index.duplicate_diagnostics(&uri));
        client
            .publish_diagnostics(uri.clone(), lsp_diagnostics, Some(version))
            .await;

        // Coarse cross-file reanalysis: documents that referenced a name
        // whose definition set just changed.
        if !changed.is_empty() {
            for dependent in state.dependents_of(&changed, &uri) {
                spawn_analysis(state.clone(), client.clone(), dependent, 0);
            }
        }
    });
}

#[tower_lsp::async_trait]
impl LanguageServer for JominiServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(root) = params
            .root_uri
            .as_ref()
            .and_then(|uri| uri.to_file_path().ok())
        {
            *self
                .state
                .workspace_root
                .write()
                .unwrap_or_else(|e| e.into_inner()) = Some(root);
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string(), ":".to_string()]),
                    ..Default::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: Default::default(),
                })),
                document_symbol_provider: Some(OneOf::Left(true)),
                code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "jomini-ls".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("jomini-ls initialized");
        let root = self
            .state
            .workspace_root
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(root) = root {
            let state = self.state.clone();
            tokio::task::spawn_blocking(move || {
                let registry = state.registry();
                workspace::scan_workspace(&root, &registry, &state.index);
            });
        }
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.state.buffers.insert(
            uri.clone(),
            Buffer {
                text: params.text_document.text,
                version: params.text_document.version,
                cancel: CancelToken::new(),
            },
        );
        spawn_analysis(self.state.clone(), self.client.clone(), uri, 0);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        // FULL sync: exactly one change carrying the whole text.
        let Some(change) = params.content_changes.into_iter().next() else {
            return;
        };
        if let Some(mut buffer) = self.state.buffers.get_mut(&uri) {
            buffer.text = change.text;
            buffer.version = params.text_document.version;
        }
        spawn_analysis(self.state.clone(), self.client.clone(), uri, DEBOUNCE_MS);
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        spawn_analysis(
            self.state.clone(),
            self.client.clone(),
            params.text_document.uri,
            0,
        );
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some((_, buffer)) = self.state.buffers.remove(&uri) {
            buffer.cancel.cancel();
        }
        self.state.documents.remove(&uri);
        // The file still exists on disk; its indexed symbols stay.
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let Some(doc) = self.document(uri) else {
            return Ok(None);
        };
        Ok(completion::completions(
            &doc,
            params.text_document_position.position,
            &self.state,
        ))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let Some(doc) = self.document(uri) else {
            return Ok(None);
        };
        Ok(hover::hover(
            &doc,
            params.text_document_position_params.position,
            &self.state,
        ))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let Some(doc) = self.document(uri) else {
            return Ok(None);
        };
        Ok(definition::goto_definition(
            &doc,
            params.text_document_position_params.position,
            &self.state,
        ))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = &params.text_document_position.text_document.uri;
        let Some(doc) = self.document(uri) else {
            return Ok(None);
        };
        let locations = references::find_references(
            &doc,
            params.text_document_position.position,
            &self.state,
            params.context.include_declaration,
        );
        Ok(if locations.is_empty() {
            None
        } else {
            Some(locations)
        })
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        let Some(doc) = self.document(&params.text_document.uri) else {
            return Ok(None);
        };
        Ok(
            rename::prepare_rename(&doc, params.position, &self.state).map(|(range, text)| {
                PrepareRenameResponse::RangeWithPlaceholder {
                    range,
                    placeholder: text,
                }
            }),
        )
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let uri = &params.text_document_position.text_document.uri;
        let Some(doc) = self.document(uri) else {
            return Ok(None);
        };
        Ok(rename::rename(
            &doc,
            params.text_document_position.position,
            params.new_name,
            &self.state,
        ))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let Some(doc) = self.document(&params.text_document.uri) else {
            return Ok(None);
        };
        let symbols = document_symbols::document_symbols(&doc);
        Ok(if symbols.is_empty() {
            None
        } else {
            Some(DocumentSymbolResponse::Nested(symbols))
        })
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = &params.text_document.uri;
        let Some(doc) = self.document(uri) else {
            return Ok(None);
        };
        let actions = code_actions::code_actions(&doc, params.range, uri);
        Ok(if actions.is_empty() {
            None
        } else {
            Some(actions)
        })
    }
}
