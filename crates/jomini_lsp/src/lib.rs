//! # jomini-lsp
//!
//! Language Server Protocol front-end for the Jomini analysis core.
//!
//! The server speaks LSP over stdio and delegates all language knowledge to
//! `jomini-language`. What lives here:
//!
//! - [`server`] — the tower-lsp `LanguageServer` implementation and the
//!   per-document analysis coordinator (debounce, cancellation, timeout)
//! - [`state`]/[`document`] — live buffers vs. last completed analyses
//! - [`pipeline`] — one analysis run, panic-contained
//! - [`workspace`] — the cross-file symbol index with snapshot reads
//! - [`line_index`] — byte offset ↔ UTF-16 position conversion
//! - feature modules — [`completion`], [`hover`], [`definition`],
//!   [`references`], [`rename`], [`document_symbols`], [`code_actions`],
//!   [`diagnostics`]

pub mod code_actions;
pub mod completion;
pub mod definition;
pub mod diagnostics;
pub mod document;
pub mod document_symbols;
pub mod hover;
pub mod line_index;
pub mod pipeline;
pub mod references;
pub mod rename;
pub mod server;
pub mod state;
pub mod workspace;

pub use server::JominiServer;
pub use state::ServerState;
