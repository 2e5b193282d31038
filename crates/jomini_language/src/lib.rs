//! # jomini-language
//!
//! Analysis engine for the Jomini scripting dialect used by Crusader Kings
//! III mods. This crate is the protocol-independent core behind the language
//! server:
//!
//! - [`lexer`]/[`parser`]/[`ast`] — total, position-accurate parsing with
//!   brace-boundary error recovery
//! - [`schema`] — declarative YAML file-type schemas (inheritance, variables,
//!   path patterns) and their compiled registry
//! - [`catalog`] — immutable tables of known effects, triggers, scope links,
//!   iterator lists, animations, themes, and traits
//! - [`scope_engine`] — scope-chain resolution, saved scopes, evaluation
//!   phases, and the scope-timing rule
//! - [`validator`] — the schema-driven block validator
//! - [`generic_rules`] — file-type-agnostic invariants
//! - [`localization`] — the line-oriented `.yml` localization grammar
//! - [`analysis`] — the composed single-preorder walk tying it all together
//!
//! Nothing in this crate knows about LSP types, documents, or transports;
//! the `jomini-lsp` crate owns those.

pub mod analysis;
pub mod ast;
pub mod catalog;
pub mod config;
pub mod generic_rules;
pub mod lexer;
pub mod localization;
pub mod parser;
pub mod schema;
pub mod scope_engine;
pub mod symbols;
pub mod token;
pub mod validator;

pub use analysis::{analyze_document, context_at, AnalysisOutcome, CursorContext};
pub use ast::{node_at, Block, Entry, Scalar, Value};
pub use catalog::{Catalog, ScopeType};
pub use config::ConfigError;
pub use parser::{parse, parse_with_keywords, ParseOutput};
pub use schema::SchemaRegistry;
pub use symbols::{DeclaredSymbol, SymbolKind, SymbolLookup};
