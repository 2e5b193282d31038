//! # jomini-base
//!
//! Structural atoms shared by the jomini-ls analysis crates.
//!
//! This crate provides the foundational types used throughout the language
//! server core:
//!
//! - [`Span`] — byte-offset source ranges
//! - [`Interner`]/[`Symbol`] — string interning for O(1) name comparison
//! - [`Diagnostic`]/[`Severity`] — the transport-independent diagnostic model
//! - [`codes`] — the stable diagnostic code inventory
//! - [`CancelToken`] — cooperative cancellation for long analyses
//!
//! It has no knowledge of the Jomini grammar, schemas, or the LSP protocol.

pub mod cancel;
pub mod codes;
pub mod intern;
pub mod report;
pub mod span;

pub use cancel::CancelToken;
pub use intern::{Interner, Symbol};
pub use report::{Diagnostic, FixHint, Related, Severity};
pub use span::Span;
