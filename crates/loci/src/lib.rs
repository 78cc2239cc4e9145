//! A forward-time population genetics simulator with an embedded scripting
//! language.
//!
//! This crate re-exports the full public surface: the scripting runtime
//! (values, tokenizer, parser, interpreter and builtin library) and the
//! simulation core (chromosome model, per-generation life cycle, and the
//! host-object bridge between the two).

pub use loci_core::*;
pub use loci_error::{LociError, LociResult, ensure, loci_bail, loci_err};
pub use loci_script::*;
