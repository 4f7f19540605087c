//! Corpus-driven text morphing library.
//!
//! This crate grows a seed sentence word by word, combining:
//! - An index of every fixed-width word window of a corpus
//! - Word embeddings used to widen each context word to its neighbors
//! - Corpus verification of every widened hypothesis
//! - Weighted sampling with corpus-driven comma and period placement
//!
//! Binary caches (index records, embedding matrix, word ranks) are built
//! on first use and reloaded afterwards.

/// Corpus index, embedding engine and generation logic.
pub mod model;

/// Error type shared by all fallible operations.
pub mod error;

/// I/O utilities (file loading, path helpers, NUL-delimited reads).
///
/// Not exposed
pub(crate) mod io;
