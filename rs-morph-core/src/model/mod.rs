//! Top-level module for the morphing text generator.
//!
//! This module groups:
//! - The sorted n-gram record index over the corpus (`CorpusIndex`)
//! - The word embedding engine with its neighbor cache (`EmbeddingEngine`)
//! - Word frequency ranks turned into scores (`WordRank`)
//! - Hypothesis bookkeeping, ranking and truncation
//! - A high-level generation interface (`TextGenerator`)

/// Sorted fixed-width word records with prefix interval search.
///
/// Supports building from a corpus file, binary persistence and
/// incremental multi-word narrowing through `PrefixCursor`.
pub mod corpus_index;

/// Exponential curve fitted through two points.
pub mod curve;

/// Embedding matrix with unit-normalized rows.
///
/// Loads text or binary vector files and answers nearest-neighbor
/// queries, caching results per word.
pub mod embedding;

/// Sentence generation driving the index and the embedding engine.
pub mod generator;

/// Verified hypotheses: multiplicity accounting, similarity ranking and
/// truncation to the requested number of matches.
pub mod hypothesis;

/// Generator tunables, deserializable from a parameter file.
pub mod params;

/// Word scores derived from a frequency-ranked word list.
pub mod word_rank;

/// Word-level helpers (stemming, punctuation counting).
/// This module is not exposed publicly.
mod words;
