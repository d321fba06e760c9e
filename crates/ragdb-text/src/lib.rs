//! ragdb-text
//!
//! From-scratch BM25 keyword retrieval: whitespace tokenizer, Okapi scorer and
//! an incrementally updated, snapshot-isolated `KeywordIndex`.

pub mod bm25;
pub mod index;
pub mod tokenize;

pub use bm25::{Bm25Index, Bm25Params};
pub use index::{KeywordIndex, Snapshot};
