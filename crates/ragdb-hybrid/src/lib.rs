//! ragdb-hybrid
//!
//! Reciprocal Rank Fusion, the vector retrieval adapter and the
//! `RetrievalContext` that runs both retrieval paths side by side.

pub mod fusion;
pub mod service;
pub mod vector;

pub use fusion::{candidate_breadth, fuse, rrf_contribution, FusionParams, DEFAULT_RRF_K};
pub use service::{IngestReport, RetrievalContext};
pub use vector::VectorRetriever;
