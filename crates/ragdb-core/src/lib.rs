//! ragdb-core
//!
//! Domain types, error taxonomy, configuration, the collaborator traits
//! (`TokenCodec`, `Embedder`, `ChunkStore`) and the token-window chunker.

pub mod chunking;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
