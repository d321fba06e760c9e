use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{Chunk, DocumentId, DocumentInfo, MetadataFilter, RetrievalResult, StoreStats};

/// Tokenizer whose vocabulary matches the embedding provider, so chunk
/// sizes measured here line up with the provider's own limits.
pub trait TokenCodec: Send + Sync {
    fn name(&self) -> &str;
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
    fn decode(&self, tokens: &[u32]) -> Result<String>;
}

/// External embedding provider. Implementations return vectors of `dim()`
/// components, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn model_id(&self) -> &str;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::upstream(self.model_id(), "provider returned no embedding for the query"))
    }
}

/// External vector database holding chunks and their embeddings.
///
/// Similarity, index structure and persistence live behind this trait; the
/// core only translates chunks in and ranked results out.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Stores a document's chunks and returns its id (generated when `None`).
    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>], document_id: Option<DocumentId>) -> Result<DocumentId>;

    /// Nearest chunks by cosine similarity, best first.
    async fn search(&self, query_embedding: &[f32], top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<RetrievalResult>>;

    /// Removes every chunk of a document and returns how many were removed.
    async fn delete(&self, document_id: &str) -> Result<usize>;

    async fn get_all(&self) -> Result<Vec<Chunk>>;

    /// Chunks of one document in ordinal order.
    async fn get_document(&self, document_id: &str) -> Result<Vec<Chunk>>;

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Caller-side checks shared by every `ChunkStore::add` implementation.
pub fn validate_batch(chunks: &[Chunk], embeddings: &[Vec<f32>], dim: Option<usize>) -> Result<()> {
    if chunks.len() != embeddings.len() {
        return Err(Error::Validation(format!(
            "number of chunks ({}) must match number of embeddings ({})",
            chunks.len(),
            embeddings.len()
        )));
    }
    if let Some(dim) = dim {
        if let Some((i, e)) = embeddings.iter().enumerate().find(|(_, e)| e.len() != dim) {
            return Err(Error::Validation(format!("embedding {i} has {} dimensions, expected {dim}", e.len())));
        }
    }
    Ok(())
}
