//! In-process chunk store with exact cosine search.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tracing::debug;

use ragdb_core::traits::{validate_batch, ChunkStore};
use ragdb_core::types::{Chunk, DocumentId, DocumentInfo, MetadataFilter, RetrievalResult, SourceKind, StoreStats};
use ragdb_core::{Error, Result};

use crate::{assign_document, cosine_similarity, summarize_documents};

struct Row {
	id: String,
	chunk: Chunk,
	embedding: Vec<f32>,
}

pub struct MemoryChunkStore {
	collection: String,
	dim: Option<usize>,
	rows: RwLock<Vec<Row>>,
}

impl MemoryChunkStore {
	/// `dim` of `None` accepts any vector width, as long as it matches the query.
	pub fn new(collection: impl Into<String>, dim: Option<usize>) -> Self {
		Self { collection: collection.into(), dim, rows: RwLock::new(Vec::new()) }
	}

	pub fn row_ids(&self) -> Vec<String> {
		self.rows.read().unwrap_or_else(PoisonError::into_inner).iter().map(|r| r.id.clone()).collect()
	}
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
	fn backend(&self) -> &'static str { "memory" }

	async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>], document_id: Option<DocumentId>) -> Result<DocumentId> {
		validate_batch(chunks, embeddings, self.dim)?;
		let (document_id, chunks) = assign_document(chunks, document_id);
		let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
		let before = rows.len();
		rows.retain(|r| r.chunk.document_id() != Some(document_id.as_str()));
		if rows.len() != before {
			debug!(document_id = %document_id, replaced = before - rows.len(), "replacing existing document");
		}
		for (i, (chunk, embedding)) in chunks.into_iter().zip(embeddings).enumerate() {
			rows.push(Row { id: format!("{document_id}_{i}"), chunk, embedding: embedding.clone() });
		}
		debug!(document_id = %document_id, chunks = embeddings.len(), "added chunks to memory store");
		Ok(document_id)
	}

	async fn search(&self, query_embedding: &[f32], top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<RetrievalResult>> {
		if let Some(dim) = self.dim {
			if query_embedding.len() != dim {
				return Err(Error::Validation(format!("query embedding has {} dimensions, expected {dim}", query_embedding.len())));
			}
		}
		let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
		let mut scored: Vec<(f64, &Row)> = rows
			.iter()
			.filter(|r| filter.map_or(true, |f| f.matches(&r.chunk.metadata)))
			.map(|r| (cosine_similarity(query_embedding, &r.embedding), r))
			.collect();
		scored.sort_by(|a, b| b.0.total_cmp(&a.0));
		Ok(scored
			.into_iter()
			.take(top_k)
			.map(|(score, r)| RetrievalResult::from_chunk(&r.chunk, score, SourceKind::Vector))
			.collect())
	}

	async fn delete(&self, document_id: &str) -> Result<usize> {
		let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
		let before = rows.len();
		rows.retain(|r| r.chunk.document_id() != Some(document_id));
		Ok(before - rows.len())
	}

	async fn get_all(&self) -> Result<Vec<Chunk>> {
		Ok(self.rows.read().unwrap_or_else(PoisonError::into_inner).iter().map(|r| r.chunk.clone()).collect())
	}

	async fn get_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
		let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
		Ok(rows.iter().filter(|r| r.chunk.document_id() == Some(document_id)).map(|r| r.chunk.clone()).collect())
	}

	async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
		let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
		Ok(summarize_documents(rows.iter().map(|r| &r.chunk)))
	}

	async fn stats(&self) -> Result<StoreStats> {
		let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
		let total_documents = summarize_documents(rows.iter().map(|r| &r.chunk)).len();
		Ok(StoreStats { total_chunks: rows.len(), total_documents, collection_name: self.collection.clone() })
	}
}
