//! ragdb-vector
//!
//! `ChunkStore` backends: an in-process store and, behind the `lance` feature,
//! a LanceDB table. [`open_store`] picks one from `vector_store.backend`.

use std::sync::Arc;

use ragdb_core::config::{expand_path, VectorBackend, VectorStoreSettings};
use ragdb_core::traits::ChunkStore;
use ragdb_core::types::{Chunk, DocumentId, DocumentInfo};
use ragdb_core::Result;

#[cfg(feature = "lance")]
pub mod lance;
pub mod memory;
#[cfg(feature = "lance")]
pub mod schema;

#[cfg(feature = "lance")]
pub use lance::LanceChunkStore;
pub use memory::MemoryChunkStore;

pub async fn open_store(settings: &VectorStoreSettings, dim: usize) -> Result<Arc<dyn ChunkStore>> {
	match settings.backend {
		VectorBackend::Memory => {
			tracing::info!(collection = %settings.collection, "using in-memory chunk store");
			Ok(Arc::new(MemoryChunkStore::new(settings.collection.clone(), Some(dim))))
		}
		#[cfg(feature = "lance")]
		VectorBackend::Lance => {
			let uri = expand_path(&settings.uri);
			let store = LanceChunkStore::open(&uri.to_string_lossy(), &settings.collection, dim).await?;
			tracing::info!(uri = %uri.display(), collection = %settings.collection, "using LanceDB chunk store");
			Ok(Arc::new(store))
		}
		#[cfg(not(feature = "lance"))]
		VectorBackend::Lance => Err(ragdb_core::Error::InvalidConfig(format!(
			"vector_store.backend = \"lance\" ({}) requires building with the `lance` feature",
			expand_path(&settings.uri).display()
		))),
	}
}

/// Picks the document id (fresh UUID v4 when absent) and stamps it into
/// every chunk's metadata.
pub(crate) fn assign_document(chunks: &[Chunk], document_id: Option<DocumentId>) -> (DocumentId, Vec<Chunk>) {
	let document_id = document_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
	let chunks = chunks
		.iter()
		.cloned()
		.map(|mut c| {
			c.metadata.document_id = Some(document_id.clone());
			c
		})
		.collect();
	(document_id, chunks)
}

/// Cosine similarity in f64; zero when either vector is all zeros or widths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
	if a.len() != b.len() {
		return 0.0;
	}
	let (mut dot, mut na, mut nb) = (0f64, 0f64, 0f64);
	for (x, y) in a.iter().zip(b) {
		let (x, y) = (f64::from(*x), f64::from(*y));
		dot += x * y;
		na += x * x;
		nb += y * y;
	}
	if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na.sqrt() * nb.sqrt()) }
}

/// One entry per distinct `document_id`, in first-seen order. Chunks without
/// a document id are not counted as a document.
pub(crate) fn summarize_documents<'a>(chunks: impl Iterator<Item = &'a Chunk>) -> Vec<DocumentInfo> {
	let mut docs: Vec<DocumentInfo> = Vec::new();
	for c in chunks {
		let Some(id) = c.document_id() else { continue };
		match docs.iter_mut().find(|d| d.document_id == id) {
			Some(d) => d.chunk_count += 1,
			None => docs.push(DocumentInfo {
				document_id: id.to_string(),
				filename: c.metadata.filename.clone(),
				file_type: c.metadata.file_type.clone(),
				upload_timestamp: c.metadata.upload_timestamp,
				chunk_count: 1,
			}),
		}
	}
	docs
}
