//! Incrementally maintained keyword index.
//!
//! Chunks are kept per document in insertion order. BM25 statistics are not
//! updated on every write: a mutation bumps the version, and the next reader
//! rebuilds an immutable [`Snapshot`] under the write lock. Readers hold an
//! `Arc` to the snapshot they scored against, so concurrent deletes never
//! change a ranking mid-query.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use ragdb_core::types::{Chunk, RetrievalResult, SourceKind};

use crate::bm25::{Bm25Index, Bm25Params};

pub struct Snapshot {
	version: u64,
	chunks: Vec<Chunk>,
	bm25: Bm25Index,
}

impl Snapshot {
	fn build(version: u64, chunks: Vec<Chunk>, params: Bm25Params) -> Self {
		let bm25 = Bm25Index::build(&chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>(), params);
		Self { version, chunks, bm25 }
	}

	pub fn version(&self) -> u64 { self.version }

	pub fn chunks(&self) -> &[Chunk] { &self.chunks }

	pub fn bm25(&self) -> &Bm25Index { &self.bm25 }

	pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievalResult> {
		if self.chunks.is_empty() {
			debug!("keyword index is empty");
			return Vec::new();
		}
		self.bm25
			.top_k(query, top_k)
			.into_iter()
			.map(|(i, score)| RetrievalResult::from_chunk(&self.chunks[i], score, SourceKind::Keyword))
			.collect()
	}
}

struct Entry {
	document_id: Option<String>,
	chunks: Vec<Chunk>,
}

struct State {
	entries: Vec<Entry>,
	version: u64,
	snapshot: Option<Arc<Snapshot>>,
}

impl State {
	fn touch(&mut self) { self.version += 1; self.snapshot = None; }

	fn chunk_count(&self) -> usize { self.entries.iter().map(|e| e.chunks.len()).sum() }
}

pub struct KeywordIndex {
	params: Bm25Params,
	state: RwLock<State>,
}

impl Default for KeywordIndex {
	fn default() -> Self { Self::new(Bm25Params::default()) }
}

impl KeywordIndex {
	pub fn new(params: Bm25Params) -> Self {
		Self { params, state: RwLock::new(State { entries: Vec::new(), version: 0, snapshot: None }) }
	}

	/// Index over `chunks`, grouped by their `document_id` metadata.
	pub fn build(chunks: Vec<Chunk>, params: Bm25Params) -> Self {
		let index = Self::new(params);
		index.replace_all(chunks);
		index
	}

	fn read(&self) -> RwLockReadGuard<'_, State> { self.state.read().unwrap_or_else(PoisonError::into_inner) }

	fn write(&self) -> RwLockWriteGuard<'_, State> { self.state.write().unwrap_or_else(PoisonError::into_inner) }

	/// Drops everything and loads `chunks`, e.g. rematerialized from a chunk store.
	///
	/// Chunks are grouped per document: documents appear in the order of their
	/// first chunk and each keeps its chunks in input order, so a document
	/// whose chunks arrive interleaved with another's is made contiguous.
	/// Chunks without a document id each stay on their own, in place.
	pub fn replace_all(&self, chunks: Vec<Chunk>) {
		let mut entries: Vec<Entry> = Vec::new();
		let mut positions: HashMap<String, usize> = HashMap::new();
		for c in chunks {
			match c.metadata.document_id.clone() {
				Some(doc) => match positions.get(&doc) {
					Some(&pos) => entries[pos].chunks.push(c),
					None => {
						positions.insert(doc.clone(), entries.len());
						entries.push(Entry { document_id: Some(doc), chunks: vec![c] });
					}
				},
				None => entries.push(Entry { document_id: None, chunks: vec![c] }),
			}
		}
		let mut state = self.write();
		state.entries = entries;
		state.touch();
		debug!(chunks = state.chunk_count(), version = state.version, "keyword index replaced");
	}

	/// Adds a document's chunks, replacing any chunks already indexed under
	/// the same id. The document keeps its original position when replaced.
	pub fn insert_document(&self, document_id: &str, chunks: Vec<Chunk>) {
		let mut state = self.write();
		match state.entries.iter().position(|e| e.document_id.as_deref() == Some(document_id)) {
			Some(pos) => state.entries[pos].chunks = chunks,
			None => state.entries.push(Entry { document_id: Some(document_id.to_string()), chunks }),
		}
		state.touch();
		debug!(document_id, version = state.version, "keyword index document upserted");
	}

	/// Returns the number of chunks removed.
	pub fn remove_document(&self, document_id: &str) -> usize {
		let mut state = self.write();
		let Some(pos) = state.entries.iter().position(|e| e.document_id.as_deref() == Some(document_id)) else {
			return 0;
		};
		let removed = state.entries.remove(pos).chunks.len();
		state.touch();
		debug!(document_id, removed, version = state.version, "keyword index document removed");
		removed
	}

	/// Current snapshot, rebuilt first if a write happened since the last one.
	pub fn snapshot(&self) -> Arc<Snapshot> {
		if let Some(s) = self.read().snapshot.as_ref() {
			return Arc::clone(s);
		}
		let mut state = self.write();
		if let Some(s) = state.snapshot.as_ref() {
			return Arc::clone(s);
		}
		let chunks: Vec<Chunk> = state.entries.iter().flat_map(|e| e.chunks.iter().cloned()).collect();
		let snapshot = Arc::new(Snapshot::build(state.version, chunks, self.params));
		debug!(chunks = snapshot.chunks.len(), version = snapshot.version, "keyword snapshot rebuilt");
		state.snapshot = Some(Arc::clone(&snapshot));
		snapshot
	}

	pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievalResult> { self.snapshot().search(query, top_k) }

	pub fn len(&self) -> usize { self.read().chunk_count() }

	pub fn is_empty(&self) -> bool { self.len() == 0 }

	pub fn document_count(&self) -> usize { self.read().entries.iter().filter(|e| e.document_id.is_some()).count() }

	pub fn version(&self) -> u64 { self.read().version }
}
