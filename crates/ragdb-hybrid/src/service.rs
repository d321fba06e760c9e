//! Retrieval context: the single object a process builds at startup and hands
//! to every ingest, delete and search call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use ragdb_core::chunking::Chunker;
use ragdb_core::config::{RetrievalSettings, Settings};
use ragdb_core::data_processor::{DocumentPage, SourceDocument};
use ragdb_core::traits::{ChunkStore, Embedder};
use ragdb_core::types::{
    Chunk, DocumentId, DocumentInfo, RetrievalResult, SearchRequest, SearchResponse, SearchResultItem, SearchType,
    StoreStats,
};
use ragdb_core::{Error, Result};
use ragdb_embed::{get_default_embedder, load_codec};
use ragdb_text::{Bm25Params, KeywordIndex};
use ragdb_vector::open_store;

use crate::fusion::{candidate_breadth, fuse, FusionParams};
use crate::vector::{with_timeout, VectorRetriever};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub filename: Option<String>,
    pub chunks: usize,
    pub tokens: usize,
}

pub struct RetrievalContext {
    chunker: Chunker,
    keyword: Arc<KeywordIndex>,
    vector: VectorRetriever,
    fusion: FusionParams,
    degraded_mode: bool,
    // Held across every store write and the matching keyword index update.
    write_gate: Mutex<()>,
}

impl RetrievalContext {
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>, store: Arc<dyn ChunkStore>, retrieval: &RetrievalSettings) -> Self {
        let timeout = Duration::from_millis(retrieval.upstream_timeout_ms);
        Self {
            chunker,
            keyword: Arc::new(KeywordIndex::new(Bm25Params::from(retrieval))),
            vector: VectorRetriever::new(embedder, store, timeout),
            fusion: FusionParams::from(retrieval),
            degraded_mode: retrieval.degraded_mode,
            write_gate: Mutex::new(()),
        }
    }

    /// Wires the tokenizer, embedder and chunk store named in `settings`.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let codec = load_codec(&settings.chunking.tokenizer)?;
        let chunker = Chunker::from_settings(codec, &settings.chunking)?;
        let embedder = get_default_embedder(&settings.embedding)?;
        let store = open_store(&settings.vector_store, embedder.dim()).await?;
        Ok(Self::new(chunker, embedder, store, &settings.retrieval))
    }

    pub fn chunker(&self) -> &Chunker { &self.chunker }

    pub fn keyword_index(&self) -> &KeywordIndex { &self.keyword }

    pub fn store(&self) -> &Arc<dyn ChunkStore> { self.vector.store() }

    pub fn fusion_params(&self) -> &FusionParams { &self.fusion }

    /// Loads the keyword index from whatever the chunk store already holds.
    #[instrument(skip_all, fields(backend = self.store().backend()))]
    pub async fn warm_up(&self) -> Result<usize> {
        let _gate = self.write_gate.lock().await;
        let store = self.store();
        let chunks = with_timeout(store.backend(), self.vector.timeout(), store.get_all()).await?;
        let n = chunks.len();
        self.keyword.replace_all(chunks);
        info!(chunks = n, "keyword index rematerialized from chunk store");
        Ok(n)
    }

    pub async fn ingest_document(&self, document: &SourceDocument) -> Result<IngestReport> { self.ingest(&document.pages, None).await }

    /// Chunks, embeds and stores one document, then adds it to the keyword
    /// index. Passing an existing `document_id` replaces that document.
    #[instrument(skip_all, fields(pages = pages.len()))]
    pub async fn ingest(&self, pages: &[DocumentPage], document_id: Option<DocumentId>) -> Result<IngestReport> {
        let filename = pages.iter().find_map(|p| p.metadata.filename.clone());
        let mut chunks = self.chunker.chunk_pages(pages)?;
        if chunks.is_empty() {
            return Err(Error::Validation(format!(
                "document {} contains no text to index",
                filename.as_deref().unwrap_or("unknown")
            )));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedder = self.vector.embedder();
        let embeddings = with_timeout(embedder.model_id(), self.vector.timeout(), embedder.embed_batch(&texts)).await?;

        let gate = self.write_gate.lock().await;
        let store = self.store();
        let document_id = with_timeout(store.backend(), self.vector.timeout(), store.add(&chunks, &embeddings, document_id)).await?;
        for c in &mut chunks {
            c.metadata.document_id = Some(document_id.clone());
        }
        let tokens = chunks.iter().map(|c| c.token_count).sum();
        let count = chunks.len();
        self.keyword.insert_document(&document_id, chunks);
        drop(gate);

        info!(document_id = %document_id, filename = filename.as_deref().unwrap_or("unknown"), chunks = count, tokens, "ingested document");
        Ok(IngestReport { document_id, filename, chunks: count, tokens })
    }

    /// Removes a document from the chunk store and the keyword index.
    #[instrument(skip_all, fields(document_id = %document_id))]
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let gate = self.write_gate.lock().await;
        let store = self.store();
        let removed = with_timeout(store.backend(), self.vector.timeout(), store.delete(document_id)).await?;
        let from_index = self.keyword.remove_document(document_id);
        drop(gate);
        if removed == 0 && from_index == 0 {
            return Err(Error::NotFound(format!("document {document_id}")));
        }
        info!(removed, "deleted document");
        Ok(removed)
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        let store = self.store();
        with_timeout(store.backend(), self.vector.timeout(), store.list_documents()).await
    }

    pub async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let store = self.store();
        with_timeout(store.backend(), self.vector.timeout(), store.get_document(document_id)).await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let store = self.store();
        with_timeout(store.backend(), self.vector.timeout(), store.stats()).await
    }

    async fn keyword_search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        let keyword = Arc::clone(&self.keyword);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || keyword.search(&query, top_k))
            .await
            .map_err(|e| Error::Operation(format!("keyword search task failed: {e}")))
    }

    #[instrument(skip_all, fields(search_type = %request.search_type, top_k = request.top_k))]
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        request.validate()?;
        let query = request.query.as_str();
        let top_k = request.top_k;

        let results: Vec<SearchResultItem> = match request.search_type {
            SearchType::Vector => self.vector.retrieve(query, top_k, None).await?.into_iter().map(Into::into).collect(),
            SearchType::Bm25 => self.keyword_search(query, top_k).await?.into_iter().map(Into::into).collect(),
            SearchType::Hybrid => {
                let breadth = candidate_breadth(top_k);
                let (vector, keyword) = if self.degraded_mode {
                    let (vector, keyword) = tokio::join!(self.vector.retrieve(query, breadth, None), self.keyword_search(query, breadth));
                    let vector = match vector {
                        Ok(v) => v,
                        Err(e) if e.is_upstream() => {
                            warn!(error = %e, "vector retrieval failed; serving keyword-only results");
                            Vec::new()
                        }
                        Err(e) => return Err(e),
                    };
                    (vector, keyword?)
                } else {
                    tokio::try_join!(self.vector.retrieve(query, breadth, None), self.keyword_search(query, breadth))?
                };
                debug!(vector = vector.len(), keyword = keyword.len(), breadth, "fusing candidates");
                fuse(&vector, &keyword, &self.fusion, top_k).into_iter().map(Into::into).collect()
            }
        };

        if results.is_empty() {
            debug!(query, "no results");
        }
        info!(results = results.len(), "search completed");
        Ok(SearchResponse { query: request.query.clone(), results, search_type: request.search_type })
    }
}
