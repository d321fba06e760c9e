use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ragdb_core::chunking::{Chunker, ChunkingConfig};
use ragdb_core::config::RetrievalSettings;
use ragdb_core::data_processor::DocumentPage;
use ragdb_core::traits::{ChunkStore, Embedder, TokenCodec};
use ragdb_core::types::{
    Chunk, ChunkMetadata, DocumentId, DocumentInfo, MetadataFilter, RetrievalResult, SearchRequest, SearchType, StoreStats,
};
use ragdb_core::{Error, Result};
use ragdb_embed::FakeEmbedder;
use ragdb_hybrid::{rrf_contribution, RetrievalContext};
use ragdb_vector::MemoryChunkStore;

struct CharCodec;

impl TokenCodec for CharCodec {
    fn name(&self) -> &str { "chars" }

    fn encode(&self, text: &str) -> Result<Vec<u32>> { Ok(text.chars().map(u32::from).collect()) }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        tokens.iter().map(|&t| char::from_u32(t).ok_or_else(|| Error::Operation(format!("bad token {t}")))).collect()
    }
}

/// FakeEmbedder that can be told to fail or stall.
struct FlakyEmbedder {
    inner: FakeEmbedder,
    fail: AtomicBool,
    delay_ms: AtomicU64,
}

impl FlakyEmbedder {
    fn new() -> Arc<Self> { Arc::new(Self { inner: FakeEmbedder::new(64), fail: AtomicBool::new(false), delay_ms: AtomicU64::new(0) }) }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn dim(&self) -> usize { self.inner.dim() }

    fn model_id(&self) -> &str { "flaky" }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::upstream("flaky", "provider exploded"));
        }
        self.inner.embed_batch(texts).await
    }
}

fn chunker() -> Chunker { Chunker::new(Arc::new(CharCodec), ChunkingConfig::new(200, 20).unwrap()) }

fn context(embedder: Arc<dyn Embedder>, store: Arc<MemoryChunkStore>, retrieval: RetrievalSettings) -> RetrievalContext {
    RetrievalContext::new(chunker(), embedder, store, &retrieval)
}

fn store() -> Arc<MemoryChunkStore> { Arc::new(MemoryChunkStore::new("documents", Some(64))) }

fn page(name: &str, text: &str) -> Vec<DocumentPage> {
    vec![DocumentPage { content: text.to_string(), page_number: Some(1), metadata: ChunkMetadata::for_file(name) }]
}

async fn cats_context(embedder: Arc<dyn Embedder>, retrieval: RetrievalSettings) -> RetrievalContext {
    let ctx = context(embedder, store(), retrieval);
    for (name, text) in [("one.txt", "cats chase mice"), ("two.txt", "dogs chase cats"), ("three.txt", "birds fly high")] {
        ctx.ingest(&page(name, text), None).await.unwrap();
    }
    ctx
}

#[tokio::test]
async fn all_search_types_return_ranked_results() {
    let ctx = cats_context(Arc::new(FakeEmbedder::new(64)), RetrievalSettings::default()).await;

    let bm25 = ctx.search(&SearchRequest::new("cats", 2, SearchType::Bm25)).await.unwrap();
    let texts: Vec<_> = bm25.results.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["cats chase mice", "dogs chase cats"]);
    assert!(bm25.results.iter().all(|r| r.score > 0.0));
    assert_eq!(bm25.search_type, SearchType::Bm25);
    assert_eq!(bm25.query, "cats");

    let vector = ctx.search(&SearchRequest::new("cats", 1, SearchType::Vector)).await.unwrap();
    assert_eq!(vector.results.len(), 1);
    assert!(vector.results[0].score <= 1.0 + 1e-9);

    let hybrid = ctx.search(&SearchRequest::new("cats", 3, SearchType::Hybrid)).await.unwrap();
    assert_eq!(hybrid.results.len(), 3);
    let mut top_two: Vec<_> = hybrid.results[..2].iter().map(|r| r.text.as_str()).collect();
    top_two.sort();
    assert_eq!(top_two, vec!["cats chase mice", "dogs chase cats"]);
    assert!(hybrid.results.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(hybrid.results[2].text, "birds fly high");
    assert!(hybrid.results[0].metadata.document_id.is_some());
    assert_eq!(hybrid.results[0].chunk_id.split('_').nth(1), Some("0"));
}

#[tokio::test]
async fn empty_state_returns_empty_results() {
    let ctx = context(Arc::new(FakeEmbedder::new(64)), store(), RetrievalSettings::default());
    for search_type in [SearchType::Vector, SearchType::Bm25, SearchType::Hybrid] {
        let res = ctx.search(&SearchRequest::new("anything", 5, search_type)).await.unwrap();
        assert!(res.results.is_empty());
    }
    assert_eq!(ctx.stats().await.unwrap().total_chunks, 0);
}

#[tokio::test]
async fn invalid_requests_never_reach_the_provider() {
    let embedder = FlakyEmbedder::new();
    embedder.fail.store(true, Ordering::SeqCst);
    let ctx = context(embedder, store(), RetrievalSettings::default());

    for req in [SearchRequest::new("", 5, SearchType::Hybrid), SearchRequest::new("cats", 0, SearchType::Vector), SearchRequest::new("cats", 21, SearchType::Hybrid)] {
        assert!(matches!(ctx.search(&req).await, Err(Error::Validation(_))));
    }
}

#[tokio::test]
async fn delete_removes_from_store_and_keyword_index() {
    let ctx = cats_context(Arc::new(FakeEmbedder::new(64)), RetrievalSettings::default()).await;
    let docs = ctx.list_documents().await.unwrap();
    assert_eq!(docs.len(), 3);
    let mice_doc = docs.iter().find(|d| d.filename.as_deref() == Some("one.txt")).unwrap().document_id.clone();

    assert_eq!(ctx.delete_document(&mice_doc).await.unwrap(), 1);
    let res = ctx.search(&SearchRequest::new("mice", 5, SearchType::Bm25)).await.unwrap();
    assert!(res.results.is_empty());
    let hybrid = ctx.search(&SearchRequest::new("cats", 5, SearchType::Hybrid)).await.unwrap();
    assert!(hybrid.results.iter().all(|r| r.text != "cats chase mice"));

    assert!(matches!(ctx.delete_document(&mice_doc).await, Err(Error::NotFound(_))));
    let stats = ctx.stats().await.unwrap();
    assert_eq!((stats.total_chunks, stats.total_documents), (2, 2));
}

#[tokio::test]
async fn ingest_reports_and_rejects_empty_documents() {
    let ctx = context(Arc::new(FakeEmbedder::new(64)), store(), RetrievalSettings::default());
    let long = "word ".repeat(100);
    let report = ctx.ingest(&page("long.txt", &long), Some("doc-long".into())).await.unwrap();
    assert_eq!(report.document_id, "doc-long");
    assert_eq!(report.filename.as_deref(), Some("long.txt"));
    assert_eq!(report.chunks, 3);
    let chunks = ctx.document_chunks("doc-long").await.unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[2].chunk_id, "long.txt_2");

    assert!(matches!(ctx.ingest(&page("blank.txt", "  \n "), None).await, Err(Error::Validation(_))));
}

#[tokio::test]
async fn upstream_failure_fails_vector_and_hybrid_but_not_bm25() {
    let embedder = FlakyEmbedder::new();
    let ctx = cats_context(embedder.clone(), RetrievalSettings::default()).await;
    embedder.fail.store(true, Ordering::SeqCst);

    let err = ctx.search(&SearchRequest::new("cats", 5, SearchType::Hybrid)).await.unwrap_err();
    assert!(matches!(err, Error::Upstream { .. }), "got {err:?}");
    let err = ctx.search(&SearchRequest::new("cats", 5, SearchType::Vector)).await.unwrap_err();
    assert!(err.is_upstream());
    assert_eq!(ctx.search(&SearchRequest::new("cats", 5, SearchType::Bm25)).await.unwrap().results.len(), 2);
}

#[tokio::test]
async fn slow_provider_times_out() {
    let embedder = FlakyEmbedder::new();
    let retrieval = RetrievalSettings { upstream_timeout_ms: 50, ..RetrievalSettings::default() };
    let ctx = cats_context(embedder.clone(), retrieval).await;
    embedder.delay_ms.store(2_000, Ordering::SeqCst);

    let err = ctx.search(&SearchRequest::new("cats", 5, SearchType::Hybrid)).await.unwrap_err();
    match err {
        Error::Timeout { service, timeout_ms } => {
            assert_eq!(service, "flaky");
            assert_eq!(timeout_ms, 50);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn degraded_mode_serves_keyword_results() {
    let embedder = FlakyEmbedder::new();
    let retrieval = RetrievalSettings { degraded_mode: true, ..RetrievalSettings::default() };
    let ctx = cats_context(embedder.clone(), retrieval).await;
    embedder.fail.store(true, Ordering::SeqCst);

    let res = ctx.search(&SearchRequest::new("cats", 5, SearchType::Hybrid)).await.unwrap();
    assert_eq!(res.results.len(), 2);
    assert!((res.results[0].score - rrf_contribution(0.3, 60, 1)).abs() < 1e-15);
    assert_eq!(res.results[0].text, "cats chase mice");
}

#[tokio::test]
async fn warm_up_rebuilds_keyword_index_from_store() {
    let shared = store();
    let first = context(Arc::new(FakeEmbedder::new(64)), shared.clone(), RetrievalSettings::default());
    first.ingest(&page("a.txt", "zebras graze quietly"), None).await.unwrap();

    let second = context(Arc::new(FakeEmbedder::new(64)), shared.clone(), RetrievalSettings::default());
    let req = SearchRequest::new("zebras", 5, SearchType::Bm25);
    assert!(second.search(&req).await.unwrap().results.is_empty());

    assert_eq!(second.warm_up().await.unwrap(), 1);
    let res = second.search(&req).await.unwrap();
    assert_eq!(res.results.len(), 1);
    assert_eq!(res.results[0].text, "zebras graze quietly");
    assert_eq!(second.store().backend(), "memory");
}

/// Memory store whose `get_all` stalls before reading and whose `add` stalls
/// after writing.
struct SlowStore {
    inner: MemoryChunkStore,
    get_all_delay_ms: AtomicU64,
    add_delay_ms: AtomicU64,
}

impl SlowStore {
    fn new() -> Arc<Self> {
        Arc::new(Self { inner: MemoryChunkStore::new("documents", Some(64)), get_all_delay_ms: AtomicU64::new(0), add_delay_ms: AtomicU64::new(0) })
    }
}

async fn pause(delay: &AtomicU64) {
    let ms = delay.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl ChunkStore for SlowStore {
    fn backend(&self) -> &'static str { "slow" }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>], document_id: Option<DocumentId>) -> Result<DocumentId> {
        let id = self.inner.add(chunks, embeddings, document_id).await?;
        pause(&self.add_delay_ms).await;
        Ok(id)
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<RetrievalResult>> {
        self.inner.search(query_embedding, top_k, filter).await
    }

    async fn delete(&self, document_id: &str) -> Result<usize> { self.inner.delete(document_id).await }

    async fn get_all(&self) -> Result<Vec<Chunk>> {
        pause(&self.get_all_delay_ms).await;
        self.inner.get_all().await
    }

    async fn get_document(&self, document_id: &str) -> Result<Vec<Chunk>> { self.inner.get_document(document_id).await }

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>> { self.inner.list_documents().await }

    async fn stats(&self) -> Result<StoreStats> { self.inner.stats().await }
}

fn slow_context(store: Arc<SlowStore>) -> RetrievalContext {
    RetrievalContext::new(chunker(), Arc::new(FakeEmbedder::new(64)), store, &RetrievalSettings::default())
}

#[tokio::test]
async fn ingest_during_warm_up_stays_searchable() {
    let store = SlowStore::new();
    store.get_all_delay_ms.store(100, Ordering::SeqCst);
    let ctx = slow_context(store.clone());

    let (warmed, ingested) = tokio::join!(ctx.warm_up(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.ingest(&page("late.txt", "otters float together"), None).await
    });
    warmed.unwrap();
    ingested.unwrap();

    assert_eq!(store.stats().await.unwrap().total_chunks, 1);
    let res = ctx.search(&SearchRequest::new("otters", 5, SearchType::Bm25)).await.unwrap();
    assert_eq!(res.results.len(), 1);
    assert_eq!(ctx.keyword_index().len(), 1);
}

#[tokio::test]
async fn delete_during_reingest_leaves_no_keyword_ghost() {
    let store = SlowStore::new();
    let ctx = slow_context(store.clone());
    ctx.ingest(&page("doc.txt", "herons wade slowly"), Some("doc".into())).await.unwrap();
    store.add_delay_ms.store(100, Ordering::SeqCst);

    let again = page("doc.txt", "herons wade again");
    let (reingested, deleted) = tokio::join!(ctx.ingest(&again, Some("doc".into())), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.delete_document("doc").await
    });
    reingested.unwrap();
    assert_eq!(deleted.unwrap(), 1);

    assert_eq!(store.stats().await.unwrap().total_chunks, 0);
    assert_eq!(ctx.keyword_index().len(), 0);
    let res = ctx.search(&SearchRequest::new("herons", 5, SearchType::Bm25)).await.unwrap();
    assert!(res.results.is_empty());
}
