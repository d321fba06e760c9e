use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use ragdb_core::traits::{ChunkStore, Embedder};
use ragdb_core::types::{MetadataFilter, RetrievalResult};
use ragdb_core::{Error, Result};

/// Runs `fut` under `timeout`, reporting expiry as [`Error::Timeout`].
pub async fn with_timeout<T>(service: &str, timeout: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout {
            service: service.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Embeds a query and asks the chunk store for its nearest chunks. Errors from
/// either side are passed through unchanged; there is no retry here.
#[derive(Clone)]
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
    timeout: Duration,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn ChunkStore>, timeout: Duration) -> Self {
        Self { embedder, store, timeout }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    pub fn store(&self) -> &Arc<dyn ChunkStore> { &self.store }

    pub fn timeout(&self) -> Duration { self.timeout }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        with_timeout(self.embedder.model_id(), self.timeout, self.embedder.embed_query(text)).await
    }

    pub async fn retrieve(&self, query: &str, top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<RetrievalResult>> {
        let embedding = self.embed_query(query).await?;
        let results = with_timeout(self.store.backend(), self.timeout, self.store.search(&embedding, top_k, filter)).await?;
        debug!(results = results.len(), top_k, "vector retrieval");
        Ok(results)
    }
}
