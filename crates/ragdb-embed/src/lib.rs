//! ragdb-embed
//!
//! Embedding providers (`OpenAiEmbedder`, `FakeEmbedder`) and the token codecs
//! the chunker sizes windows with.

use std::sync::Arc;

use ragdb_core::config::{EmbeddingProviderKind, EmbeddingSettings};
use ragdb_core::traits::Embedder;
use ragdb_core::Result;

pub mod fake;
pub mod openai;
pub mod tokenize;

pub use fake::FakeEmbedder;
pub use openai::OpenAiEmbedder;
pub use tokenize::{load_codec, HfTokenCodec, TiktokenCodec};

fn fake_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Provider selected by `embedding.provider`; `APP_USE_FAKE_EMBEDDINGS=1`
/// forces the fake one regardless.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if fake_forced() || settings.provider == EmbeddingProviderKind::Fake {
        tracing::info!(dim = settings.dimension, "using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(settings.dimension)));
    }
    let embedder = OpenAiEmbedder::from_settings(settings)?;
    tracing::info!(model = %settings.model, base_url = %embedder.base_url(), "using OpenAI-compatible embedder");
    Ok(Arc::new(embedder))
}
