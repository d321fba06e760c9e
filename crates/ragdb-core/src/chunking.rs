//! Token-window chunking.
//!
//! Text is tokenized once with a [`TokenCodec`] matching the embedding
//! provider's vocabulary, then cut into windows of `chunk_size` tokens that
//! advance by `chunk_size - chunk_overlap`. Every token of the input lands in
//! at least one window; only the last window may be shorter than
//! `chunk_size`.

use std::sync::Arc;

use tracing::debug;

use crate::config::ChunkingSettings;
use crate::data_processor::DocumentPage;
use crate::error::{Error, Result};
use crate::traits::TokenCodec;
use crate::types::{Chunk, ChunkMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkingConfig {
    /// Fails unless `0 < chunk_size` and `chunk_overlap < chunk_size`; either
    /// violation would make the window stride zero or negative.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be greater than 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }
    pub fn chunk_overlap(&self) -> usize { self.chunk_overlap }
    pub fn stride(&self) -> usize { self.chunk_size - self.chunk_overlap }
}

impl TryFrom<&ChunkingSettings> for ChunkingConfig {
    type Error = Error;

    fn try_from(s: &ChunkingSettings) -> Result<Self> { Self::new(s.size, s.overlap) }
}

/// Line endings unified to `\n`, surrounding whitespace removed.
pub fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// Splits `text` into overlapping token windows.
///
/// Empty input yields no chunks. Each chunk carries a copy of `metadata` and
/// an id of the form `"{filename}_{ordinal}"`.
pub fn chunk(
    codec: &dyn TokenCodec,
    text: &str,
    metadata: &ChunkMetadata,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    let config = ChunkingConfig::new(chunk_size, chunk_overlap)?;
    chunk_with(codec, text, metadata, &config, 0)
}

fn chunk_with(
    codec: &dyn TokenCodec,
    text: &str,
    metadata: &ChunkMetadata,
    config: &ChunkingConfig,
    first_ordinal: usize,
) -> Result<Vec<Chunk>> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return Ok(Vec::new());
    }
    let tokens = codec.encode(&normalized)?;
    let source = metadata.filename.as_deref().unwrap_or("unknown");
    let stride = config.stride();

    let mut chunks = Vec::with_capacity(tokens.len().div_ceil(stride));
    let mut start = 0;
    while start < tokens.len() {
        let end = (start + config.chunk_size).min(tokens.len());
        let window = &tokens[start..end];
        let text = codec.decode(window)?;
        if text.trim().is_empty() {
            debug!(source, start, end, "skipping blank token window");
        } else {
            chunks.push(Chunk {
                text,
                chunk_id: format!("{source}_{}", first_ordinal + chunks.len()),
                token_count: window.len(),
                metadata: metadata.clone(),
            });
        }
        if end == tokens.len() {
            break;
        }
        start += stride;
    }
    Ok(chunks)
}

/// Chunker bound to one tokenizer and one validated window configuration.
#[derive(Clone)]
pub struct Chunker {
    codec: Arc<dyn TokenCodec>,
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(codec: Arc<dyn TokenCodec>, config: ChunkingConfig) -> Self { Self { codec, config } }

    pub fn from_settings(codec: Arc<dyn TokenCodec>, settings: &ChunkingSettings) -> Result<Self> {
        Ok(Self::new(codec, ChunkingConfig::try_from(settings)?))
    }

    pub fn config(&self) -> &ChunkingConfig { &self.config }

    pub fn codec_name(&self) -> &str { self.codec.name() }

    pub fn count_tokens(&self, text: &str) -> Result<usize> { Ok(self.codec.encode(text)?.len()) }

    pub fn chunk(&self, text: &str, metadata: &ChunkMetadata) -> Result<Vec<Chunk>> {
        chunk_with(self.codec.as_ref(), text, metadata, &self.config, 0)
    }

    /// Chunks every page of one source. Page numbers are copied into the
    /// chunk metadata and ordinals keep counting across pages, so chunk ids
    /// stay unique within the source.
    pub fn chunk_pages(&self, pages: &[DocumentPage]) -> Result<Vec<Chunk>> {
        let mut all = Vec::new();
        for page in pages {
            let mut metadata = page.metadata.clone();
            if page.page_number.is_some() {
                metadata.page_number = page.page_number;
            }
            let chunks = chunk_with(self.codec.as_ref(), &page.content, &metadata, &self.config, all.len())?;
            all.extend(chunks);
        }
        debug!(
            chunks = all.len(),
            pages = pages.len(),
            source = pages.first().and_then(|p| p.metadata.filename.as_deref()).unwrap_or("unknown"),
            "chunked document"
        );
        Ok(all)
    }
}
