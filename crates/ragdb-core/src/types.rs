//! Domain types used by the chunker, the keyword index, the chunk stores and
//! the fusion layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub type ChunkId = String;
pub type DocumentId = String;

pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 20;
pub const DEFAULT_TOP_K: usize = 5;

/// Scalar value stored in the metadata extension map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Metadata attached to every chunk.
///
/// The typed fields cover what ingestion and the stores know about; anything
/// provider-specific goes into `extra`, which is serialized flat next to the
/// typed keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, MetaValue>,
}

impl ChunkMetadata {
    pub fn for_file(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let file_type = filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        Self { filename: Some(filename), file_type, upload_timestamp: Some(Utc::now()), ..Self::default() }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: MetaValue) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A window of source text that is indexed independently.
///
/// - `chunk_id`: `"{filename}_{ordinal}"`, unique within its source
/// - `token_count`: width of the token window the text was decoded from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub chunk_id: ChunkId,
    pub token_count: usize,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn document_id(&self) -> Option<&str> { self.metadata.document_id.as_deref() }
}

/// Indicates which retrieval path produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Vector,
    Keyword,
}

/// One ranked hit from a single retrieval path.
///
/// `score` is only meaningful within its own source: cosine similarity for
/// vector hits, BM25 relevance for keyword hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub text: String,
    pub chunk_id: ChunkId,
    pub metadata: ChunkMetadata,
    pub score: f64,
    pub source: SourceKind,
}

impl RetrievalResult {
    pub fn from_chunk(chunk: &Chunk, score: f64, source: SourceKind) -> Self {
        Self { text: chunk.text.clone(), chunk_id: chunk.chunk_id.clone(), metadata: chunk.metadata.clone(), score, source }
    }
}

/// A merged hit produced by rank fusion. Ranks are 1-indexed positions in
/// the source rankings the hit appeared in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub text: String,
    pub chunk_id: ChunkId,
    pub metadata: ChunkMetadata,
    pub score: f64,
    pub vector_rank: Option<usize>,
    pub keyword_rank: Option<usize>,
}

/// Equality filter applied by the chunk store during vector search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub document_id: Option<DocumentId>,
    pub filename: Option<String>,
    pub file_type: Option<String>,
    pub page_number: Option<u32>,
}

impl MetadataFilter {
    pub fn document(document_id: impl Into<String>) -> Self {
        Self { document_id: Some(document_id.into()), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.document_id.is_none() && self.filename.is_none() && self.file_type.is_none() && self.page_number.is_none()
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        fn eq<T: PartialEq>(want: &Option<T>, have: &Option<T>) -> bool {
            want.as_ref().map_or(true, |w| have.as_ref() == Some(w))
        }
        eq(&self.document_id, &meta.document_id)
            && eq(&self.filename, &meta.filename)
            && eq(&self.file_type, &meta.file_type)
            && eq(&self.page_number, &meta.page_number)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Vector,
    Bm25,
    #[default]
    Hybrid,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Bm25 => "bm25",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for SearchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" => Ok(Self::Vector),
            "bm25" => Ok(Self::Bm25),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(Error::Validation(format!("search_type must be one of vector, bm25, hybrid; got '{other}'"))),
        }
    }
}

fn default_top_k() -> usize { DEFAULT_TOP_K }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub search_type: SearchType,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, top_k: usize, search_type: SearchType) -> Self {
        Self { query: query.into(), top_k, search_type }
    }

    /// Rejects requests that must never reach an external service.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::Validation("query must contain at least 1 non-whitespace character".into()));
        }
        if !(MIN_TOP_K..=MAX_TOP_K).contains(&self.top_k) {
            return Err(Error::Validation(format!("top_k must be between {MIN_TOP_K} and {MAX_TOP_K}, got {}", self.top_k)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub text: String,
    pub score: f64,
    pub chunk_id: ChunkId,
    pub metadata: ChunkMetadata,
}

impl From<RetrievalResult> for SearchResultItem {
    fn from(r: RetrievalResult) -> Self { Self { text: r.text, score: r.score, chunk_id: r.chunk_id, metadata: r.metadata } }
}

impl From<FusedResult> for SearchResultItem {
    fn from(r: FusedResult) -> Self { Self { text: r.text, score: r.score, chunk_id: r.chunk_id, metadata: r.metadata } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResultItem>,
    pub search_type: SearchType,
}

/// One uploaded document as seen by the chunk store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document_id: DocumentId,
    pub filename: Option<String>,
    pub file_type: Option<String>,
    pub upload_timestamp: Option<DateTime<Utc>>,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_chunks: usize,
    pub total_documents: usize,
    pub collection_name: String,
}
