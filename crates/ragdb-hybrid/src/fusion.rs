//! Weighted Reciprocal Rank Fusion.
//!
//! `score(d) = Σ_s w_s / (k + rank_s(d))` over the sources `d` appears in,
//! with 1-indexed ranks. Only ranks matter; the sources' own scores are
//! ignored, so cosine similarities and BM25 values never need calibrating
//! against each other.

use std::collections::HashMap;

use ragdb_core::config::{DedupKey, RetrievalSettings};
use ragdb_core::types::{FusedResult, RetrievalResult, MAX_TOP_K};

pub const DEFAULT_RRF_K: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub k: u32,
    pub dedup: DedupKey,
}

impl Default for FusionParams {
    fn default() -> Self { Self { vector_weight: 0.7, keyword_weight: 0.3, k: DEFAULT_RRF_K, dedup: DedupKey::Text } }
}

impl From<&RetrievalSettings> for FusionParams {
    fn from(s: &RetrievalSettings) -> Self {
        Self { vector_weight: s.vector_weight, keyword_weight: s.bm25_weight, k: s.rrf_k, dedup: s.dedup }
    }
}

/// Contribution of a hit at 1-indexed `rank`.
pub fn rrf_contribution(weight: f64, k: u32, rank: usize) -> f64 { weight / (f64::from(k) + rank as f64) }

/// Candidates requested from each source when fusing for `top_k` results.
pub fn candidate_breadth(top_k: usize) -> usize { (top_k * 3).min(MAX_TOP_K) }

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Text(String),
    Chunk(Option<String>, String),
}

fn key_of(r: &RetrievalResult, dedup: DedupKey) -> Key {
    match dedup {
        DedupKey::Text => Key::Text(r.text.clone()),
        DedupKey::Chunk => Key::Chunk(r.metadata.document_id.clone(), r.chunk_id.clone()),
    }
}

/// Fuses two rankings into at most `top_k` results, best first.
///
/// Vector hits are visited before keyword hits; the first occurrence of a key
/// supplies text, chunk id and metadata. Equal fused scores keep that
/// first-seen order.
pub fn fuse(vector: &[RetrievalResult], keyword: &[RetrievalResult], params: &FusionParams, top_k: usize) -> Vec<FusedResult> {
    let mut fused: Vec<FusedResult> = Vec::with_capacity(vector.len() + keyword.len());
    let mut slot: HashMap<Key, usize> = HashMap::new();

    let sources = [(vector, params.vector_weight, true), (keyword, params.keyword_weight, false)];
    for (results, weight, is_vector) in sources {
        for (i, r) in results.iter().enumerate() {
            let rank = i + 1;
            let idx = *slot.entry(key_of(r, params.dedup)).or_insert_with(|| {
                fused.push(FusedResult {
                    text: r.text.clone(),
                    chunk_id: r.chunk_id.clone(),
                    metadata: r.metadata.clone(),
                    score: 0.0,
                    vector_rank: None,
                    keyword_rank: None,
                });
                fused.len() - 1
            });
            let entry = &mut fused[idx];
            entry.score += rrf_contribution(weight, params.k, rank);
            // repeated keys within one source add up; the reported rank is the best one
            let seen = if is_vector { &mut entry.vector_rank } else { &mut entry.keyword_rank };
            seen.get_or_insert(rank);
        }
    }

    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused.truncate(top_k);
    fused
}
