//! Terminal and JSON rendering for search results.

use serde::Serialize;

use ragdb_core::types::{SearchResponse, SearchResultItem};

const SNIPPET_MAX_LEN: usize = 200;

#[derive(Serialize)]
struct JsonHit<'a> {
    rank: usize,
    score: f64,
    chunk_id: &'a str,
    document_id: Option<&'a str>,
    filename: Option<&'a str>,
    snippet: String,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    search_type: String,
    results: Vec<JsonHit<'a>>,
}

pub fn format_json(response: &SearchResponse) -> String {
    let output = JsonOutput {
        query: &response.query,
        search_type: response.search_type.to_string(),
        results: response
            .results
            .iter()
            .enumerate()
            .map(|(i, item)| JsonHit {
                rank: i + 1,
                score: item.score,
                chunk_id: &item.chunk_id,
                document_id: item.metadata.document_id.as_deref(),
                filename: item.metadata.filename.as_deref(),
                snippet: truncate_text(&item.text, SNIPPET_MAX_LEN),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_human(response: &SearchResponse) -> String {
    if response.results.is_empty() {
        return format!("No results for \"{}\" ({})", response.query, response.search_type);
    }
    let mut out = format!("🔍 {} results for \"{}\" ({})\n", response.results.len(), response.query, response.search_type);
    for (i, item) in response.results.iter().enumerate() {
        out.push_str(&format_item(i + 1, item));
    }
    out
}

fn format_item(rank: usize, item: &SearchResultItem) -> String {
    let source = item.metadata.filename.as_deref().unwrap_or("unknown");
    format!("\n{rank}. [{:.4}] {source} ({})\n   {}\n", item.score, item.chunk_id, truncate_text(&item.text, SNIPPET_MAX_LEN).replace('\n', " "))
}

/// Cuts `text` to at most `max_len` characters, on a char boundary.
fn truncate_text(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
