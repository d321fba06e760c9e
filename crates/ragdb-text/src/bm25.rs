//! Okapi BM25 over an in-memory corpus.
//!
//! Statistics (document frequencies, idf, average length) are computed once in
//! [`Bm25Index::build`]. Terms whose raw idf is negative (present in more than
//! half of the corpus) are floored to `epsilon * average_idf`, where the
//! average runs over the whole vocabulary.

use std::collections::HashMap;

use ragdb_core::config::RetrievalSettings;

use crate::tokenize::tokenize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
	pub k1: f64,
	pub b: f64,
	pub epsilon: f64,
}

impl Default for Bm25Params {
	fn default() -> Self { Self { k1: 1.5, b: 0.75, epsilon: 0.25 } }
}

impl From<&RetrievalSettings> for Bm25Params {
	fn from(s: &RetrievalSettings) -> Self { Self { k1: s.bm25_k1, b: s.bm25_b, epsilon: s.bm25_epsilon } }
}

#[derive(Debug, Clone)]
pub struct Bm25Index {
	params: Bm25Params,
	doc_lens: Vec<usize>,
	avgdl: f64,
	// term -> (idf, postings of (doc index, term frequency))
	terms: HashMap<String, (f64, Vec<(usize, u32)>)>,
}

impl Bm25Index {
	pub fn build<S: AsRef<str>>(corpus: &[S], params: Bm25Params) -> Self {
		let n_docs = corpus.len();
		let mut doc_lens = Vec::with_capacity(n_docs);
		let mut vocab: Vec<String> = Vec::new();
		let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();

		for (doc, text) in corpus.iter().enumerate() {
			let tokens = tokenize(text.as_ref());
			doc_lens.push(tokens.len());
			let mut tf: HashMap<String, u32> = HashMap::new();
			let mut order = Vec::new();
			for t in tokens {
				let count = tf.entry(t.clone()).or_insert(0);
				if *count == 0 { order.push(t); }
				*count += 1;
			}
			for t in order {
				let freq = tf[&t];
				match postings.get_mut(&t) {
					Some(list) => list.push((doc, freq)),
					None => { vocab.push(t.clone()); postings.insert(t, vec![(doc, freq)]); }
				}
			}
		}

		let total_len: usize = doc_lens.iter().sum();
		let avgdl = if n_docs == 0 { 0.0 } else { total_len as f64 / n_docs as f64 };

		let n = n_docs as f64;
		let raw: Vec<f64> = vocab
			.iter()
			.map(|t| {
				let df = postings.get(t).map_or(0, Vec::len) as f64;
				(n - df + 0.5).ln() - (df + 0.5).ln()
			})
			.collect();
		let average_idf = if raw.is_empty() { 0.0 } else { raw.iter().sum::<f64>() / raw.len() as f64 };
		let floor = params.epsilon * average_idf;

		let mut terms = HashMap::with_capacity(vocab.len());
		for (t, idf) in vocab.into_iter().zip(raw) {
			let idf = if idf < 0.0 { floor } else { idf };
			let list = postings.remove(&t).unwrap_or_default();
			terms.insert(t, (idf, list));
		}

		Self { params, doc_lens, avgdl, terms }
	}

	pub fn len(&self) -> usize { self.doc_lens.len() }

	pub fn is_empty(&self) -> bool { self.doc_lens.is_empty() }

	pub fn params(&self) -> Bm25Params { self.params }

	pub fn avgdl(&self) -> f64 { self.avgdl }

	/// Idf after the epsilon floor; `None` for out-of-vocabulary terms.
	pub fn idf(&self, term: &str) -> Option<f64> { self.terms.get(term).map(|(idf, _)| *idf) }

	/// Score of every document, in corpus order.
	pub fn scores(&self, query: &str) -> Vec<f64> {
		let mut scores = vec![0.0; self.len()];
		let Bm25Params { k1, b, .. } = self.params;
		for q in tokenize(query) {
			let Some((idf, postings)) = self.terms.get(&q) else { continue };
			for &(doc, tf) in postings {
				let tf = f64::from(tf);
				let len_ratio = if self.avgdl > 0.0 { self.doc_lens[doc] as f64 / self.avgdl } else { 0.0 };
				scores[doc] += idf * tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * len_ratio));
			}
		}
		scores
	}

	/// Best `k` documents with a positive score, highest first. Equal scores
	/// keep corpus order.
	pub fn top_k(&self, query: &str, k: usize) -> Vec<(usize, f64)> {
		let mut ranked: Vec<(usize, f64)> = self.scores(query).into_iter().enumerate().collect();
		ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
		ranked.truncate(k);
		ranked.retain(|(_, s)| *s > 0.0);
		ranked
	}
}
