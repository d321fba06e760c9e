//! Token codecs used to size chunks in the embedding provider's vocabulary.

use std::path::Path;
use std::sync::Arc;

use tiktoken_rs::{CoreBPE, Rank};
use tokenizers::Tokenizer;

use ragdb_core::traits::TokenCodec;
use ragdb_core::{Error, Result};

/// Start of the error `CoreBPE::decode` returns for byte runs that are not UTF-8.
const INVALID_UTF8_PREFIX: &str = "Unable to decode into a valid UTF-8";

pub struct TiktokenCodec {
	name: String,
	bpe: CoreBPE,
}

impl TiktokenCodec {
	pub fn cl100k_base() -> Result<Self> {
		let bpe = tiktoken_rs::cl100k_base().map_err(|e| Error::InvalidConfig(format!("failed to load cl100k_base: {e}")))?;
		Ok(Self { name: "cl100k_base".to_string(), bpe })
	}
}

impl TokenCodec for TiktokenCodec {
	fn name(&self) -> &str { &self.name }

	fn encode(&self, text: &str) -> Result<Vec<u32>> {
		Ok(self.bpe.encode_ordinary(text).into_iter().map(|t| t as u32).collect())
	}

	/// Windows that cut through a multi-byte character decode with U+FFFD in
	/// place of the partial bytes, so every token of the window is kept.
	fn decode(&self, tokens: &[u32]) -> Result<String> {
		let ranks: Vec<Rank> = tokens.to_vec();
		match self.bpe.decode(ranks.clone()) {
			Ok(text) => Ok(text),
			// Unknown ids fail before the UTF-8 check, so every id here is in the vocabulary.
			Err(e) if e.to_string().starts_with(INVALID_UTF8_PREFIX) => {
				let bytes: Vec<u8> = self.bpe._decode_native_and_split(ranks).flatten().collect();
				tracing::debug!(tokens = tokens.len(), "window splits a character; decoding lossily");
				Ok(String::from_utf8_lossy(&bytes).into_owned())
			}
			Err(e) => Err(Error::Operation(format!("{}: {e}", self.name))),
		}
	}
}

/// Wraps a HuggingFace `tokenizer.json`.
pub struct HfTokenCodec {
	name: String,
	tokenizer: Tokenizer,
}

impl HfTokenCodec {
	pub fn from_file(path: &Path) -> Result<Self> {
		let tokenizer = Tokenizer::from_file(path)
			.map_err(|e| Error::InvalidConfig(format!("Failed to load tokenizer from {}: {}", path.display(), e)))?;
		Ok(Self { name: path.display().to_string(), tokenizer })
	}

	pub fn from_tokenizer(name: impl Into<String>, tokenizer: Tokenizer) -> Self { Self { name: name.into(), tokenizer } }
}

impl TokenCodec for HfTokenCodec {
	fn name(&self) -> &str { &self.name }

	fn encode(&self, text: &str) -> Result<Vec<u32>> {
		let enc = self.tokenizer.encode(text, false).map_err(|e| Error::Operation(format!("Tokenization failed: {e}")))?;
		Ok(enc.get_ids().to_vec())
	}

	fn decode(&self, tokens: &[u32]) -> Result<String> {
		self.tokenizer.decode(tokens, true).map_err(|e| Error::Operation(format!("Detokenization failed: {e}")))
	}
}

/// `"cl100k_base"` selects the tiktoken vocabulary; anything else is read as a
/// path to a `tokenizer.json`.
pub fn load_codec(spec: &str) -> Result<Arc<dyn TokenCodec>> {
	match spec.trim() {
		"" | "cl100k_base" => Ok(Arc::new(TiktokenCodec::cl100k_base()?)),
		path => {
			let path = ragdb_core::config::expand_path(path);
			if !path.exists() {
				return Err(Error::InvalidConfig(format!("tokenizer '{}' is neither cl100k_base nor an existing file", path.display())));
			}
			Ok(Arc::new(HfTokenCodec::from_file(&path)?))
		}
	}
}
