/// Lowercases and splits on Unicode whitespace. No stemming and no stopwords,
/// so punctuation stays attached to its word.
pub fn tokenize(text: &str) -> Vec<String> {
	text.split_whitespace().map(str::to_lowercase).collect()
}
