use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub fn build_chunks_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("document_id", DataType::Utf8, false),
		Field::new("chunk_id", DataType::Utf8, false),
		Field::new("ordinal", DataType::Int32, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("token_count", DataType::Int32, false),
		Field::new("filename", DataType::Utf8, true),
		Field::new("file_type", DataType::Utf8, true),
		Field::new("page_number", DataType::Int32, true),
		Field::new("upload_timestamp", DataType::Timestamp(TimeUnit::Millisecond, None), true),
		// remaining metadata keys, JSON-encoded
		Field::new("extra", DataType::Utf8, true),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
