//! LanceDB-backed chunk store.
//!
//! One row per chunk in a single table. Vector search uses cosine distance and
//! reports `1 - _distance` as the score. Metadata filters and deletes are
//! pushed down as SQL predicates.

use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{
	Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray,
	TimestampMillisecondArray,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use tracing::debug;

use ragdb_core::traits::{validate_batch, ChunkStore};
use ragdb_core::types::{Chunk, ChunkMetadata, DocumentId, DocumentInfo, MetadataFilter, RetrievalResult, SourceKind, StoreStats};
use ragdb_core::{Error, Result};

use crate::schema::build_chunks_schema;
use crate::{assign_document, summarize_documents};

const SERVICE: &str = "vector store";

fn store_err(e: impl ToString) -> Error { Error::upstream(SERVICE, e) }

fn quote(value: &str) -> String { format!("'{}'", value.replace('\'', "''")) }

fn filter_sql(filter: &MetadataFilter) -> Option<String> {
	let mut clauses = Vec::new();
	if let Some(v) = &filter.document_id { clauses.push(format!("document_id = {}", quote(v))); }
	if let Some(v) = &filter.filename { clauses.push(format!("filename = {}", quote(v))); }
	if let Some(v) = &filter.file_type { clauses.push(format!("file_type = {}", quote(v))); }
	if let Some(v) = filter.page_number { clauses.push(format!("page_number = {v}")); }
	if clauses.is_empty() { None } else { Some(clauses.join(" AND ")) }
}

pub struct LanceChunkStore {
	db: Connection,
	table: Table,
	collection: String,
	dim: usize,
}

impl LanceChunkStore {
	pub async fn open(uri: &str, collection: &str, dim: usize) -> Result<Self> {
		let db = connect(uri).execute().await.map_err(|e| Error::unavailable(SERVICE, format!("{uri}: {e}")))?;
		let dim_i32 = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("embedding dimension {dim} is too large")))?;
		let names = db.table_names().execute().await.map_err(store_err)?;
		if !names.contains(&collection.to_string()) {
			let schema = build_chunks_schema(dim_i32);
			// create empty table with 0 rows
			let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
			db.create_table(collection, Box::new(iter)).execute().await.map_err(store_err)?;
			debug!(uri, collection, dim, "created chunk table");
		}
		let table = db.open_table(collection).execute().await.map_err(store_err)?;
		Ok(Self { db, table, collection: collection.to_string(), dim })
	}

	pub fn connection(&self) -> &Connection { &self.db }

	fn to_record_batch(&self, document_id: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
		let dim = i32::try_from(self.dim).map_err(|_| Error::InvalidConfig(format!("embedding dimension {} is too large", self.dim)))?;
		let schema = build_chunks_schema(dim);
		let mut ids = Vec::new(); let mut doc_ids = Vec::new(); let mut chunk_ids = Vec::new(); let mut ordinals = Vec::new();
		let mut texts = Vec::new(); let mut token_counts = Vec::new(); let mut filenames = Vec::new(); let mut file_types = Vec::new();
		let mut pages = Vec::new(); let mut uploaded = Vec::new(); let mut extras = Vec::new();
		let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
		for (i, (c, e)) in chunks.iter().zip(embeddings).enumerate() {
			let ordinal = i32::try_from(i).map_err(|_| Error::Validation("too many chunks in one document".into()))?;
			ids.push(format!("{document_id}_{i}"));
			doc_ids.push(document_id.to_string());
			chunk_ids.push(c.chunk_id.clone());
			ordinals.push(ordinal);
			texts.push(c.text.clone());
			token_counts.push(i32::try_from(c.token_count).unwrap_or(i32::MAX));
			filenames.push(c.metadata.filename.clone());
			file_types.push(c.metadata.file_type.clone());
			pages.push(c.metadata.page_number.map(|p| i32::try_from(p).unwrap_or(i32::MAX)));
			uploaded.push(c.metadata.upload_timestamp.map(|t| t.timestamp_millis()));
			extras.push(if c.metadata.extra.is_empty() {
				None
			} else {
				Some(serde_json::to_string(&c.metadata.extra).map_err(|e| Error::Operation(e.to_string()))?)
			});
			vectors.push(Some(e.iter().map(|&x| Some(x)).collect()));
		}
		RecordBatch::try_new(schema, vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(doc_ids)),
			Arc::new(StringArray::from(chunk_ids)),
			Arc::new(Int32Array::from(ordinals)),
			Arc::new(StringArray::from(texts)),
			Arc::new(Int32Array::from(token_counts)),
			Arc::new(StringArray::from(filenames)),
			Arc::new(StringArray::from(file_types)),
			Arc::new(Int32Array::from(pages)),
			Arc::new(TimestampMillisecondArray::from(uploaded)),
			Arc::new(StringArray::from(extras)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim)),
		])
		.map_err(|e| Error::Operation(format!("failed to build record batch: {e}")))
	}

	/// Rows matching `predicate` (all rows when `None`), ordered by document then ordinal.
	async fn scan(&self, predicate: Option<String>) -> Result<Vec<Chunk>> {
		let total = self.table.count_rows(predicate.clone()).await.map_err(store_err)?;
		if total == 0 {
			return Ok(Vec::new());
		}
		let mut query = self.table.query().limit(total);
		if let Some(p) = predicate {
			query = query.only_if(p);
		}
		let mut stream = query.execute().await.map_err(store_err)?;
		let mut rows: Vec<(String, i32, Chunk)> = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(store_err)? {
			for i in 0..batch.num_rows() {
				let (chunk, ordinal) = row_to_chunk(&batch, i)?;
				rows.push((chunk.metadata.document_id.clone().unwrap_or_default(), ordinal, chunk));
			}
		}
		rows.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
		Ok(rows.into_iter().map(|(_, _, c)| c).collect())
	}
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| Error::upstream(SERVICE, format!("column '{name}' missing or mistyped")))
}

fn opt_str(arr: &StringArray, i: usize) -> Option<String> { (!arr.is_null(i)).then(|| arr.value(i).to_string()) }

fn row_to_chunk(batch: &RecordBatch, i: usize) -> Result<(Chunk, i32)> {
	let document_id = column::<StringArray>(batch, "document_id")?.value(i).to_string();
	let pages = column::<Int32Array>(batch, "page_number")?;
	let uploaded = column::<TimestampMillisecondArray>(batch, "upload_timestamp")?;
	let extra = match opt_str(column::<StringArray>(batch, "extra")?, i) {
		Some(json) => serde_json::from_str(&json).map_err(|e| Error::upstream(SERVICE, format!("bad extra metadata: {e}")))?,
		None => Default::default(),
	};
	let metadata = ChunkMetadata {
		filename: opt_str(column::<StringArray>(batch, "filename")?, i),
		file_type: opt_str(column::<StringArray>(batch, "file_type")?, i),
		page_number: (!pages.is_null(i)).then(|| u32::try_from(pages.value(i)).unwrap_or_default()),
		document_id: Some(document_id),
		upload_timestamp: if uploaded.is_null(i) { None } else { DateTime::<Utc>::from_timestamp_millis(uploaded.value(i)) },
		extra,
	};
	let chunk = Chunk {
		text: column::<StringArray>(batch, "text")?.value(i).to_string(),
		chunk_id: column::<StringArray>(batch, "chunk_id")?.value(i).to_string(),
		token_count: usize::try_from(column::<Int32Array>(batch, "token_count")?.value(i)).unwrap_or_default(),
		metadata,
	};
	Ok((chunk, column::<Int32Array>(batch, "ordinal")?.value(i)))
}

#[async_trait]
impl ChunkStore for LanceChunkStore {
	fn backend(&self) -> &'static str { "lance" }

	async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>], document_id: Option<DocumentId>) -> Result<DocumentId> {
		validate_batch(chunks, embeddings, Some(self.dim))?;
		let (document_id, chunks) = assign_document(chunks, document_id);
		self.table.delete(&format!("document_id = {}", quote(&document_id))).await.map_err(store_err)?;
		if chunks.is_empty() {
			return Ok(document_id);
		}
		let record_batch = self.to_record_batch(&document_id, &chunks, embeddings)?;
		let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		self.table.add(reader).execute().await.map_err(store_err)?;
		debug!(document_id = %document_id, chunks = chunks.len(), collection = %self.collection, "added chunks to LanceDB");
		Ok(document_id)
	}

	async fn search(&self, query_embedding: &[f32], top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<RetrievalResult>> {
		if query_embedding.len() != self.dim {
			return Err(Error::Validation(format!("query embedding has {} dimensions, expected {}", query_embedding.len(), self.dim)));
		}
		let mut query = self
			.table
			.vector_search(query_embedding.to_vec())
			.map_err(store_err)?
			.distance_type(DistanceType::Cosine)
			.limit(top_k);
		if let Some(sql) = filter.and_then(filter_sql) {
			query = query.only_if(sql);
		}
		let mut stream = query.execute().await.map_err(store_err)?;
		let mut results = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(store_err)? {
			let distances = column::<Float32Array>(&batch, "_distance")?;
			for i in 0..batch.num_rows() {
				let (chunk, _) = row_to_chunk(&batch, i)?;
				let score = 1.0 - f64::from(distances.value(i));
				results.push(RetrievalResult::from_chunk(&chunk, score, SourceKind::Vector));
			}
		}
		results.sort_by(|a, b| b.score.total_cmp(&a.score));
		results.truncate(top_k);
		Ok(results)
	}

	async fn delete(&self, document_id: &str) -> Result<usize> {
		let predicate = format!("document_id = {}", quote(document_id));
		let count = self.table.count_rows(Some(predicate.clone())).await.map_err(store_err)?;
		if count > 0 {
			self.table.delete(&predicate).await.map_err(store_err)?;
		}
		Ok(count)
	}

	async fn get_all(&self) -> Result<Vec<Chunk>> { self.scan(None).await }

	async fn get_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
		self.scan(Some(format!("document_id = {}", quote(document_id)))).await
	}

	async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
		let chunks = self.scan(None).await?;
		Ok(summarize_documents(chunks.iter()))
	}

	async fn stats(&self) -> Result<StoreStats> {
		let total_chunks = self.table.count_rows(None).await.map_err(store_err)?;
		let total_documents = self.list_documents().await?.len();
		Ok(StoreStats { total_chunks, total_documents, collection_name: self.collection.clone() })
	}
}
