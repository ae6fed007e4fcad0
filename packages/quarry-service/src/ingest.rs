use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{EmbeddingProvider, Error, Result, error::vector_store_error};
use quarry_config::{Chunking, EmbeddingProviderConfig};
use quarry_providers::EmbeddingKind;
use quarry_storage::{
	models::{ChunkGranularity, ChunkRecord},
	qdrant::QdrantStore,
};

const EMBED_BATCH: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInput {
	pub document_id: String,
	pub text: String,
	#[serde(default)]
	pub title: Option<String>,
	#[serde(default)]
	pub source: Option<String>,
	#[serde(default)]
	pub content_type: Option<String>,
	#[serde(default)]
	pub language: Option<String>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub created_at: Option<OffsetDateTime>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
	pub coarse_chunks: usize,
	pub fine_chunks: usize,
}

/// Splits a document at both granularities into chunk records with deterministic ids.
pub fn prepare_chunks(doc: &DocumentInput, cfg: &Chunking) -> Result<Vec<ChunkRecord>> {
	let document_id = doc.document_id.trim();

	if document_id.is_empty() {
		return Err(Error::InvalidRequest {
			message: "document_id must be non-empty.".to_string(),
		});
	}

	let chunks = quarry_chunking::split_granularities(&doc.text, cfg);
	let tiers = [(ChunkGranularity::Coarse, chunks.coarse), (ChunkGranularity::Fine, chunks.fine)];
	let mut records = Vec::new();

	for (granularity, chunks) in tiers {
		for chunk in chunks {
			let content = chunk.text.trim();

			if content.is_empty() {
				continue;
			}

			let mut metadata = doc.metadata.clone();

			metadata.insert("start_offset".to_string(), Value::from(chunk.start_offset));
			metadata.insert("end_offset".to_string(), Value::from(chunk.end_offset));
			records.push(ChunkRecord {
				chunk_id: ChunkRecord::chunk_id_for(document_id, granularity, chunk.chunk_index),
				document_id: document_id.to_string(),
				chunk_index: chunk.chunk_index,
				granularity,
				content: content.to_string(),
				title: doc.title.clone(),
				source: doc.source.clone(),
				content_type: doc.content_type.clone(),
				language: doc.language.clone(),
				created_at: doc.created_at,
				metadata,
			});
		}
	}

	Ok(records)
}

/// Embeds every chunk as a document and upserts it to Qdrant.
pub async fn ingest_document(
	embedding: &dyn EmbeddingProvider,
	cfg: &EmbeddingProviderConfig,
	chunking: &Chunking,
	store: &QdrantStore,
	doc: &DocumentInput,
) -> Result<IngestReport> {
	let records = prepare_chunks(doc, chunking)?;

	for batch in records.chunks(EMBED_BATCH) {
		let texts: Vec<String> = batch.iter().map(|record| record.content.clone()).collect();
		let vectors = embedding.embed(cfg, &texts, EmbeddingKind::Document).await?;

		store.upsert_chunks(batch, &vectors).await.map_err(vector_store_error)?;
	}

	let report = IngestReport {
		coarse_chunks: count(&records, ChunkGranularity::Coarse),
		fine_chunks: count(&records, ChunkGranularity::Fine),
	};

	tracing::info!(
		document_id = %doc.document_id,
		coarse = report.coarse_chunks,
		fine = report.fine_chunks,
		"Document ingested."
	);

	Ok(report)
}

fn count(records: &[ChunkRecord], granularity: ChunkGranularity) -> usize {
	records.iter().filter(|record| record.granularity == granularity).count()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn doc(text: &str) -> DocumentInput {
		DocumentInput {
			document_id: "doc-1".to_string(),
			text: text.to_string(),
			title: Some("Notes".to_string()),
			source: Some("wiki".to_string()),
			content_type: None,
			language: Some("en".to_string()),
			created_at: None,
			metadata: Map::new(),
		}
	}

	#[test]
	fn chunks_cover_both_granularities_with_stable_ids() {
		let cfg = Chunking { coarse_max_words: 8, fine_max_words: 3, overlap_words: 0 };
		let records = prepare_chunks(&doc("One two three. Four five six. Seven eight nine."), &cfg)
			.expect("Failed to prepare chunks.");
		let again = prepare_chunks(&doc("One two three. Four five six. Seven eight nine."), &cfg)
			.expect("Failed to prepare chunks.");

		assert_eq!(count(&records, ChunkGranularity::Coarse), 2);
		assert_eq!(count(&records, ChunkGranularity::Fine), 3);
		assert_eq!(
			records.iter().map(|r| r.chunk_id).collect::<Vec<_>>(),
			again.iter().map(|r| r.chunk_id).collect::<Vec<_>>()
		);
		assert!(records.iter().all(|r| r.source.as_deref() == Some("wiki")));
	}

	#[test]
	fn blank_document_ids_are_rejected() {
		let mut input = doc("Some text.");

		input.document_id = "  ".to_string();

		assert!(matches!(
			prepare_chunks(&input, &Chunking::default()),
			Err(Error::InvalidRequest { .. })
		));
	}
}
